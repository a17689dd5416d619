//! Connection pool for rivven-dal
//!
//! A bounded set of reusable connections to one [`TargetConfig`]:
//! - Semaphore-bounded checkout (`connection_limit` permits)
//! - LIFO reuse of idle connections, optional validation on borrow
//! - RAII [`ScopedConnection`] guards that give the connection back exactly once
//! - Statistics for observability
//!
//! # Example
//!
//! ```rust,ignore
//! use rivven_dal::pool::Pool;
//! use rivven_dal::mysql::MySqlConnectionFactory;
//!
//! let pool = Pool::new(target, Arc::new(MySqlConnectionFactory))?;
//!
//! let conn = pool.get().await?;
//! conn.query("SELECT 1", &[]).await?;
//! // Connection is returned to the pool when dropped
//! ```

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::config::TargetConfig;
use crate::connection::{Connection, ConnectionFactory};
use crate::error::{Error, Result};

/// A connection checked out from the pool.
///
/// Dropping the guard hands the connection back to the idle list and frees
/// its permit, on every exit path.
pub struct ScopedConnection {
    conn: Option<Box<dyn Connection>>,
    pool: Arc<Pool>,
    // Set while a statement that changes session state is in flight.
    tainted: bool,
    // Released after `Drop::drop` has put the connection back.
    _permit: OwnedSemaphorePermit,
}

impl ScopedConnection {
    /// Get the underlying connection
    pub fn connection(&self) -> &(dyn Connection + 'static) {
        self.conn
            .as_deref()
            .expect("connection already returned")
    }

    /// Close the connection instead of returning it to the pool.
    ///
    /// Used when the connection is left in an unknown state, e.g. after a
    /// failed rollback.
    pub async fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.discard(conn).await;
        }
    }

    /// Mark the connection as being in an unknown state.
    ///
    /// A tainted connection is closed instead of parked when the guard
    /// drops, so a cancelled `BEGIN` or `COMMIT` cannot leak an open
    /// transaction to the next borrower.
    pub(crate) fn taint(&mut self) {
        self.tainted = true;
    }

    /// Undo [`taint`](Self::taint) once the session state is known again
    pub(crate) fn untaint(&mut self) {
        self.tainted = false;
    }

    /// Drop the connection without returning it to the pool.
    ///
    /// For contexts that cannot await a close, e.g. `Drop` outside a runtime.
    pub fn abandon(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.forget(conn);
        }
    }
}

impl std::ops::Deref for ScopedConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection()
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.tainted {
            debug!("Closing connection left in an unknown state");
            self.pool.close_detached(conn);
        } else {
            self.pool.release(conn);
        }
    }
}

impl std::fmt::Debug for ScopedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedConnection")
            .field("target", &self.pool.target.display_target())
            .finish()
    }
}

/// Pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of connections created
    pub connections_created: u64,
    /// Total number of connections closed
    pub connections_closed: u64,
    /// Total number of connection acquisitions
    pub acquisitions: u64,
    /// Number of times the acquire timeout elapsed
    pub exhausted_count: u64,
    /// Total wait time for connections (in milliseconds)
    pub total_wait_time_ms: u64,
    /// Number of idle connections that failed validation
    pub health_check_failures: u64,
}

/// Counters behind [`PoolStats`], bumped without taking a lock
#[derive(Debug, Default)]
pub(crate) struct AtomicPoolStats {
    created: AtomicU64,
    closed: AtomicU64,
    acquisitions: AtomicU64,
    exhausted: AtomicU64,
    wait_ms: AtomicU64,
    health_check_failures: AtomicU64,
}

impl AtomicPoolStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_acquisition(&self, wait_ms: u64) {
        Self::bump(&self.acquisitions);
        self.wait_ms.fetch_add(wait_ms, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PoolStats {
        PoolStats {
            connections_created: self.created.load(Ordering::Relaxed),
            connections_closed: self.closed.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            exhausted_count: self.exhausted.load(Ordering::Relaxed),
            total_wait_time_ms: self.wait_ms.load(Ordering::Relaxed),
            health_check_failures: self.health_check_failures.load(Ordering::Relaxed),
        }
    }
}

/// Bounded connection pool for one database target.
///
/// Connections are created lazily; nothing is opened until the first
/// checkout. The semaphore is the only gate on concurrency, the idle list
/// sits behind a short synchronous lock so guards can return connections
/// from `Drop`.
pub struct Pool {
    target: TargetConfig,
    factory: Arc<dyn ConnectionFactory>,
    /// Idle connections (LIFO)
    idle: Mutex<Vec<Box<dyn Connection>>>,
    semaphore: Arc<Semaphore>,
    total_connections: AtomicUsize,
    stats: AtomicPoolStats,
    shutdown: AtomicBool,
    /// Replaced by a newer pool: keeps serving its waiters, parks nothing
    retired: AtomicBool,
}

impl Pool {
    /// Create a pool for `target`.
    ///
    /// Fails with [`Error::Configuration`] if the target does not validate.
    pub fn new(target: TargetConfig, factory: Arc<dyn ConnectionFactory>) -> Result<Arc<Self>> {
        target.check()?;
        let max_size = target.connection_limit as usize;
        debug!(
            target_db = %target.display_target(),
            backend = factory.backend(),
            max_size,
            "Creating connection pool"
        );
        Ok(Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(max_size)),
            idle: Mutex::new(Vec::with_capacity(max_size)),
            target,
            factory,
            total_connections: AtomicUsize::new(0),
            stats: AtomicPoolStats::default(),
            shutdown: AtomicBool::new(false),
            retired: AtomicBool::new(false),
        }))
    }

    /// Check out a connection.
    ///
    /// Waits for a free permit up to the target's acquire timeout, then
    /// fails with [`Error::PoolExhausted`].
    pub async fn get(self: &Arc<Self>) -> Result<ScopedConnection> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(Error::pool_exhausted("pool is shut down"));
        }

        let start = Instant::now();
        let timeout = self.target.acquire_timeout();

        let permit = tokio::time::timeout(timeout, Arc::clone(&self.semaphore).acquire_owned())
            .await
            .map_err(|_| {
                AtomicPoolStats::bump(&self.stats.exhausted);
                warn!(
                    target_db = %self.target.display_target(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Connection pool exhausted"
                );
                Error::pool_exhausted(format!(
                    "timeout waiting for connection ({}ms)",
                    timeout.as_millis()
                ))
            })?
            .map_err(|_| Error::pool_exhausted("pool is shut down"))?;

        let conn = loop {
            let entry = self.idle.lock().pop();
            match entry {
                Some(conn) => {
                    if self.target.test_on_borrow && !conn.is_valid().await {
                        debug!("Discarding idle connection that failed validation");
                        AtomicPoolStats::bump(&self.stats.health_check_failures);
                        self.discard(conn).await;
                        continue;
                    }
                    break conn;
                }
                // The permit is dropped with the error, freeing the slot.
                None => break self.create_connection().await?,
            }
        };

        self.stats
            .record_acquisition(start.elapsed().as_millis() as u64);

        Ok(ScopedConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            tainted: false,
            _permit: permit,
        })
    }

    async fn create_connection(&self) -> Result<Box<dyn Connection>> {
        let conn = self.factory.connect(&self.target).await?;
        self.total_connections.fetch_add(1, Ordering::Release);
        AtomicPoolStats::bump(&self.stats.created);
        debug!(
            target_db = %self.target.display_target(),
            total = self.size(),
            "Opened pooled connection"
        );
        Ok(conn)
    }

    fn release(&self, conn: Box<dyn Connection>) {
        {
            // Checked under the lock so a concurrent drain cannot miss it.
            let mut idle = self.idle.lock();
            if !self.shutdown.load(Ordering::Acquire) && !self.retired.load(Ordering::Acquire) {
                idle.push(conn);
                return;
            }
        }
        self.close_detached(conn);
    }

    /// Close a connection from a synchronous context
    fn close_detached(&self, conn: Box<dyn Connection>) {
        self.total_connections.fetch_sub(1, Ordering::Release);
        AtomicPoolStats::bump(&self.stats.closed);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = conn.close().await {
                        debug!(error = %e, "Error closing released connection");
                    }
                });
            }
            Err(_) => {
                debug!("No runtime to close released connection on, dropping it");
                drop(conn);
            }
        }
    }

    async fn discard(&self, conn: Box<dyn Connection>) {
        if let Err(e) = conn.close().await {
            debug!(error = %e, "Error closing discarded connection");
        }
        self.total_connections.fetch_sub(1, Ordering::Release);
        AtomicPoolStats::bump(&self.stats.closed);
    }

    fn forget(&self, conn: Box<dyn Connection>) {
        drop(conn);
        self.total_connections.fetch_sub(1, Ordering::Release);
        AtomicPoolStats::bump(&self.stats.closed);
    }

    /// Target this pool connects to
    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    /// Number of open connections (idle and checked out)
    pub fn size(&self) -> usize {
        self.total_connections.load(Ordering::Acquire)
    }

    /// Number of idle connections
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// Number of connections that can be checked out without waiting
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    /// Stop parking connections after this pool has been replaced.
    ///
    /// Idle connections are closed. Callers already waiting for a permit are
    /// still served; every connection released from now on is closed.
    pub async fn retire(&self) {
        if self.retired.swap(true, Ordering::AcqRel) {
            return;
        }
        let count = self.close_idle().await;
        debug!(
            target_db = %self.target.display_target(),
            closed = count,
            "Connection pool retired"
        );
    }

    /// Whether [`Pool::retire`] has been called
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    async fn close_idle(&self) -> usize {
        let idle: Vec<_> = self.idle.lock().drain(..).collect();
        let count = idle.len();
        for conn in idle {
            self.discard(conn).await;
        }
        count
    }

    /// Close idle connections and refuse new checkouts.
    ///
    /// Checked-out connections are closed when their guards drop.
    pub async fn close(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.semaphore.close();

        let count = self.close_idle().await;
        debug!(
            target_db = %self.target.display_target(),
            closed = count,
            "Connection pool closed"
        );
    }

    /// Whether [`Pool::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("target", &self.target.display_target())
            .field("size", &self.size())
            .field("available", &self.available())
            .finish()
    }
}
