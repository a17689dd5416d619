//! Security utilities for SQL injection prevention in rivven-dal.
//!
//! Provides:
//! - Identifier validation and quoting for table and column names
//! - String literal escaping for SQL string contexts
//!
//! Statement builders pass every table and column name through
//! [`quote_identifier`] and every inlined text value through
//! [`escape_string_literal`].

use crate::error::Error;

/// Validate a single SQL identifier (table or column name).
///
/// Enforces strict character rules:
/// - Must not be empty
/// - Maximum 255 characters
/// - Must start with ASCII letter or underscore
/// - May only contain ASCII alphanumeric characters and underscores
///
/// # Examples
///
/// ```
/// use rivven_dal::security::validate_sql_identifier;
///
/// assert!(validate_sql_identifier("users").is_ok());
/// assert!(validate_sql_identifier("_private").is_ok());
///
/// assert!(validate_sql_identifier("x; DROP TABLE users--").is_err());
/// assert!(validate_sql_identifier("").is_err());
/// assert!(validate_sql_identifier("123abc").is_err());
/// ```
pub fn validate_sql_identifier(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(Error::identifier(name, "identifier cannot be empty"));
    }

    if name.len() > 255 {
        return Err(Error::identifier(
            name,
            format!("too long: {} chars (max 255)", name.len()),
        ));
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => {
            return Err(Error::identifier(
                name,
                "must start with a letter or underscore",
            ));
        }
    }

    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(Error::identifier(
                name,
                format!("contains invalid character '{}'", c),
            ));
        }
    }

    Ok(())
}

/// Validate and backtick-quote a table or column name.
///
/// A `schema.table` qualification is accepted and each part is quoted
/// separately. Anything with more than one dot is rejected.
///
/// ```
/// use rivven_dal::security::quote_identifier;
///
/// assert_eq!(quote_identifier("users").unwrap(), "`users`");
/// assert_eq!(quote_identifier("crm.users").unwrap(), "`crm`.`users`");
/// assert!(quote_identifier("a.b.c").is_err());
/// ```
pub fn quote_identifier(name: &str) -> crate::Result<String> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return Err(Error::identifier(name, "at most one schema qualifier allowed"));
    }

    let mut quoted = String::with_capacity(name.len() + 4);
    for (i, part) in parts.iter().enumerate() {
        validate_sql_identifier(part).map_err(|e| match e {
            Error::InvalidIdentifier { reason, .. } => Error::identifier(name, reason),
            other => other,
        })?;
        if i > 0 {
            quoted.push('.');
        }
        quoted.push('`');
        quoted.push_str(part);
        quoted.push('`');
    }
    Ok(quoted)
}

/// Escape a string value for safe interpolation into a MySQL string literal.
///
/// Replaces `'` with `''` (standard SQL escaping for single-quoted string
/// literals) and `\` with `\\`, since MySQL treats backslash as an escape
/// character unless `NO_BACKSLASH_ESCAPES` is set.
///
/// # Examples
///
/// ```
/// use rivven_dal::security::escape_string_literal;
///
/// assert_eq!(escape_string_literal("users"), "users");
/// assert_eq!(escape_string_literal("don't"), "don''t");
/// assert_eq!(escape_string_literal("x'; DROP TABLE users--"), "x''; DROP TABLE users--");
/// assert_eq!(escape_string_literal(r"C:\tmp"), r"C:\\tmp");
/// ```
pub fn escape_string_literal(value: &str) -> String {
    // Fast path: no escaping needed (common case)
    if !value.contains(['\'', '\\']) {
        return value.to_string();
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '\'' => escaped.push_str("''"),
            '\\' => escaped.push_str("\\\\"),
            _ => escaped.push(c),
        }
    }
    escaped
}
