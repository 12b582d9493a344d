//! SQL identifier guard.
//!
//! Category and column names cannot be bound as parameters, so every name
//! that reaches a DDL/DML string passes through here first.

use crate::error::{DbError, Result};

/// Audit columns present on every category table, in table order.
pub const AUDIT_COLUMNS: &[&str] = &["id", "created_at", "updated_at", "deleted_at"];

/// Tables owned by the engine itself; never treated as categories.
pub const RESERVED_TABLES: &[&str] = &["metadata", "datatypes", "pending"];

/// True when `name` is non-empty and made only of ASCII letters, digits and '_'.
pub fn is_identifier_safe(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate a single identifier.
pub fn check_identifier(name: &str) -> Result<()> {
    if is_identifier_safe(name) {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

/// Validate every identifier, failing on the first unsafe one.
pub fn check_identifiers<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<()> {
    names.into_iter().try_for_each(check_identifier)
}

/// Validate a category name: identifier-safe and not an engine table.
pub fn check_category_name(name: &str) -> Result<()> {
    check_identifier(name)?;
    let lower = name.to_ascii_lowercase();
    if RESERVED_TABLES.contains(&lower.as_str()) || lower.starts_with("sqlite_") {
        return Err(DbError::config(format!(
            "'{}' is reserved and cannot be used as a category name",
            name
        )));
    }
    Ok(())
}

pub fn is_audit_column(name: &str) -> bool {
    AUDIT_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(name))
}

/// Quote an already-validated identifier for interpolation.
///
/// Callers must have passed the name through [`check_identifier`]; quoting
/// only keeps digit-leading names and keywords legal.
pub(crate) fn quote(name: &str) -> String {
    debug_assert!(is_identifier_safe(name));
    format!("\"{}\"", name)
}
