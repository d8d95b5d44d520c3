use super::registry::RegistryError;
use lazy_static::lazy_static;
use regex::Regex;

/// Joins a parent table and a nested field into a child table name.
pub const CHILD_SEPARATOR: &str = "__";

lazy_static! {
    static ref NON_ALPHANUMERIC_RUN: Regex =
        Regex::new(r"[^0-9a-zA-Z]+").expect("identifier pattern is valid");
}

/// Normalizes a collection or field name into a storage identifier.
///
/// Every run of non-alphanumeric characters becomes a single `_`, leading
/// and trailing `_` are trimmed and the result is lowercased. A sanitized
/// name never contains `__`, so it cannot collide with a child table name.
pub fn sanitize_identifier(raw: &str) -> Result<String, RegistryError> {
    let sanitized = NON_ALPHANUMERIC_RUN
        .replace_all(raw, "_")
        .trim_matches('_')
        .to_ascii_lowercase();

    if sanitized.is_empty() {
        return Err(RegistryError::InvalidName(raw.to_string()));
    }
    Ok(sanitized)
}

pub fn child_table_name(parent_table: &str, field: &str) -> String {
    format!("{parent_table}{CHILD_SEPARATOR}{field}")
}

/// Candidate registry keys for a name supplied by a caller, most specific
/// first: child table names keep their `__` separator.
pub(crate) fn lookup_keys(raw: &str) -> Vec<String> {
    let mut keys = Vec::with_capacity(2);
    if raw.contains(CHILD_SEPARATOR) {
        let parts: Option<Vec<String>> = raw
            .split(CHILD_SEPARATOR)
            .map(|part| sanitize_identifier(part).ok())
            .collect();
        if let Some(parts) = parts {
            keys.push(parts.join(CHILD_SEPARATOR));
        }
    }
    if let Ok(sanitized) = sanitize_identifier(raw) {
        keys.push(sanitized);
    }
    keys
}
