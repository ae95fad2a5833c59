use crate::error::{Result, TrackerDbError};
use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// The bare name of a type with its module path and generic arguments
/// removed (`trackerdb::food::Food` -> `Food`).
pub fn type_to_string<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Table and column names are spliced into SQL text, so only plain
/// identifiers are accepted.
pub fn validate_identifier(name: &str) -> Result<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(TrackerDbError::InvalidIdentifier(name.to_string()).logged())
    }
}
