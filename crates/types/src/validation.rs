//! Eager validation for namespace and collection identifiers.
//!
//! Identifiers end up inside SQL as raw identifiers (the backend family
//! cannot parameter-bind them), so they are validated against a character
//! whitelist before any network call. Quotes, slashes, spaces, and anything
//! else outside `[A-Za-z0-9_-]` is rejected.

use crate::error::StoreError;

/// Maximum identifier length in bytes.
const MAX_IDENTIFIER_BYTES: usize = 64;

/// Validates a namespace or collection identifier.
///
/// Identifiers must be non-empty, at most 64 bytes, and contain only
/// `[A-Za-z0-9_-]`.
///
/// # Errors
///
/// Returns [`StoreError::InvalidArgument`] naming the offending field when
/// the identifier is empty, too long, or contains characters outside the
/// whitelist.
pub fn validate_identifier(value: &str, field: &str) -> Result<(), StoreError> {
    if value.is_empty() {
        return Err(StoreError::InvalidArgument {
            field: field.to_string(),
            constraint: "must not be empty".to_string(),
        });
    }
    if value.len() > MAX_IDENTIFIER_BYTES {
        return Err(StoreError::InvalidArgument {
            field: field.to_string(),
            constraint: format!(
                "length {} bytes exceeds maximum {MAX_IDENTIFIER_BYTES} bytes",
                value.len()
            ),
        });
    }
    if let Some(ch) = value.chars().find(|c| !is_identifier_char(*c)) {
        return Err(StoreError::InvalidArgument {
            field: field.to_string(),
            constraint: format!("contains disallowed character {ch:?}"),
        });
    }
    Ok(())
}

/// Whitelist predicate for identifier characters.
fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}
