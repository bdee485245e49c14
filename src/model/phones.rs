//! Storage codec for a company's ordered phone list.
//!
//! Phones are persisted as one string joined by [`PHONE_DELIMITER`]. Values
//! containing the delimiter are rejected up front so split/join is lossless.

use crate::error::{CatalogError, CatalogResult};

pub const PHONE_DELIMITER: char = ',';

/// At least one phone, each non-empty and free of the delimiter
pub fn validate(phones: &[String]) -> CatalogResult<()> {
    if phones.is_empty() {
        return Err(CatalogError::invalid("At least one phone number is required"));
    }
    for phone in phones {
        if phone.trim().is_empty() {
            return Err(CatalogError::invalid("Phone numbers must not be empty"));
        }
        if phone.contains(PHONE_DELIMITER) {
            return Err(CatalogError::invalid(format!(
                "Phone number {phone:?} must not contain '{PHONE_DELIMITER}'"
            )));
        }
    }
    Ok(())
}

pub fn encode(phones: &[String]) -> String {
    phones.join(&PHONE_DELIMITER.to_string())
}

/// Inverse of [`encode`]; an empty column decodes to no phones
pub fn decode(stored: &str) -> Vec<String> {
    if stored.is_empty() {
        return Vec::new();
    }
    stored.split(PHONE_DELIMITER).map(str::to_string).collect()
}
