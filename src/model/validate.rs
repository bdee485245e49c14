//! Field-level validation rules shared by the request payloads.

use crate::error::{CatalogError, CatalogResult};

pub const ADDRESS_MAX_LEN: usize = 500;
pub const NAME_MAX_LEN: usize = 255;
pub const CONTACT_MAX_LEN: usize = 255;

/// Non-empty and at most `max` characters
pub fn text(field: &str, value: &str, max: usize) -> CatalogResult<()> {
    if value.is_empty() {
        return Err(CatalogError::invalid(format!("{field} must not be empty")));
    }
    let len = value.chars().count();
    if len > max {
        return Err(CatalogError::invalid(format!(
            "{field} must be at most {max} characters, got {len}"
        )));
    }
    Ok(())
}

/// Optional text bounded by `max` characters; `None` always passes
pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> CatalogResult<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(CatalogError::invalid(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}

pub fn latitude(field: &str, value: f64) -> CatalogResult<()> {
    if !value.is_finite() || !(-90.0..=90.0).contains(&value) {
        return Err(CatalogError::invalid(format!(
            "{field} must be within [-90, 90], got {value}"
        )));
    }
    Ok(())
}

pub fn longitude(field: &str, value: f64) -> CatalogResult<()> {
    if !value.is_finite() || !(-180.0..=180.0).contains(&value) {
        return Err(CatalogError::invalid(format!(
            "{field} must be within [-180, 180], got {value}"
        )));
    }
    Ok(())
}

/// Identifiers are positive
pub fn id(field: &str, value: i64) -> CatalogResult<()> {
    if value <= 0 {
        return Err(CatalogError::invalid(format!("{field} must be positive, got {value}")));
    }
    Ok(())
}

pub fn email(value: Option<&str>) -> CatalogResult<()> {
    if let Some(v) = value {
        if !v.is_empty() && !v.contains('@') {
            return Err(CatalogError::invalid("Invalid email format"));
        }
    }
    optional_text("email", value, CONTACT_MAX_LEN)
}
