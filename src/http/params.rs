//! Query-string and body decoding.

use crate::error::{CatalogError, CatalogResult};
use crate::geo::LocationParams;
use crate::store::{Page, DEFAULT_LIMIT, MAX_LIMIT};
use serde::de::DeserializeOwned;
use serde::Deserialize;

fn default_true() -> bool {
    true
}

/// Decodes the query string (everything after `?`, possibly empty)
pub fn query<T: DeserializeOwned>(raw: &str) -> CatalogResult<T> {
    serde_urlencoded::from_str(raw)
        .map_err(|e| CatalogError::invalid(format!("invalid query parameters: {e}")))
}

/// Decodes a JSON request body
pub fn body<T: DeserializeOwned>(raw: &[u8]) -> CatalogResult<T> {
    serde_json::from_slice(raw).map_err(|e| CatalogError::invalid(format!("invalid request body: {e}")))
}

/// Parses a numeric path segment
pub fn id(segment: &str) -> CatalogResult<i64> {
    segment
        .parse()
        .map_err(|_| CatalogError::invalid(format!("invalid identifier: {segment}")))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    /// Enforces `skip >= 0` and `1 <= limit <= 1000`
    pub fn page(&self) -> CatalogResult<Page> {
        let skip = self.skip.unwrap_or(0);
        if skip < 0 {
            return Err(CatalogError::invalid("skip must be greater than or equal to 0"));
        }
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT as i64);
        if !(1..=MAX_LIMIT as i64).contains(&limit) {
            return Err(CatalogError::invalid(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        Ok(Page::new(skip as u64, limit as u64))
    }
}

#[derive(Debug, Deserialize)]
pub struct CompanyListQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default = "default_true")]
    pub active_only: bool,
}

impl CompanyListQuery {
    pub fn page(&self) -> CatalogResult<Page> {
        PageQuery {
            skip: self.skip,
            limit: self.limit,
        }
        .page()
    }
}

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    #[serde(default = "default_true")]
    pub active_only: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryListQuery {
    #[serde(default)]
    pub flat: bool,
}

#[derive(Debug, Deserialize)]
pub struct ByCategoryQuery {
    #[serde(default = "default_true")]
    pub include_subcategories: bool,
    #[serde(default = "default_true")]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_true")]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct LocationQueryParams {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: Option<f64>,
    pub min_lat: Option<f64>,
    pub max_lat: Option<f64>,
    pub min_lng: Option<f64>,
    pub max_lng: Option<f64>,
    #[serde(default = "default_true")]
    pub active_only: bool,
}

impl LocationQueryParams {
    pub fn location(&self) -> LocationParams {
        LocationParams {
            latitude: self.latitude,
            longitude: self.longitude,
            radius_km: self.radius_km,
            min_lat: self.min_lat,
            max_lat: self.max_lat,
            min_lng: self.min_lng,
            max_lng: self.max_lng,
        }
    }
}
