//! Request dispatch.
//!
//! [`route`] is transport-free: it takes the method, the request target and
//! the raw body, and returns the status and JSON payload to send. The
//! `may_minihttp` service only copies bytes in and out of it.

use super::params::{
    self, ActiveQuery, ByCategoryQuery, CategoryListQuery, CompanyListQuery, LocationQueryParams,
    PageQuery, SearchQuery,
};
use super::HttpResponse;
use crate::error::{CatalogError, CatalogResult};
use crate::service::{buildings, categories, companies, seed, system};
use crate::store::DirectoryStore;
use serde::Serialize;
use serde_json::json;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

fn ok<T: Serialize>(value: &T) -> CatalogResult<HttpResponse> {
    Ok(HttpResponse::json(200, value))
}

fn deleted(what: &str) -> CatalogResult<HttpResponse> {
    ok(&json!({ "message": format!("{what} deleted successfully") }))
}

/// Splits `/a/b/?x=1` into `["a", "b"]` and `"x=1"`
fn split_target(target: &str) -> (Vec<&str>, &str) {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let segments = path.split('/').filter(|s| !s.is_empty()).collect();
    (segments, query)
}

pub fn route<S: DirectoryStore>(store: &S, method: &str, target: &str, body: &[u8]) -> HttpResponse {
    let (segments, query) = split_target(target);
    match dispatch(store, method, &segments, query, body) {
        Ok(response) => response,
        Err(err) => {
            match &err {
                CatalogError::Internal(_) => log::error!("{method} {target} failed: {err}"),
                _ => log::debug!("{method} {target} rejected: {err}"),
            }
            HttpResponse::error(&err)
        }
    }
}

fn dispatch<S: DirectoryStore>(
    store: &S,
    method: &str,
    segments: &[&str],
    query: &str,
    body: &[u8],
) -> CatalogResult<HttpResponse> {
    match (method, segments) {
        ("OPTIONS", _) => Ok(HttpResponse::empty(204)),

        ("GET", []) => ok(&system::info()),
        ("GET", ["health"]) => match system::health(store) {
            Ok(health) => ok(&health),
            Err(_) => Ok(HttpResponse::json(503, &json!({ "detail": "Service unavailable" }))),
        },
        ("GET", ["stats"]) => ok(&system::stats(store)?),
        #[cfg(feature = "metrics")]
        ("GET", ["metrics"]) => Ok(HttpResponse::text(200, METRICS.render())),
        ("POST", ["test-data", "generate"]) => {
            let created = seed::generate(store)?;
            ok(&json!({ "message": "Test data generated successfully", "created": created }))
        }

        ("POST", ["buildings"]) => ok(&buildings::create(store, params::body(body)?)?),
        ("GET", ["buildings"]) => {
            let page = params::query::<PageQuery>(query)?.page()?;
            ok(&buildings::list(store, page)?)
        }
        ("GET", ["buildings", id]) => ok(&buildings::get(store, params::id(id)?)?),
        ("PUT", ["buildings", id]) => {
            ok(&buildings::update(store, params::id(id)?, params::body(body)?)?)
        }
        ("DELETE", ["buildings", id]) => {
            buildings::delete(store, params::id(id)?)?;
            deleted("Building")
        }

        ("POST", ["categories"]) => ok(&categories::create(store, params::body(body)?)?),
        ("GET", ["categories"]) => {
            let q: CategoryListQuery = params::query(query)?;
            ok(&categories::list(store, q.flat)?)
        }
        ("GET", ["categories", id]) => ok(&categories::get(store, params::id(id)?)?),
        ("PUT", ["categories", id]) => {
            ok(&categories::update(store, params::id(id)?, params::body(body)?)?)
        }
        ("DELETE", ["categories", id]) => {
            categories::delete(store, params::id(id)?)?;
            deleted("Category")
        }

        ("POST", ["companies"]) => ok(&companies::create(store, params::body(body)?)?),
        ("GET", ["companies"]) => {
            let q: CompanyListQuery = params::query(query)?;
            ok(&companies::list(store, q.active_only, q.page()?)?)
        }
        ("GET", ["companies", "search"]) => {
            let q: SearchQuery = params::query(query)?;
            ok(&companies::search(store, &q.q, q.active_only)?)
        }
        ("GET", ["companies", "location"]) => {
            let q: LocationQueryParams = params::query(query)?;
            ok(&companies::by_location(store, &q.location(), q.active_only)?)
        }
        ("GET", ["companies", "building", id]) => {
            let q: ActiveQuery = params::query(query)?;
            ok(&companies::by_building(store, params::id(id)?, q.active_only)?)
        }
        ("GET", ["companies", "category", id]) => {
            let q: ByCategoryQuery = params::query(query)?;
            ok(&companies::by_category(
                store,
                params::id(id)?,
                q.include_subcategories,
                q.active_only,
            )?)
        }
        ("GET", ["companies", id]) => ok(&companies::get(store, params::id(id)?)?),
        ("PUT", ["companies", id]) => {
            ok(&companies::update(store, params::id(id)?, params::body(body)?)?)
        }
        ("DELETE", ["companies", id]) => {
            companies::delete(store, params::id(id)?)?;
            deleted("Company")
        }

        _ => Err(CatalogError::not_found("Not Found")),
    }
}
