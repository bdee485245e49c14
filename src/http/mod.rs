//! JSON over HTTP on `may_minihttp`.
//!
//! Every request is handled on a coroutine of the same `may` runtime the
//! Postgres driver uses, so store calls block the coroutine and not the
//! worker thread.

pub mod params;
pub mod router;

pub use router::route;

use crate::error::CatalogError;
use crate::store::DirectoryStore;
use may_minihttp::{HttpServer, HttpService, Request, Response};
use serde::Serialize;
use serde_json::json;
use std::io::{self, Read};
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

const CONTENT_TYPE_JSON: &str = "Content-Type: application/json";
const CONTENT_TYPE_TEXT: &str = "Content-Type: text/plain; version=0.0.4; charset=utf-8";
const CORS_ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin: *";
const CORS_ALLOW_METHODS: &str = "Access-Control-Allow-Methods: GET, POST, PUT, DELETE, OPTIONS";
const CORS_ALLOW_HEADERS: &str = "Access-Control-Allow-Headers: *";

/// Status, content type and body produced by [`route`]
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json<T: Serialize + ?Sized>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: CONTENT_TYPE_JSON,
                body,
            },
            Err(e) => {
                log::error!("failed to serialize response: {e}");
                Self {
                    status: 500,
                    content_type: CONTENT_TYPE_JSON,
                    body: br#"{"detail":"Internal server error"}"#.to_vec(),
                }
            }
        }
    }

    pub fn text(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: CONTENT_TYPE_TEXT,
            body,
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: CONTENT_TYPE_JSON,
            body: Vec::new(),
        }
    }

    /// `{"detail": ...}` with the status the error maps to
    pub fn error(err: &CatalogError) -> Self {
        Self::json(err.status_code(), &json!({ "detail": err.detail() }))
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        409 => "Conflict",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// `may_minihttp` service wrapping a shared store
pub struct CatalogService<S> {
    store: Arc<S>,
}

impl<S> CatalogService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S> Clone for CatalogService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: DirectoryStore + 'static> HttpService for CatalogService<S> {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let started = Instant::now();
        // The body reader consumes the request, so copy what routing needs first.
        let method = req.method().to_string();
        let target = req.path().to_string();

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::http_request_span(&method, &target).entered();

        let mut body = Vec::new();
        req.body().read_to_end(&mut body)?;

        let response = route(self.store.as_ref(), &method, &target, &body);

        res.status_code(usize::from(response.status), reason_phrase(response.status));
        res.header(response.content_type);
        res.header(CORS_ALLOW_ORIGIN);
        if method == "OPTIONS" {
            res.header(CORS_ALLOW_METHODS);
            res.header(CORS_ALLOW_HEADERS);
        }
        res.body_vec(response.body);

        let elapsed = started.elapsed();
        #[cfg(feature = "metrics")]
        METRICS.record_http_request(&method, response.status, elapsed);
        log::info!(
            "{method} {target} -> {} in {}ms",
            response.status,
            elapsed.as_millis()
        );
        Ok(())
    }
}

/// Starts the server and returns its accept-loop handle; join it to block.
pub fn serve<S, A>(store: Arc<S>, addr: A) -> io::Result<may::coroutine::JoinHandle<()>>
where
    S: DirectoryStore + 'static,
    A: ToSocketAddrs,
{
    let backend = store.backend();
    let handle = HttpServer(CatalogService::new(store)).start(addr)?;
    log::info!("catalog API listening ({backend} store)");
    Ok(handle)
}
