//! # Catalog
//!
//! Directory service for companies, the buildings they occupy and a
//! hierarchical category taxonomy, running on the `may` coroutine runtime.
//!
//! Layers, bottom up:
//!
//! - [`pool`], [`connection`], [`executor`], [`transaction`] and [`query`]:
//!   Postgres access over `may_postgres` with SQL built by `sea-query`.
//! - [`store`]: the [`DirectoryStore`] seam with a Postgres and an
//!   in-memory implementation.
//! - [`hierarchy`] and [`geo`]: materialized category paths and distance
//!   filtering.
//! - [`service`]: the operations exposed over HTTP by [`http`].

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod geo;
pub mod hierarchy;
pub mod http;
pub mod metrics;
pub mod model;
pub mod pool;
pub mod query;
pub mod schema;
pub mod service;
pub mod store;
pub mod transaction;

pub use crate::config::{CatalogConfig, StoreBackend};
pub use crate::error::{CatalogError, CatalogResult};
pub use crate::pool::{DatabaseConfig, DbPool};
pub use crate::store::{AnyStore, DirectoryStore, MemoryStore, PgStore, StoreSession};
