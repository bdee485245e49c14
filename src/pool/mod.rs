//! Fixed-size connection pool.
//!
//! Connections are opened once at startup and handed out exclusively: a
//! request holds one [`PooledConnection`] for the lifetime of its transaction
//! and the guard returns it to the idle set on drop.

pub mod config;
mod manager;

pub use self::config::DatabaseConfig;
pub use self::manager::{Connect, DbPool, Pool, PoolError, PooledConnection};
