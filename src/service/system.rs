//! Service banner, health probe and statistics.

use crate::error::CatalogResult;
use crate::store::DirectoryStore;
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub message: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

pub fn info() -> ServiceInfo {
    ServiceInfo {
        message: "Catalog API Service",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub database: &'static str,
    pub timestamp: String,
}

/// Runs `SELECT 1` through the store. An error here means the store is
/// unreachable and the caller should report the service as unavailable.
pub fn health<S: DirectoryStore>(store: &S) -> CatalogResult<Health> {
    if let Err(e) = store.transaction(|s| s.ping()) {
        log::error!("health check failed on {} store: {e}", store.backend());
        return Err(e);
    }
    Ok(Health {
        status: "healthy",
        database: "connected",
        timestamp: Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompanyCounts {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub buildings: i64,
    pub categories: i64,
    pub companies: CompanyCounts,
}

pub fn stats<S: DirectoryStore>(store: &S) -> CatalogResult<Stats> {
    let raw = store.transaction(|s| s.stats())?;
    Ok(Stats {
        buildings: raw.buildings,
        categories: raw.categories,
        companies: CompanyCounts {
            total: raw.companies,
            active: raw.active_companies,
            inactive: raw.companies - raw.active_companies,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{buildings, categories, companies, fixtures};
    use crate::store::MemoryStore;

    #[test]
    fn test_stats_split_active_and_inactive() {
        let store = MemoryStore::new();
        let b = buildings::create(&store, fixtures::building("ул. Арбат, 25", 55.750244, 37.617423)).unwrap();
        let c = categories::create(&store, fixtures::category("Спорт", None)).unwrap();
        companies::create(&store, fixtures::company("Стадион", b.id, vec![c.id])).unwrap();
        let mut closed = fixtures::company("Каток", b.id, vec![c.id]);
        closed.is_active = false;
        companies::create(&store, closed).unwrap();

        let stats = stats(&store).unwrap();
        assert_eq!(stats.buildings, 1);
        assert_eq!(stats.categories, 1);
        assert_eq!(
            stats.companies,
            CompanyCounts {
                total: 2,
                active: 1,
                inactive: 1
            }
        );
    }

    #[test]
    fn test_health_on_memory_store() {
        let health = health(&MemoryStore::new()).unwrap();
        assert_eq!(health.status, "healthy");
        assert!(health.timestamp.contains('T'));
    }
}
