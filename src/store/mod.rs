//! Directory store: persistence for buildings, categories and companies.
//!
//! A [`DirectoryStore`] hands out one [`StoreSession`] per unit of work. The
//! session is bound to a single transaction: the work closure either returns
//! `Ok` and everything it wrote becomes visible, or it returns `Err` and none
//! of it does.
//!
//! Two backends implement the traits: [`PgStore`] over the pooled
//! `may_postgres` connections, and [`MemoryStore`] for tests and demos.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::CatalogResult;
use crate::geo::BoundingBox;
use crate::model::{Building, Category, CompanyRecord, NewBuilding, NewCompany};
use serde::Serialize;
use std::collections::BTreeSet;

/// Default page size for listings
pub const DEFAULT_LIMIT: u64 = 100;
/// Largest page a caller may ask for
pub const MAX_LIMIT: u64 = 1000;

/// Offset pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    pub limit: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    /// Every row, for queries the API does not paginate
    pub const ALL: Page = Page {
        skip: 0,
        limit: u64::MAX,
    };

    pub fn new(skip: u64, limit: u64) -> Self {
        Self { skip, limit }
    }
}

/// Predicates for company queries; unset fields do not filter.
///
/// Results are always distinct and ordered by company id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyFilter {
    pub active_only: bool,
    pub building_id: Option<i64>,
    /// Companies associated with at least one of these categories
    pub category_ids: Option<BTreeSet<i64>>,
    /// Case-sensitive substring of the company name
    pub name_contains: Option<String>,
    /// Inclusive range on the company building's coordinates
    pub within: Option<BoundingBox>,
}

impl CompanyFilter {
    pub fn active_only(active_only: bool) -> Self {
        Self {
            active_only,
            ..Self::default()
        }
    }

    pub fn in_building(mut self, building_id: i64) -> Self {
        self.building_id = Some(building_id);
        self
    }

    pub fn in_categories(mut self, ids: BTreeSet<i64>) -> Self {
        self.category_ids = Some(ids);
        self
    }

    pub fn name_contains(mut self, needle: impl Into<String>) -> Self {
        self.name_contains = Some(needle.into());
        self
    }

    pub fn within(mut self, bbox: BoundingBox) -> Self {
        self.within = Some(bbox);
        self
    }
}

/// Row counts reported by the statistics endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub buildings: i64,
    pub categories: i64,
    pub companies: i64,
    pub active_companies: i64,
}

/// Operations available inside one store transaction
pub trait StoreSession {
    /// Trivial round trip proving the store answers
    fn ping(&self) -> CatalogResult<()>;

    fn find_building(&self, id: i64) -> CatalogResult<Option<Building>>;
    fn find_buildings(&self, ids: &[i64]) -> CatalogResult<Vec<Building>>;
    /// Buildings ordered by id
    fn list_buildings(&self, page: Page) -> CatalogResult<Vec<Building>>;
    fn insert_building(&self, new: &NewBuilding) -> CatalogResult<Building>;
    /// Writes address and coordinates, refreshing `updated_at`
    fn update_building(&self, building: &Building) -> CatalogResult<Building>;
    /// Returns whether a row was deleted
    fn delete_building(&self, id: i64) -> CatalogResult<bool>;
    fn count_companies_in_building(&self, building_id: i64) -> CatalogResult<i64>;

    fn find_category(&self, id: i64) -> CatalogResult<Option<Category>>;
    fn find_categories(&self, ids: &[i64]) -> CatalogResult<Vec<Category>>;
    fn list_categories(&self) -> CatalogResult<Vec<Category>>;
    /// Direct children ordered by name
    fn find_child_categories(&self, parent_id: i64) -> CatalogResult<Vec<Category>>;
    /// Categories whose path is `root_path` or starts with `root_path + "/"`
    fn find_categories_in_subtree(&self, root_path: &str) -> CatalogResult<Vec<Category>>;
    /// First half of the two-step category write: the row gets its id with an
    /// empty path, to be completed by [`StoreSession::update_category_path`]
    fn insert_category(&self, name: &str, parent_id: Option<i64>) -> CatalogResult<Category>;
    fn update_category_path(&self, id: i64, path: &str, level: i32) -> CatalogResult<Category>;
    fn rename_category(&self, id: i64, name: &str) -> CatalogResult<Category>;
    fn delete_categories(&self, ids: &BTreeSet<i64>) -> CatalogResult<u64>;

    fn find_company(&self, id: i64) -> CatalogResult<Option<CompanyRecord>>;
    fn find_companies(&self, filter: &CompanyFilter, page: Page) -> CatalogResult<Vec<CompanyRecord>>;
    /// Inserts the company row; associations are written separately
    fn insert_company(&self, new: &NewCompany) -> CatalogResult<CompanyRecord>;
    /// Writes every scalar field of `record`, refreshing `updated_at`
    fn update_company(&self, record: &CompanyRecord) -> CatalogResult<CompanyRecord>;
    /// Deletes the company and its category associations
    fn delete_company(&self, id: i64) -> CatalogResult<bool>;

    /// `(company_id, category_id)` pairs for the given companies
    fn company_category_links(&self, company_ids: &[i64]) -> CatalogResult<Vec<(i64, i64)>>;
    fn replace_company_categories(&self, company_id: i64, category_ids: &[i64]) -> CatalogResult<()>;
    /// Drops every association pointing at one of `category_ids`
    fn unlink_categories(&self, category_ids: &BTreeSet<i64>) -> CatalogResult<u64>;

    fn stats(&self) -> CatalogResult<StoreStats>;
    /// Removes every row from every table
    fn clear_all(&self) -> CatalogResult<()>;
}

/// Transactional entry point to the directory
pub trait DirectoryStore: Send + Sync {
    /// Runs `work` inside one transaction, committing on `Ok` and rolling
    /// back on `Err`.
    fn transaction<R, F>(&self, work: F) -> CatalogResult<R>
    where
        F: FnOnce(&dyn StoreSession) -> CatalogResult<R>;

    /// Short name for logs
    fn backend(&self) -> &'static str;
}

/// Configured store backend
pub enum AnyStore {
    Postgres(PgStore),
    Memory(MemoryStore),
}

impl DirectoryStore for AnyStore {
    fn transaction<R, F>(&self, work: F) -> CatalogResult<R>
    where
        F: FnOnce(&dyn StoreSession) -> CatalogResult<R>,
    {
        match self {
            AnyStore::Postgres(store) => store.transaction(work),
            AnyStore::Memory(store) => store.transaction(work),
        }
    }

    fn backend(&self) -> &'static str {
        match self {
            AnyStore::Postgres(store) => store.backend(),
            AnyStore::Memory(store) => store.backend(),
        }
    }
}

impl From<PgStore> for AnyStore {
    fn from(store: PgStore) -> Self {
        AnyStore::Postgres(store)
    }
}

impl From<MemoryStore> for AnyStore {
    fn from(store: MemoryStore) -> Self {
        AnyStore::Memory(store)
    }
}
