//! Catalog operations.
//!
//! Every public function takes the store handle explicitly and runs as one
//! store transaction: lookups that guard a write happen inside the same
//! transaction as the write, and any error rolls the whole request back.

pub mod buildings;
pub mod categories;
pub mod companies;
pub mod seed;
pub mod system;

use crate::error::{CatalogError, CatalogResult};

fn found<T>(value: Option<T>, what: &str) -> CatalogResult<T> {
    value.ok_or_else(|| CatalogError::not_found(format!("{what} not found")))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::model::{NewBuilding, NewCategory, NewCompany};

    pub fn building(address: &str, latitude: f64, longitude: f64) -> NewBuilding {
        NewBuilding {
            address: address.to_string(),
            latitude,
            longitude,
        }
    }

    pub fn category(name: &str, parent_id: Option<i64>) -> NewCategory {
        NewCategory {
            name: name.to_string(),
            parent_id,
        }
    }

    pub fn company(name: &str, building_id: i64, category_ids: Vec<i64>) -> NewCompany {
        NewCompany {
            name: name.to_string(),
            phones: vec!["1-111-111".to_string(), "2-222-222".to_string()],
            description: None,
            website: None,
            email: None,
            building_id,
            category_ids,
            is_active: true,
        }
    }
}
