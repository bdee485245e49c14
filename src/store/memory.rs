//! Volatile in-process store.
//!
//! Transactions run against a private copy of the state; the copy replaces
//! the shared state only when the work closure returns `Ok`. The store lock is
//! held for the whole transaction, so transactions are serialized.

use super::{CompanyFilter, DirectoryStore, Page, StoreSession, StoreStats};
use crate::error::{CatalogError, CatalogResult};
use crate::hierarchy;
use crate::model::{Building, Category, CompanyRecord, NewBuilding, NewCompany};
use chrono::{NaiveDateTime, Utc};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct Sequences {
    building: i64,
    category: i64,
    company: i64,
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

#[derive(Debug, Clone, Default)]
struct State {
    seq: Sequences,
    buildings: BTreeMap<i64, Building>,
    categories: BTreeMap<i64, Category>,
    companies: BTreeMap<i64, CompanyRecord>,
    /// `(company_id, category_id)`
    links: BTreeSet<(i64, i64)>,
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn constraint(msg: impl Into<String>) -> CatalogError {
    CatalogError::Internal(format!("constraint violation: {}", msg.into()))
}

fn window<T>(items: impl Iterator<Item = T>, page: Page) -> Vec<T> {
    let skip = usize::try_from(page.skip).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
    items.skip(skip).take(limit).collect()
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DirectoryStore for MemoryStore {
    fn transaction<R, F>(&self, work: F) -> CatalogResult<R>
    where
        F: FnOnce(&dyn StoreSession) -> CatalogResult<R>,
    {
        let mut shared = self
            .state
            .lock()
            .map_err(|_| CatalogError::Internal("memory store lock poisoned".to_string()))?;
        let session = MemorySession {
            state: RefCell::new(shared.clone()),
        };
        match work(&session) {
            Ok(result) => {
                *shared = session.state.into_inner();
                Ok(result)
            }
            Err(e) => {
                log::debug!("memory transaction rolled back: {e}");
                Err(e)
            }
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

struct MemorySession {
    state: RefCell<State>,
}

impl MemorySession {
    fn company_matches(state: &State, company: &CompanyRecord, filter: &CompanyFilter) -> bool {
        if filter.active_only && !company.is_active {
            return false;
        }
        if let Some(building_id) = filter.building_id {
            if company.building_id != building_id {
                return false;
            }
        }
        if let Some(category_ids) = &filter.category_ids {
            let linked = category_ids
                .iter()
                .any(|cat| state.links.contains(&(company.id, *cat)));
            if !linked {
                return false;
            }
        }
        if let Some(needle) = &filter.name_contains {
            if !company.name.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(bbox) = &filter.within {
            match state.buildings.get(&company.building_id) {
                Some(building) if bbox.contains(&building.position()) => {}
                _ => return false,
            }
        }
        true
    }
}

impl StoreSession for MemorySession {
    fn ping(&self) -> CatalogResult<()> {
        Ok(())
    }

    fn find_building(&self, id: i64) -> CatalogResult<Option<Building>> {
        Ok(self.state.borrow().buildings.get(&id).cloned())
    }

    fn find_buildings(&self, ids: &[i64]) -> CatalogResult<Vec<Building>> {
        let state = self.state.borrow();
        let wanted: BTreeSet<i64> = ids.iter().copied().collect();
        Ok(wanted
            .iter()
            .filter_map(|id| state.buildings.get(id).cloned())
            .collect())
    }

    fn list_buildings(&self, page: Page) -> CatalogResult<Vec<Building>> {
        Ok(window(self.state.borrow().buildings.values().cloned(), page))
    }

    fn insert_building(&self, new: &NewBuilding) -> CatalogResult<Building> {
        let mut state = self.state.borrow_mut();
        let id = next(&mut state.seq.building);
        let ts = now();
        let building = Building {
            id,
            address: new.address.clone(),
            latitude: new.latitude,
            longitude: new.longitude,
            created_at: ts,
            updated_at: ts,
        };
        state.buildings.insert(id, building.clone());
        Ok(building)
    }

    fn update_building(&self, building: &Building) -> CatalogResult<Building> {
        let mut state = self.state.borrow_mut();
        let stored = state
            .buildings
            .get_mut(&building.id)
            .ok_or_else(|| CatalogError::not_found("Building not found"))?;
        stored.address = building.address.clone();
        stored.latitude = building.latitude;
        stored.longitude = building.longitude;
        stored.updated_at = now();
        Ok(stored.clone())
    }

    fn delete_building(&self, id: i64) -> CatalogResult<bool> {
        let mut state = self.state.borrow_mut();
        if state.companies.values().any(|c| c.building_id == id) {
            return Err(constraint(format!("building {id} is still referenced")));
        }
        Ok(state.buildings.remove(&id).is_some())
    }

    fn count_companies_in_building(&self, building_id: i64) -> CatalogResult<i64> {
        let state = self.state.borrow();
        let count = state
            .companies
            .values()
            .filter(|c| c.building_id == building_id)
            .count();
        Ok(count as i64)
    }

    fn find_category(&self, id: i64) -> CatalogResult<Option<Category>> {
        Ok(self.state.borrow().categories.get(&id).cloned())
    }

    fn find_categories(&self, ids: &[i64]) -> CatalogResult<Vec<Category>> {
        let state = self.state.borrow();
        let wanted: BTreeSet<i64> = ids.iter().copied().collect();
        Ok(wanted
            .iter()
            .filter_map(|id| state.categories.get(id).cloned())
            .collect())
    }

    fn list_categories(&self) -> CatalogResult<Vec<Category>> {
        Ok(self.state.borrow().categories.values().cloned().collect())
    }

    fn find_child_categories(&self, parent_id: i64) -> CatalogResult<Vec<Category>> {
        let mut children: Vec<Category> = self
            .state
            .borrow()
            .categories
            .values()
            .filter(|c| c.parent_id == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(children)
    }

    fn find_categories_in_subtree(&self, root_path: &str) -> CatalogResult<Vec<Category>> {
        Ok(self
            .state
            .borrow()
            .categories
            .values()
            .filter(|c| hierarchy::in_subtree(root_path, &c.path))
            .cloned()
            .collect())
    }

    fn insert_category(&self, name: &str, parent_id: Option<i64>) -> CatalogResult<Category> {
        let mut state = self.state.borrow_mut();
        if let Some(parent_id) = parent_id {
            if !state.categories.contains_key(&parent_id) {
                return Err(constraint(format!("parent category {parent_id} missing")));
            }
        }
        let id = next(&mut state.seq.category);
        let ts = now();
        let category = Category {
            id,
            name: name.to_string(),
            parent_id,
            level: 0,
            path: String::new(),
            created_at: ts,
            updated_at: ts,
        };
        state.categories.insert(id, category.clone());
        Ok(category)
    }

    fn update_category_path(&self, id: i64, path: &str, level: i32) -> CatalogResult<Category> {
        let mut state = self.state.borrow_mut();
        let stored = state
            .categories
            .get_mut(&id)
            .ok_or_else(|| CatalogError::not_found("Category not found"))?;
        stored.path = path.to_string();
        stored.level = level;
        stored.updated_at = now();
        Ok(stored.clone())
    }

    fn rename_category(&self, id: i64, name: &str) -> CatalogResult<Category> {
        let mut state = self.state.borrow_mut();
        let stored = state
            .categories
            .get_mut(&id)
            .ok_or_else(|| CatalogError::not_found("Category not found"))?;
        stored.name = name.to_string();
        stored.updated_at = now();
        Ok(stored.clone())
    }

    fn delete_categories(&self, ids: &BTreeSet<i64>) -> CatalogResult<u64> {
        let mut state = self.state.borrow_mut();
        let mut doomed: BTreeSet<i64> = ids
            .iter()
            .copied()
            .filter(|id| state.categories.contains_key(id))
            .collect();
        // parent_id cascades
        loop {
            let orphans: Vec<i64> = state
                .categories
                .values()
                .filter(|c| !doomed.contains(&c.id))
                .filter(|c| c.parent_id.is_some_and(|p| doomed.contains(&p)))
                .map(|c| c.id)
                .collect();
            if orphans.is_empty() {
                break;
            }
            doomed.extend(orphans);
        }
        for id in &doomed {
            state.categories.remove(id);
        }
        state.links.retain(|(_, cat)| !doomed.contains(cat));
        Ok(doomed.len() as u64)
    }

    fn find_company(&self, id: i64) -> CatalogResult<Option<CompanyRecord>> {
        Ok(self.state.borrow().companies.get(&id).cloned())
    }

    fn find_companies(&self, filter: &CompanyFilter, page: Page) -> CatalogResult<Vec<CompanyRecord>> {
        let state = self.state.borrow();
        let matching = state
            .companies
            .values()
            .filter(|c| Self::company_matches(&state, c, filter))
            .cloned();
        Ok(window(matching, page))
    }

    fn insert_company(&self, new: &NewCompany) -> CatalogResult<CompanyRecord> {
        let mut state = self.state.borrow_mut();
        if !state.buildings.contains_key(&new.building_id) {
            return Err(constraint(format!("building {} missing", new.building_id)));
        }
        let id = next(&mut state.seq.company);
        let ts = now();
        let record = CompanyRecord {
            id,
            name: new.name.clone(),
            phones: new.phones.clone(),
            description: new.description.clone(),
            website: new.website.clone(),
            email: new.email.clone(),
            building_id: new.building_id,
            is_active: new.is_active,
            created_at: ts,
            updated_at: ts,
        };
        state.companies.insert(id, record.clone());
        Ok(record)
    }

    fn update_company(&self, record: &CompanyRecord) -> CatalogResult<CompanyRecord> {
        let mut state = self.state.borrow_mut();
        if !state.buildings.contains_key(&record.building_id) {
            return Err(constraint(format!("building {} missing", record.building_id)));
        }
        let stored = state
            .companies
            .get_mut(&record.id)
            .ok_or_else(|| CatalogError::not_found("Company not found"))?;
        let created_at = stored.created_at;
        *stored = CompanyRecord {
            created_at,
            updated_at: now(),
            ..record.clone()
        };
        Ok(stored.clone())
    }

    fn delete_company(&self, id: i64) -> CatalogResult<bool> {
        let mut state = self.state.borrow_mut();
        state.links.retain(|(company, _)| *company != id);
        Ok(state.companies.remove(&id).is_some())
    }

    fn company_category_links(&self, company_ids: &[i64]) -> CatalogResult<Vec<(i64, i64)>> {
        let state = self.state.borrow();
        let wanted: BTreeSet<i64> = company_ids.iter().copied().collect();
        Ok(state
            .links
            .iter()
            .filter(|(company, _)| wanted.contains(company))
            .copied()
            .collect())
    }

    fn replace_company_categories(&self, company_id: i64, category_ids: &[i64]) -> CatalogResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.companies.contains_key(&company_id) {
            return Err(constraint(format!("company {company_id} missing")));
        }
        if let Some(missing) = category_ids.iter().find(|id| !state.categories.contains_key(id)) {
            return Err(constraint(format!("category {missing} missing")));
        }
        state.links.retain(|(company, _)| *company != company_id);
        state
            .links
            .extend(category_ids.iter().map(|cat| (company_id, *cat)));
        Ok(())
    }

    fn unlink_categories(&self, category_ids: &BTreeSet<i64>) -> CatalogResult<u64> {
        let mut state = self.state.borrow_mut();
        let before = state.links.len();
        state.links.retain(|(_, cat)| !category_ids.contains(cat));
        Ok((before - state.links.len()) as u64)
    }

    fn stats(&self) -> CatalogResult<StoreStats> {
        let state = self.state.borrow();
        Ok(StoreStats {
            buildings: state.buildings.len() as i64,
            categories: state.categories.len() as i64,
            companies: state.companies.len() as i64,
            active_companies: state.companies.values().filter(|c| c.is_active).count() as i64,
        })
    }

    fn clear_all(&self) -> CatalogResult<()> {
        let mut state = self.state.borrow_mut();
        state.links.clear();
        state.companies.clear();
        state.categories.clear();
        state.buildings.clear();
        Ok(())
    }
}
