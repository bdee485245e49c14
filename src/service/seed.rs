//! Demo data generation.
//!
//! Wipes every table and loads a small Moscow directory: five buildings, a
//! three-level category tree and six companies. Everything happens in one
//! transaction, so a failure leaves the previous data untouched.

use crate::error::{CatalogError, CatalogResult};
use crate::hierarchy;
use crate::model::{Category, NewBuilding, NewCompany};
use crate::store::{DirectoryStore, StoreSession};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeedCounts {
    pub buildings: i64,
    pub categories: i64,
    pub companies: i64,
}

const BUILDINGS: [(&str, f64, f64); 5] = [
    ("ул. Блюхера, 32/1", 55.751244, 37.618423),
    ("ул. Ленина, 15", 55.752244, 37.619423),
    ("пр. Мира, 100", 55.753244, 37.620423),
    ("ул. Арбат, 25", 55.750244, 37.617423),
    ("Тверская ул., 12", 55.754244, 37.621423),
];

struct Tree {
    meat: Category,
    semifinished: Category,
    vegetables: Category,
    trucks: Category,
    cars: Category,
    suspension: Category,
    tires: Category,
}

fn category(s: &dyn StoreSession, name: &str, parent: Option<&Category>) -> CatalogResult<Category> {
    hierarchy::create_with_path(s, name, parent)
}

fn categories(s: &dyn StoreSession) -> CatalogResult<Tree> {
    let food = category(s, "Еда", None)?;
    let auto = category(s, "Автомобили", None)?;
    category(s, "Спорт", None)?;

    let parts = category(s, "Запчасти", Some(&auto))?;
    Ok(Tree {
        meat: category(s, "Мясная продукция", Some(&food))?,
        semifinished: category(s, "Полуфабрикаты оптом", Some(&food))?,
        vegetables: category(s, "Овощи", Some(&food))?,
        trucks: category(s, "Грузовые", Some(&auto))?,
        cars: category(s, "Легковые", Some(&auto))?,
        suspension: category(s, "Запчасти для подвески", Some(&parts))?,
        tires: category(s, "Шины/Диски", Some(&parts))?,
    })
}

fn company(
    name: &str,
    phones: &[&str],
    description: &str,
    website: Option<&str>,
    email: Option<&str>,
    building_id: i64,
    categories: &[&Category],
) -> NewCompany {
    NewCompany {
        name: name.to_string(),
        phones: phones.iter().map(|p| p.to_string()).collect(),
        description: Some(description.to_string()),
        website: website.map(str::to_string),
        email: email.map(str::to_string),
        building_id,
        category_ids: categories.iter().map(|c| c.id).collect(),
        is_active: true,
    }
}

fn populate(s: &dyn StoreSession) -> CatalogResult<SeedCounts> {
    s.clear_all()?;

    let mut building_ids = Vec::with_capacity(BUILDINGS.len());
    for (address, latitude, longitude) in BUILDINGS {
        let building = s.insert_building(&NewBuilding {
            address: address.to_string(),
            latitude,
            longitude,
        })?;
        building_ids.push(building.id);
    }

    let t = categories(s)?;

    let companies = [
        company(
            "ООО \"Рога и Копыта\"",
            &["2-222-222", "3-333-333", "8-923-666-13-13"],
            "Мясоперерабатывающее предприятие",
            Some("https://roga-kopyta.ru"),
            Some("info@roga-kopyta.ru"),
            building_ids[0],
            &[&t.meat, &t.semifinished],
        ),
        company(
            "Автосалон \"Премиум\"",
            &["8-800-555-35-35", "495-123-45-67"],
            "Продажа легковых автомобилей премиум класса",
            Some("https://premium-auto.ru"),
            Some("sales@premium-auto.ru"),
            building_ids[1],
            &[&t.cars],
        ),
        company(
            "Грузоперевозки \"Быстро\"",
            &["8-912-345-67-89"],
            "Грузоперевозки по всей России",
            Some("https://bistro-gruz.ru"),
            Some("order@bistro-gruz.ru"),
            building_ids[2],
            &[&t.trucks],
        ),
        company(
            "Шинный центр \"Колесо\"",
            &["8-495-111-22-33", "8-495-444-55-66"],
            "Продажа и установка шин и дисков",
            Some("https://koleso-center.ru"),
            Some("info@koleso-center.ru"),
            building_ids[3],
            &[&t.tires],
        ),
        company(
            "Фермерские продукты \"Эко\"",
            &["8-916-777-88-99"],
            "Натуральные овощи и фрукты",
            Some("https://eco-farm.ru"),
            Some("contact@eco-farm.ru"),
            building_ids[4],
            &[&t.vegetables],
        ),
        company(
            "Автозапчасти \"Подвеска+\"",
            &["8-499-123-45-67"],
            "Специализированный магазин запчастей для подвески",
            None,
            None,
            building_ids[0],
            &[&t.suspension],
        ),
    ];
    for new in &companies {
        new.validate()?;
        let record = s.insert_company(new)?;
        s.replace_company_categories(record.id, &new.category_ids)?;
    }

    let stats = s.stats()?;
    Ok(SeedCounts {
        buildings: stats.buildings,
        categories: stats.categories,
        companies: stats.companies,
    })
}

/// Replaces all data with the demo set and returns the resulting row counts
pub fn generate<S: DirectoryStore>(store: &S) -> CatalogResult<SeedCounts> {
    match store.transaction(populate) {
        Ok(counts) => {
            log::info!(
                "test data generated: {} buildings, {} categories, {} companies",
                counts.buildings,
                counts.categories,
                counts.companies
            );
            Ok(counts)
        }
        Err(e) => {
            log::error!("Error generating test data: {e}");
            Err(CatalogError::Internal(format!(
                "Error generating test data: {}",
                e.detail()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::LocationParams;
    use crate::model::{Building, CompanyRecord};
    use crate::service::{buildings, categories, companies, fixtures};
    use crate::store::{CompanyFilter, MemoryStore, Page, StoreStats};
    use std::cell::Cell;
    use std::collections::BTreeSet;

    /// Memory store whose sessions reject the `fail_on`-th company insert
    struct FlakyStore {
        inner: MemoryStore,
        fail_on: usize,
    }

    struct FlakySession<'a> {
        inner: &'a dyn StoreSession,
        fail_on: usize,
        companies: Cell<usize>,
    }

    impl DirectoryStore for FlakyStore {
        fn transaction<R, F>(&self, work: F) -> CatalogResult<R>
        where
            F: FnOnce(&dyn StoreSession) -> CatalogResult<R>,
        {
            self.inner.transaction(|inner| {
                work(&FlakySession {
                    inner,
                    fail_on: self.fail_on,
                    companies: Cell::new(0),
                })
            })
        }

        fn backend(&self) -> &'static str {
            "flaky"
        }
    }

    impl StoreSession for FlakySession<'_> {
        fn ping(&self) -> CatalogResult<()> {
            self.inner.ping()
        }
        fn find_building(&self, id: i64) -> CatalogResult<Option<Building>> {
            self.inner.find_building(id)
        }
        fn find_buildings(&self, ids: &[i64]) -> CatalogResult<Vec<Building>> {
            self.inner.find_buildings(ids)
        }
        fn list_buildings(&self, page: Page) -> CatalogResult<Vec<Building>> {
            self.inner.list_buildings(page)
        }
        fn insert_building(&self, new: &NewBuilding) -> CatalogResult<Building> {
            self.inner.insert_building(new)
        }
        fn update_building(&self, building: &Building) -> CatalogResult<Building> {
            self.inner.update_building(building)
        }
        fn delete_building(&self, id: i64) -> CatalogResult<bool> {
            self.inner.delete_building(id)
        }
        fn count_companies_in_building(&self, building_id: i64) -> CatalogResult<i64> {
            self.inner.count_companies_in_building(building_id)
        }
        fn find_category(&self, id: i64) -> CatalogResult<Option<Category>> {
            self.inner.find_category(id)
        }
        fn find_categories(&self, ids: &[i64]) -> CatalogResult<Vec<Category>> {
            self.inner.find_categories(ids)
        }
        fn list_categories(&self) -> CatalogResult<Vec<Category>> {
            self.inner.list_categories()
        }
        fn find_child_categories(&self, parent_id: i64) -> CatalogResult<Vec<Category>> {
            self.inner.find_child_categories(parent_id)
        }
        fn find_categories_in_subtree(&self, root_path: &str) -> CatalogResult<Vec<Category>> {
            self.inner.find_categories_in_subtree(root_path)
        }
        fn insert_category(&self, name: &str, parent_id: Option<i64>) -> CatalogResult<Category> {
            self.inner.insert_category(name, parent_id)
        }
        fn update_category_path(&self, id: i64, path: &str, level: i32) -> CatalogResult<Category> {
            self.inner.update_category_path(id, path, level)
        }
        fn rename_category(&self, id: i64, name: &str) -> CatalogResult<Category> {
            self.inner.rename_category(id, name)
        }
        fn delete_categories(&self, ids: &BTreeSet<i64>) -> CatalogResult<u64> {
            self.inner.delete_categories(ids)
        }
        fn find_company(&self, id: i64) -> CatalogResult<Option<CompanyRecord>> {
            self.inner.find_company(id)
        }
        fn find_companies(&self, filter: &CompanyFilter, page: Page) -> CatalogResult<Vec<CompanyRecord>> {
            self.inner.find_companies(filter, page)
        }
        fn insert_company(&self, new: &NewCompany) -> CatalogResult<CompanyRecord> {
            let n = self.companies.get() + 1;
            self.companies.set(n);
            if n == self.fail_on {
                return Err(CatalogError::Internal("disk full".to_string()));
            }
            self.inner.insert_company(new)
        }
        fn update_company(&self, record: &CompanyRecord) -> CatalogResult<CompanyRecord> {
            self.inner.update_company(record)
        }
        fn delete_company(&self, id: i64) -> CatalogResult<bool> {
            self.inner.delete_company(id)
        }
        fn company_category_links(&self, company_ids: &[i64]) -> CatalogResult<Vec<(i64, i64)>> {
            self.inner.company_category_links(company_ids)
        }
        fn replace_company_categories(&self, company_id: i64, category_ids: &[i64]) -> CatalogResult<()> {
            self.inner.replace_company_categories(company_id, category_ids)
        }
        fn unlink_categories(&self, category_ids: &BTreeSet<i64>) -> CatalogResult<u64> {
            self.inner.unlink_categories(category_ids)
        }
        fn stats(&self) -> CatalogResult<StoreStats> {
            self.inner.stats()
        }
        fn clear_all(&self) -> CatalogResult<()> {
            self.inner.clear_all()
        }
    }

    #[test]
    fn test_generate_counts() {
        let store = MemoryStore::new();
        let counts = generate(&store).unwrap();
        assert_eq!(
            counts,
            SeedCounts {
                buildings: 5,
                categories: 11,
                companies: 6
            }
        );
    }

    #[test]
    fn test_generate_replaces_previous_data() {
        let store = MemoryStore::new();
        generate(&store).unwrap();
        let again = generate(&store).unwrap();
        assert_eq!(again.companies, 6);
        assert_eq!(companies::list(&store, false, Page::default()).unwrap().len(), 6);
    }

    #[test]
    fn test_seeded_paths_follow_hierarchy() {
        let store = MemoryStore::new();
        generate(&store).unwrap();
        for node in categories::list(&store, true).unwrap() {
            let c = node.category;
            let expected = match c.parent_id {
                None => c.id.to_string(),
                Some(parent) => {
                    let parent = categories::get(&store, parent).unwrap().category;
                    format!("{}/{}", parent.path, c.id)
                }
            };
            assert_eq!(c.path, expected);
        }
    }

    #[test]
    fn test_seeded_auto_subtree() {
        let store = MemoryStore::new();
        generate(&store).unwrap();
        let auto = categories::list(&store, false)
            .unwrap()
            .into_iter()
            .find(|n| n.category.name == "Автомобили")
            .unwrap();
        let found = companies::by_category(&store, auto.category.id, true, true).unwrap();
        assert_eq!(found.len(), 4);

        let near = LocationParams {
            latitude: 55.7512,
            longitude: 37.6184,
            radius_km: Some(5.0),
            ..LocationParams::default()
        };
        assert_eq!(companies::by_location(&store, &near, true).unwrap().len(), 6);
    }

    #[test]
    fn test_failed_generation_keeps_previous_data() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            fail_on: 4,
        };
        let building = buildings::create(&store, fixtures::building("ул. Арбат, 25", 55.750244, 37.617423)).unwrap();
        let sport = categories::create(&store, fixtures::category("Спорт", None)).unwrap();
        companies::create(&store, fixtures::company("Стадион", building.id, vec![sport.id])).unwrap();

        let err = generate(&store).unwrap_err();
        assert_eq!(
            err,
            CatalogError::Internal("Error generating test data: disk full".to_string())
        );

        let kept = companies::list(&store, false, Page::default()).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "Стадион");
        assert_eq!(buildings::list(&store, Page::default()).unwrap(), vec![building]);
        let names: Vec<String> = categories::list(&store, true)
            .unwrap()
            .into_iter()
            .map(|n| n.category.name)
            .collect();
        assert_eq!(names, vec!["Спорт"]);
    }
}
