//! Store and service behaviour against a real PostgreSQL database.
//!
//! Set `CATALOG_TEST_DATABASE_URL` to run these; without it every test
//! returns immediately. The tests wipe the catalog tables of that database.

use catalog::geo::LocationParams;
use catalog::model::{NewBuilding, NewCategory, NewCompany};
use catalog::service::{buildings, categories, companies, seed, system};
use catalog::{CatalogError, DatabaseConfig, DirectoryStore, PgStore};
use once_cell::sync::Lazy;
use std::sync::{Mutex, MutexGuard};

const URL_VAR: &str = "CATALOG_TEST_DATABASE_URL";

// All tests share one database, so they run one at a time.
static SERIAL: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn store() -> Option<(PgStore, MutexGuard<'static, ()>)> {
    let url = match std::env::var(URL_VAR) {
        Ok(url) => url,
        Err(_) => {
            eprintln!("{URL_VAR} not set, skipping");
            return None;
        }
    };
    let guard = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let config = DatabaseConfig {
        url,
        max_connections: 2,
        ..DatabaseConfig::default()
    };
    let store = PgStore::connect(&config).expect("connect");
    store.initialize_schema().expect("schema");
    store.transaction(|s| s.clear_all()).expect("clear");
    Some((store, guard))
}

#[test]
fn test_schema_bootstrap_is_idempotent() {
    let Some((store, _guard)) = store() else { return };
    store.initialize_schema().unwrap();

    let conn = store.pool().checkout().unwrap();
    let row = conn
        .query_one(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_name IN ('buildings', 'categories', 'companies', 'company_categories')",
            &[],
        )
        .unwrap();
    let tables: i64 = row.get(0);
    assert_eq!(tables, 4);
    assert!(store.check_health().unwrap());
}

#[test]
fn test_category_paths_are_written_in_one_transaction() {
    let Some((store, _guard)) = store() else { return };
    let food = categories::create(
        &store,
        NewCategory {
            name: "Еда".to_string(),
            parent_id: None,
        },
    )
    .unwrap();
    let meat = categories::create(
        &store,
        NewCategory {
            name: "Мясо".to_string(),
            parent_id: Some(food.id),
        },
    )
    .unwrap();

    assert_eq!(food.path, food.id.to_string());
    assert_eq!(meat.path, format!("{}/{}", food.id, meat.id));
    assert_eq!(meat.level, 1);

    let err = categories::create(
        &store,
        NewCategory {
            name: "Сироты".to_string(),
            parent_id: Some(meat.id + 1000),
        },
    )
    .unwrap_err();
    assert_eq!(err, CatalogError::not_found("Parent category not found"));

    let stats = system::stats(&store).unwrap();
    assert_eq!(stats.categories, 2);
}

#[test]
fn test_subtree_and_geo_search_through_postgres() {
    let Some((store, _guard)) = store() else { return };
    let counts = seed::generate(&store).unwrap();
    assert_eq!((counts.buildings, counts.categories, counts.companies), (5, 11, 6));

    let auto = categories::list(&store, true)
        .unwrap()
        .into_iter()
        .find(|n| n.category.name == "Автомобили")
        .unwrap();
    assert_eq!(companies::by_category(&store, auto.category.id, true, true).unwrap().len(), 4);
    assert!(companies::by_category(&store, auto.category.id, false, true).unwrap().is_empty());

    let near = LocationParams {
        latitude: 55.7512,
        longitude: 37.6184,
        radius_km: Some(5.0),
        ..LocationParams::default()
    };
    assert_eq!(companies::by_location(&store, &near, true).unwrap().len(), 6);

    let boxed = LocationParams {
        latitude: 55.7512,
        longitude: 37.6184,
        min_lat: Some(55.7505),
        max_lat: Some(55.7515),
        min_lng: Some(37.6170),
        max_lng: Some(37.6190),
        ..LocationParams::default()
    };
    let found = companies::by_location(&store, &boxed, true).unwrap();
    assert!(found.iter().all(|c| c.building.latitude <= 55.7515));
    assert!(!found.is_empty());
}

#[test]
fn test_company_round_trip_and_building_conflict() {
    let Some((store, _guard)) = store() else { return };
    let building = buildings::create(
        &store,
        NewBuilding {
            address: "ул. Арбат, 25".to_string(),
            latitude: 55.750244,
            longitude: 37.617423,
        },
    )
    .unwrap();
    let category = categories::create(
        &store,
        NewCategory {
            name: "Спорт".to_string(),
            parent_id: None,
        },
    )
    .unwrap();
    let company = companies::create(
        &store,
        NewCompany {
            name: "Стадион".to_string(),
            phones: vec!["8-495-111-11-11".to_string(), "8-495-222-22-22".to_string()],
            description: None,
            website: None,
            email: Some("info@stadium.ru".to_string()),
            building_id: building.id,
            category_ids: vec![category.id],
            is_active: true,
        },
    )
    .unwrap();

    let loaded = companies::get(&store, company.id).unwrap();
    assert_eq!(loaded.phones, company.phones);
    assert_eq!(loaded.categories.len(), 1);

    let err = buildings::delete(&store, building.id).unwrap_err();
    assert!(matches!(err, CatalogError::Conflict(_)));

    companies::delete(&store, company.id).unwrap();
    buildings::delete(&store, building.id).unwrap();
}
