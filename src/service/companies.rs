//! Company operations: CRUD, relation lookups and location search.
//!
//! Company rows are read first; their buildings and categories are then
//! loaded in one batch per relation and stitched together in memory.

use super::found;
use crate::error::{CatalogError, CatalogResult};
use crate::geo::{self, LocationParams, LocationQuery};
use crate::hierarchy;
use crate::model::{
    validate, Building, Category, Company, CompanyPatch, CompanyRecord, CompanySummary, NewCompany,
};
use crate::store::{CompanyFilter, DirectoryStore, Page, StoreSession};
use std::collections::{BTreeSet, HashMap};

/// Attaches each record's building and categories
fn hydrate(s: &dyn StoreSession, records: Vec<CompanyRecord>) -> CatalogResult<Vec<Company>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let building_ids: Vec<i64> = records
        .iter()
        .map(|r| r.building_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let buildings: HashMap<i64, Building> = s
        .find_buildings(&building_ids)?
        .into_iter()
        .map(|b| (b.id, b))
        .collect();

    let company_ids: Vec<i64> = records.iter().map(|r| r.id).collect();
    let links = s.company_category_links(&company_ids)?;
    let category_ids: Vec<i64> = links
        .iter()
        .map(|(_, category)| *category)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let categories: HashMap<i64, Category> = s
        .find_categories(&category_ids)?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    let mut by_company: HashMap<i64, Vec<Category>> = HashMap::new();
    for (company_id, category_id) in links {
        if let Some(category) = categories.get(&category_id) {
            by_company.entry(company_id).or_default().push(category.clone());
        }
    }

    records
        .into_iter()
        .map(|record| {
            let building = buildings.get(&record.building_id).cloned().ok_or_else(|| {
                CatalogError::Internal(format!(
                    "company {} references missing building {}",
                    record.id, record.building_id
                ))
            })?;
            let categories = by_company.remove(&record.id).unwrap_or_default();
            Ok(Company::from_parts(record, building, categories))
        })
        .collect()
}

fn hydrate_one(s: &dyn StoreSession, record: CompanyRecord) -> CatalogResult<Company> {
    hydrate(s, vec![record])?
        .pop()
        .ok_or_else(|| CatalogError::Internal("company vanished during load".to_string()))
}

fn summaries(companies: Vec<Company>) -> Vec<CompanySummary> {
    companies.into_iter().map(Company::summary).collect()
}

fn find_summaries(
    s: &dyn StoreSession,
    filter: &CompanyFilter,
    page: Page,
) -> CatalogResult<Vec<CompanySummary>> {
    let records = s.find_companies(filter, page)?;
    Ok(summaries(hydrate(s, records)?))
}

fn require_building(s: &dyn StoreSession, building_id: i64) -> CatalogResult<()> {
    found(s.find_building(building_id)?, "Building").map(|_| ())
}

/// Fails with `NotFound` naming every requested category that does not exist
fn require_categories(s: &dyn StoreSession, ids: &[i64]) -> CatalogResult<()> {
    let existing: BTreeSet<i64> = s.find_categories(ids)?.iter().map(|c| c.id).collect();
    let missing: Vec<i64> = ids
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .difference(&existing)
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(CatalogError::not_found(format!(
            "Categories not found: {missing:?}"
        )));
    }
    Ok(())
}

pub fn create<S: DirectoryStore>(store: &S, new: NewCompany) -> CatalogResult<Company> {
    new.validate()?;
    let company = store.transaction(|s| {
        require_building(s, new.building_id)?;
        require_categories(s, &new.category_ids)?;
        let record = s.insert_company(&new)?;
        s.replace_company_categories(record.id, &new.category_ids)?;
        hydrate_one(s, record)
    })?;
    log::info!("created company {} ({})", company.id, company.name);
    Ok(company)
}

pub fn get<S: DirectoryStore>(store: &S, id: i64) -> CatalogResult<Company> {
    validate::id("company_id", id)?;
    store.transaction(|s| {
        let record = found(s.find_company(id)?, "Company")?;
        hydrate_one(s, record)
    })
}

pub fn list<S: DirectoryStore>(
    store: &S,
    active_only: bool,
    page: Page,
) -> CatalogResult<Vec<CompanySummary>> {
    store.transaction(|s| find_summaries(s, &CompanyFilter::active_only(active_only), page))
}

pub fn by_building<S: DirectoryStore>(
    store: &S,
    building_id: i64,
    active_only: bool,
) -> CatalogResult<Vec<CompanySummary>> {
    validate::id("building_id", building_id)?;
    store.transaction(|s| {
        require_building(s, building_id)?;
        let filter = CompanyFilter::active_only(active_only).in_building(building_id);
        find_summaries(s, &filter, Page::ALL)
    })
}

/// Companies tagged with the category, or with any category in its subtree
/// when `include_subcategories` is set. Each company appears once.
pub fn by_category<S: DirectoryStore>(
    store: &S,
    category_id: i64,
    include_subcategories: bool,
    active_only: bool,
) -> CatalogResult<Vec<CompanySummary>> {
    validate::id("category_id", category_id)?;
    store.transaction(|s| {
        let ids = if include_subcategories {
            hierarchy::resolve_subtree_ids(s, category_id)?
        } else {
            found(s.find_category(category_id)?, "Category")?;
            BTreeSet::from([category_id])
        };
        let filter = CompanyFilter::active_only(active_only).in_categories(ids);
        find_summaries(s, &filter, Page::ALL)
    })
}

/// Case-sensitive substring search on the company name
pub fn search<S: DirectoryStore>(
    store: &S,
    q: &str,
    active_only: bool,
) -> CatalogResult<Vec<CompanySummary>> {
    if q.is_empty() {
        return Err(CatalogError::invalid("q must not be empty"));
    }
    store.transaction(|s| {
        let filter = CompanyFilter::active_only(active_only).name_contains(q);
        find_summaries(s, &filter, Page::ALL)
    })
}

/// Radius or bounding-box search around a point.
///
/// Parameters are validated before the store is touched. The box is pushed
/// down to the store. For a radius, candidate rows are narrowed by their
/// building's distance first and only the survivors are hydrated, in id order.
pub fn by_location<S: DirectoryStore>(
    store: &S,
    params: &LocationParams,
    active_only: bool,
) -> CatalogResult<Vec<CompanySummary>> {
    let query = LocationQuery::from_params(params)?;
    store.transaction(|s| match query {
        LocationQuery::Radius { origin, radius_km } => {
            let candidates = s.find_companies(&CompanyFilter::active_only(active_only), Page::ALL)?;
            let building_ids: Vec<i64> = candidates
                .iter()
                .map(|r| r.building_id)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let nearby: BTreeSet<i64> =
                geo::filter_by_radius(s.find_buildings(&building_ids)?, origin, radius_km)
                    .iter()
                    .map(|b| b.id)
                    .collect();
            let survivors = candidates
                .into_iter()
                .filter(|r| nearby.contains(&r.building_id))
                .collect();
            Ok(summaries(hydrate(s, survivors)?))
        }
        LocationQuery::Rectangle(bbox) => {
            let filter = CompanyFilter::active_only(active_only).within(bbox);
            find_summaries(s, &filter, Page::ALL)
        }
    })
}

/// Applies the supplied fields. A supplied `category_ids` replaces the whole
/// association set; referenced buildings and categories must exist.
pub fn update<S: DirectoryStore>(store: &S, id: i64, patch: CompanyPatch) -> CatalogResult<Company> {
    validate::id("company_id", id)?;
    patch.validate()?;
    store.transaction(|s| {
        let mut record = found(s.find_company(id)?, "Company")?;
        if let Some(building_id) = patch.building_id.as_set() {
            require_building(s, *building_id)?;
        }
        if let Some(category_ids) = patch.category_ids.as_set() {
            require_categories(s, category_ids)?;
        }

        patch.apply_fields(&mut record);
        let record = s.update_company(&record)?;
        if let Some(category_ids) = patch.category_ids.as_set() {
            s.replace_company_categories(id, category_ids)?;
        }
        hydrate_one(s, record)
    })
}

pub fn delete<S: DirectoryStore>(store: &S, id: i64) -> CatalogResult<()> {
    validate::id("company_id", id)?;
    store.transaction(|s| {
        found(s.find_company(id)?, "Company")?;
        s.delete_company(id)?;
        log::info!("deleted company {id}");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Building, Patch};
    use crate::service::{buildings, categories, fixtures};
    use crate::store::MemoryStore;

    struct World {
        store: MemoryStore,
        center: Building,
        far: Building,
        food: Category,
        meat: Category,
        sport: Category,
    }

    fn world() -> World {
        let store = MemoryStore::new();
        let center = buildings::create(&store, fixtures::building("ул. Ленина, 15", 55.752244, 37.619423)).unwrap();
        let far = buildings::create(&store, fixtures::building("Сергиев Посад", 56.2, 37.6184)).unwrap();
        let food = categories::create(&store, fixtures::category("Еда", None)).unwrap();
        let meat = categories::create(&store, fixtures::category("Мясо", Some(food.id))).unwrap();
        let sport = categories::create(&store, fixtures::category("Спорт", None)).unwrap();
        World {
            store,
            center,
            far,
            food,
            meat,
            sport,
        }
    }

    fn names(list: &[CompanySummary]) -> Vec<&str> {
        list.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_phones_round_trip_in_order() {
        let w = world();
        let created = create(&w.store, fixtures::company("Рога и Копыта", w.center.id, vec![w.meat.id])).unwrap();
        let fetched = get(&w.store, created.id).unwrap();
        assert_eq!(fetched.phones, vec!["1-111-111", "2-222-222"]);
        assert_eq!(fetched.building.id, w.center.id);
        assert_eq!(fetched.categories[0].id, w.meat.id);
    }

    #[test]
    fn test_create_reports_missing_categories() {
        let w = world();
        let err = create(
            &w.store,
            fixtures::company("Призрак", w.center.id, vec![w.food.id, 77, 78]),
        )
        .unwrap_err();
        assert_eq!(err, CatalogError::not_found("Categories not found: [77, 78]"));
        assert!(list(&w.store, false, Page::default()).unwrap().is_empty());
    }

    #[test]
    fn test_create_requires_building() {
        let w = world();
        let err = create(&w.store, fixtures::company("Бездомные", 404, vec![w.food.id])).unwrap_err();
        assert_eq!(err, CatalogError::not_found("Building not found"));
    }

    #[test]
    fn test_create_requires_phone_and_category() {
        let w = world();
        let mut no_phones = fixtures::company("Тихие", w.center.id, vec![w.food.id]);
        no_phones.phones.clear();
        assert!(matches!(create(&w.store, no_phones), Err(CatalogError::InvalidArgument(_))));

        let no_categories = fixtures::company("Без рубрики", w.center.id, vec![]);
        assert!(matches!(
            create(&w.store, no_categories),
            Err(CatalogError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_by_category_with_and_without_subtree() {
        let w = world();
        create(&w.store, fixtures::company("Мясокомбинат", w.center.id, vec![w.meat.id])).unwrap();
        create(&w.store, fixtures::company("Гастроном", w.center.id, vec![w.food.id, w.meat.id])).unwrap();
        create(&w.store, fixtures::company("Стадион", w.far.id, vec![w.sport.id])).unwrap();

        let subtree = by_category(&w.store, w.food.id, true, true).unwrap();
        assert_eq!(names(&subtree), vec!["Мясокомбинат", "Гастроном"]);

        let direct = by_category(&w.store, w.food.id, false, true).unwrap();
        assert_eq!(names(&direct), vec!["Гастроном"]);

        assert!(matches!(
            by_category(&w.store, 999, true, true),
            Err(CatalogError::NotFound(_))
        ));
    }

    #[test]
    fn test_radius_search_excludes_distant_building() {
        let w = world();
        create(&w.store, fixtures::company("Рядом", w.center.id, vec![w.food.id])).unwrap();
        create(&w.store, fixtures::company("Далеко", w.far.id, vec![w.food.id])).unwrap();

        let params = LocationParams {
            latitude: 55.7512,
            longitude: 37.6184,
            radius_km: Some(5.0),
            ..LocationParams::default()
        };
        let found = by_location(&w.store, &params, true).unwrap();
        assert_eq!(names(&found), vec!["Рядом"]);

        let wide = LocationParams {
            radius_km: Some(60.0),
            ..params
        };
        assert_eq!(by_location(&w.store, &wide, true).unwrap().len(), 2);
    }

    #[test]
    fn test_radius_search_keeps_id_order_within_shared_buildings() {
        let w = world();
        let first = create(&w.store, fixtures::company("Первая", w.center.id, vec![w.meat.id])).unwrap();
        create(&w.store, fixtures::company("Далеко", w.far.id, vec![w.food.id])).unwrap();
        let mut closed = fixtures::company("Закрыта", w.center.id, vec![w.food.id]);
        closed.is_active = false;
        create(&w.store, closed).unwrap();
        create(&w.store, fixtures::company("Вторая", w.center.id, vec![w.sport.id])).unwrap();

        let params = LocationParams {
            latitude: 55.7512,
            longitude: 37.6184,
            radius_km: Some(1.0),
            ..LocationParams::default()
        };
        let active = by_location(&w.store, &params, true).unwrap();
        assert_eq!(names(&active), vec!["Первая", "Вторая"]);
        assert_eq!(active[0].id, first.id);
        assert_eq!(active[0].categories[0].name, "Мясо");
        assert_eq!(active[1].building.id, w.center.id);

        let all = by_location(&w.store, &params, false).unwrap();
        assert_eq!(names(&all), vec!["Первая", "Закрыта", "Вторая"]);
    }

    #[test]
    fn test_box_search_and_invalid_box() {
        let w = world();
        create(&w.store, fixtures::company("Рядом", w.center.id, vec![w.food.id])).unwrap();
        create(&w.store, fixtures::company("Далеко", w.far.id, vec![w.food.id])).unwrap();

        let params = LocationParams {
            latitude: 55.75,
            longitude: 37.61,
            min_lat: Some(55.7),
            max_lat: Some(55.8),
            min_lng: Some(37.5),
            max_lng: Some(37.7),
            ..LocationParams::default()
        };
        assert_eq!(names(&by_location(&w.store, &params, true).unwrap()), vec!["Рядом"]);

        let inverted = LocationParams {
            min_lat: Some(55.8),
            max_lat: Some(55.7),
            ..params
        };
        assert_eq!(
            by_location(&w.store, &inverted, true).unwrap_err(),
            CatalogError::invalid("Invalid rectangle coordinates")
        );
    }

    #[test]
    fn test_active_filter_and_search() {
        let w = world();
        let mut closed = fixtures::company("Автосалон Закрыт", w.center.id, vec![w.food.id]);
        closed.is_active = false;
        create(&w.store, closed).unwrap();
        create(&w.store, fixtures::company("Автосалон Премиум", w.center.id, vec![w.food.id])).unwrap();

        assert_eq!(names(&search(&w.store, "Автосалон", true).unwrap()), vec!["Автосалон Премиум"]);
        assert_eq!(search(&w.store, "Автосалон", false).unwrap().len(), 2);
        assert!(search(&w.store, "автосалон", false).unwrap().is_empty());
        assert!(matches!(search(&w.store, "", true), Err(CatalogError::InvalidArgument(_))));

        assert_eq!(by_building(&w.store, w.center.id, true).unwrap().len(), 1);
        assert_eq!(list(&w.store, false, Page::default()).unwrap().len(), 2);
    }

    #[test]
    fn test_update_replaces_categories_and_keeps_other_fields() {
        let w = world();
        let created = create(&w.store, fixtures::company("Рога и Копыта", w.center.id, vec![w.meat.id])).unwrap();

        let patch = CompanyPatch {
            category_ids: Patch::Set(vec![w.sport.id]),
            email: Patch::Set(Some("info@roga-kopyta.ru".to_string())),
            ..CompanyPatch::default()
        };
        let updated = update(&w.store, created.id, patch).unwrap();
        assert_eq!(updated.name, "Рога и Копыта");
        assert_eq!(updated.phones, created.phones);
        assert_eq!(updated.email.as_deref(), Some("info@roga-kopyta.ru"));
        let ids: Vec<i64> = updated.categories.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![w.sport.id]);

        let bad = CompanyPatch {
            building_id: Patch::Set(999),
            ..CompanyPatch::default()
        };
        assert!(matches!(update(&w.store, created.id, bad), Err(CatalogError::NotFound(_))));
    }

    #[test]
    fn test_delete_keeps_building_and_categories() {
        let w = world();
        let created = create(&w.store, fixtures::company("Эко", w.center.id, vec![w.food.id])).unwrap();
        delete(&w.store, created.id).unwrap();
        assert!(matches!(get(&w.store, created.id), Err(CatalogError::NotFound(_))));
        assert!(buildings::get(&w.store, w.center.id).is_ok());
        assert!(categories::get(&w.store, w.food.id).is_ok());
        assert!(matches!(delete(&w.store, created.id), Err(CatalogError::NotFound(_))));
    }
}
