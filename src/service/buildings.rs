use super::found;
use crate::error::{CatalogError, CatalogResult};
use crate::model::{validate, Building, BuildingPatch, NewBuilding};
use crate::store::{DirectoryStore, Page};

pub fn create<S: DirectoryStore>(store: &S, new: NewBuilding) -> CatalogResult<Building> {
    new.validate()?;
    let building = store.transaction(|s| s.insert_building(&new))?;
    log::info!("created building {} at {}", building.id, building.address);
    Ok(building)
}

pub fn list<S: DirectoryStore>(store: &S, page: Page) -> CatalogResult<Vec<Building>> {
    store.transaction(|s| s.list_buildings(page))
}

pub fn get<S: DirectoryStore>(store: &S, id: i64) -> CatalogResult<Building> {
    validate::id("building_id", id)?;
    store.transaction(|s| found(s.find_building(id)?, "Building"))
}

/// Applies the supplied fields; an empty patch returns the building unchanged.
pub fn update<S: DirectoryStore>(store: &S, id: i64, patch: BuildingPatch) -> CatalogResult<Building> {
    validate::id("building_id", id)?;
    patch.validate()?;
    store.transaction(|s| {
        let mut building = found(s.find_building(id)?, "Building")?;
        if patch.is_empty() {
            return Ok(building);
        }
        patch.apply(&mut building);
        s.update_building(&building)
    })
}

/// Deletes a building nobody occupies.
///
/// Companies are never cascaded: while any company references the building
/// the request fails with `Conflict`.
pub fn delete<S: DirectoryStore>(store: &S, id: i64) -> CatalogResult<()> {
    validate::id("building_id", id)?;
    store.transaction(|s| {
        found(s.find_building(id)?, "Building")?;
        let occupants = s.count_companies_in_building(id)?;
        if occupants > 0 {
            return Err(CatalogError::Conflict(format!(
                "Cannot delete building. {occupants} companies are associated with it."
            )));
        }
        s.delete_building(id)?;
        log::info!("deleted building {id}");
        Ok(())
    })
}
