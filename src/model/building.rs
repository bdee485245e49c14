//! Buildings: addressed, geolocated places that companies occupy.

use crate::error::CatalogResult;
use crate::geo::{GeoPoint, Located};
use crate::model::patch::Patch;
use crate::model::validate;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Building {
    pub id: i64,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Building {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

impl Located for Building {
    fn position(&self) -> GeoPoint {
        Building::position(self)
    }
}

/// Creation payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewBuilding {
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl NewBuilding {
    pub fn validate(&self) -> CatalogResult<()> {
        validate::text("address", &self.address, validate::ADDRESS_MAX_LEN)?;
        validate::latitude("latitude", self.latitude)?;
        validate::longitude("longitude", self.longitude)
    }
}

/// Partial update payload; only supplied fields change
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BuildingPatch {
    pub address: Patch<String>,
    pub latitude: Patch<f64>,
    pub longitude: Patch<f64>,
}

impl BuildingPatch {
    pub fn validate(&self) -> CatalogResult<()> {
        if let Some(address) = self.address.as_set() {
            validate::text("address", address, validate::ADDRESS_MAX_LEN)?;
        }
        if let Some(lat) = self.latitude.as_set() {
            validate::latitude("latitude", *lat)?;
        }
        if let Some(lng) = self.longitude.as_set() {
            validate::longitude("longitude", *lng)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        !self.address.is_set() && !self.latitude.is_set() && !self.longitude.is_set()
    }

    /// Applies the supplied fields onto `building`
    pub fn apply(self, building: &mut Building) {
        self.address.apply_to(&mut building.address);
        self.latitude.apply_to(&mut building.latitude);
        self.longitude.apply_to(&mut building.longitude);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_building_validation() {
        let ok = NewBuilding {
            address: "ул. Блюхера, 32/1".into(),
            latitude: 55.751244,
            longitude: 37.618423,
        };
        assert!(ok.validate().is_ok());

        let bad = NewBuilding {
            latitude: 91.0,
            ..ok.clone()
        };
        assert!(bad.validate().is_err());

        let empty = NewBuilding {
            address: String::new(),
            ..ok
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_patch_parses_only_supplied_fields() {
        let patch: BuildingPatch = serde_json::from_str(r#"{"latitude": 10.5}"#).unwrap();
        assert_eq!(patch.latitude, Patch::Set(10.5));
        assert_eq!(patch.address, Patch::Absent);
        assert!(!patch.is_empty());
        assert!(patch.validate().is_ok());
    }
}
