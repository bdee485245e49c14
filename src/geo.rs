//! Great-circle distance and the company location filters.
//!
//! Radius search is a linear scan: every candidate's building is measured
//! with the Haversine formula and kept when it lies within the radius.
//! Bounding-box search is pushed down to the store as a plain range predicate;
//! this module only validates the box.

use crate::error::{CatalogError, CatalogResult};
use crate::model::validate;
use serde::Serialize;

/// Mean Earth radius used by the Haversine formula, in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Haversine distance to `other` in kilometers
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Great-circle distance between two coordinates, in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // clamp: rounding can push `a` a hair above 1 for antipodal points
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

/// Anything with a position that radius search can measure
pub trait Located {
    fn position(&self) -> GeoPoint;
}

impl Located for GeoPoint {
    fn position(&self) -> GeoPoint {
        *self
    }
}

/// Keeps the candidates within `radius_km` of `origin`, in input order.
pub fn filter_by_radius<T: Located>(candidates: Vec<T>, origin: GeoPoint, radius_km: f64) -> Vec<T> {
    candidates
        .into_iter()
        .filter(|candidate| origin.distance_km(&candidate.position()) <= radius_km)
        .collect()
}

/// Inclusive latitude/longitude rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Builds a box, requiring `min_lat < max_lat` and `min_lng < max_lng`
    pub fn new(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> CatalogResult<Self> {
        validate::latitude("min_lat", min_lat)?;
        validate::latitude("max_lat", max_lat)?;
        validate::longitude("min_lng", min_lng)?;
        validate::longitude("max_lng", max_lng)?;
        if min_lat >= max_lat || min_lng >= max_lng {
            return Err(CatalogError::invalid("Invalid rectangle coordinates"));
        }
        Ok(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.latitude)
            && (self.min_lng..=self.max_lng).contains(&point.longitude)
    }
}

/// Raw location search parameters as received from the caller
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocationParams {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: Option<f64>,
    pub min_lat: Option<f64>,
    pub max_lat: Option<f64>,
    pub min_lng: Option<f64>,
    pub max_lng: Option<f64>,
}

/// Validated location search
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationQuery {
    Radius { origin: GeoPoint, radius_km: f64 },
    Rectangle(BoundingBox),
}

impl LocationQuery {
    /// Picks radius search when a radius is given, otherwise requires all four
    /// box bounds. Fails with `InvalidArgument` before any store access.
    pub fn from_params(params: &LocationParams) -> CatalogResult<Self> {
        validate::latitude("latitude", params.latitude)?;
        validate::longitude("longitude", params.longitude)?;

        if let Some(radius_km) = params.radius_km {
            if !radius_km.is_finite() || radius_km <= 0.0 {
                return Err(CatalogError::invalid("radius_km must be greater than 0"));
            }
            return Ok(LocationQuery::Radius {
                origin: GeoPoint::new(params.latitude, params.longitude),
                radius_km,
            });
        }

        match (params.min_lat, params.max_lat, params.min_lng, params.max_lng) {
            (Some(min_lat), Some(max_lat), Some(min_lng), Some(max_lng)) => Ok(
                LocationQuery::Rectangle(BoundingBox::new(min_lat, max_lat, min_lng, max_lng)?),
            ),
            _ => Err(CatalogError::invalid(
                "Either radius_km or all rectangle coordinates (min_lat, max_lat, min_lng, max_lng) must be provided",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOSCOW: GeoPoint = GeoPoint {
        latitude: 55.7512,
        longitude: 37.6184,
    };

    #[test]
    fn test_distance_to_self_is_zero() {
        assert_eq!(MOSCOW.distance_km(&MOSCOW), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let spb = GeoPoint::new(59.9386, 30.3141);
        let there = MOSCOW.distance_km(&spb);
        let back = spb.distance_km(&MOSCOW);
        assert!((there - back).abs() < 1e-9);
        assert!(there > 600.0 && there < 650.0, "Moscow-SPb was {there}");
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!(d > 110.0 && d < 112.0, "got {d}");
    }

    #[test]
    fn test_antipodal_points_do_not_nan() {
        let d = haversine_km(0.0, 0.0, 0.0, 180.0);
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn test_radius_filter_keeps_order_and_excludes_far_points() {
        let near_a = GeoPoint::new(55.752244, 37.619423);
        let far = GeoPoint::new(56.2, 37.6184); // ~50 km north
        let near_b = GeoPoint::new(55.750244, 37.617423);

        let kept = filter_by_radius(vec![near_a, far, near_b], MOSCOW, 5.0);
        assert_eq!(kept, vec![near_a, near_b]);
    }

    #[test]
    fn test_radius_boundary_is_inclusive() {
        let p = GeoPoint::new(1.0, 0.0);
        let exact = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert_eq!(filter_by_radius(vec![p], GeoPoint::new(0.0, 0.0), exact).len(), 1);
    }

    #[test]
    fn test_query_requires_radius_or_full_box() {
        let base = LocationParams {
            latitude: 55.75,
            longitude: 37.61,
            ..LocationParams::default()
        };
        assert!(matches!(
            LocationQuery::from_params(&base),
            Err(CatalogError::InvalidArgument(_))
        ));

        let partial = LocationParams {
            min_lat: Some(55.0),
            max_lat: Some(56.0),
            min_lng: Some(37.0),
            ..base
        };
        assert!(matches!(
            LocationQuery::from_params(&partial),
            Err(CatalogError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_inverted_box_rejected() {
        let params = LocationParams {
            latitude: 55.75,
            longitude: 37.61,
            min_lat: Some(56.0),
            max_lat: Some(55.0),
            min_lng: Some(37.0),
            max_lng: Some(38.0),
            ..LocationParams::default()
        };
        assert_eq!(
            LocationQuery::from_params(&params),
            Err(CatalogError::invalid("Invalid rectangle coordinates"))
        );
    }

    #[test]
    fn test_radius_wins_over_box() {
        let params = LocationParams {
            latitude: 55.75,
            longitude: 37.61,
            radius_km: Some(5.0),
            min_lat: Some(56.0),
            max_lat: Some(55.0),
            ..LocationParams::default()
        };
        assert!(matches!(
            LocationQuery::from_params(&params),
            Ok(LocationQuery::Radius { radius_km, .. }) if radius_km == 5.0
        ));
    }

    #[test]
    fn test_non_positive_radius_rejected() {
        let params = LocationParams {
            latitude: 55.75,
            longitude: 37.61,
            radius_km: Some(0.0),
            ..LocationParams::default()
        };
        assert!(LocationQuery::from_params(&params).is_err());
    }

    #[test]
    fn test_box_contains_is_inclusive() {
        let bbox = BoundingBox::new(55.0, 56.0, 37.0, 38.0).unwrap();
        assert!(bbox.contains(&GeoPoint::new(55.0, 38.0)));
        assert!(!bbox.contains(&GeoPoint::new(54.99, 37.5)));
    }
}
