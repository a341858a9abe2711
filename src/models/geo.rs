use geo::{GeodesicDistance, Point};
use serde::{Deserialize, Serialize};

/// A WGS-84 coordinate as reported by the driver's device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Both halves of a stored coordinate pair, or nothing.
    pub fn from_parts(lat: Option<f64>, lng: Option<f64>) -> Option<Self> {
        match (lat, lng) {
            (Some(lat), Some(lng)) => Some(Self::new(lat, lng)),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Geodesic distance on the WGS-84 ellipsoid, in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let from: Point<f64> = (*self).into();
        let to: Point<f64> = (*other).into();
        from.geodesic_distance(&to) / 1000.0
    }
}

impl From<GeoPoint> for Point<f64> {
    fn from(value: GeoPoint) -> Self {
        Point::new(value.lng, value.lat)
    }
}
