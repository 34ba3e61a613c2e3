//! Basic 2D point type used throughout the crate.

/// Representation of a geographic 2D point.
///
/// `x` is the longitude and `y` the latitude, matching GeoJSON axis order.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Builds a point from a latitude/longitude pair as reported by GPS.
    pub fn from_lat_lng(lat: f64, lng: f64) -> Self {
        Self { x: lng, y: lat }
    }

    pub fn lat(&self) -> f64 {
        self.y
    }

    pub fn lng(&self) -> f64 {
        self.x
    }

    pub(crate) fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}
