use serde::{Deserialize, Serialize};

/// A single fix of the recorded track in signed decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude, north positive
    pub lat: f64,

    /// Longitude, east positive
    pub lng: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting values outside the WGS84 ranges
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        let coordinate = Self { lat, lng };
        coordinate.is_valid().then_some(coordinate)
    }

    /// Check that both components are finite and in range
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Serialize to the wire payload sent to connected clients
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
