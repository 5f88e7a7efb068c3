use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Point in the request protocol (`{"lat": .., "lng": ..}`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        GeoPoint { lat, lng }
    }

    /// Engine representation: `{"lat": .., "lon": ..}`.
    pub fn to_json(&self) -> Value {
        json!({"lat": self.lat, "lon": self.lng})
    }
}

/// Parses `"lat,lng"`, rejecting out-of-range coordinates.
pub fn parse_lat_lng(s: &str) -> Option<GeoPoint> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        return None;
    }
    let lat = parts[0].trim().parse::<f64>().ok()?;
    let lng = parts[1].trim().parse::<f64>().ok()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return None;
    }
    Some(GeoPoint { lat, lng })
}
