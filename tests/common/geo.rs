//! Geo arithmetic used to evaluate geo clauses and check cluster cells.
#![allow(dead_code)]

use canvass::query::GeoPoint;
use canvass::query::geo::parse_lat_lng;
use serde_json::Value;

const EARTH_RADIUS_M: f64 = 6_371_000.0;
const GEOHASH_ALPHABET: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

pub fn haversine(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * a.sqrt().asin()
}

pub fn point_in_polygon(point: &GeoPoint, polygon: &[GeoPoint]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (yi, xi) = (polygon[i].lat, polygon[i].lng);
        let (yj, xj) = (polygon[j].lat, polygon[j].lng);
        if ((yi > point.lat) != (yj > point.lat))
            && (point.lng < (xj - xi) * (point.lat - yi) / (yj - yi) + xi)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Reads an indexed geo point in any of the engine's accepted shapes:
/// `"lat,lon"`, `{"lat": .., "lon": ..}` or `[lon, lat]`.
pub fn parse_location(v: &Value) -> Option<GeoPoint> {
    match v {
        Value::String(s) => parse_lat_lng(s),
        Value::Object(obj) => {
            let lat = number_or_string(obj.get("lat")?)?;
            let lng = number_or_string(obj.get("lon").or_else(|| obj.get("lng"))?)?;
            Some(GeoPoint::new(lat, lng))
        }
        Value::Array(arr) if arr.len() == 2 => {
            let lng = arr[0].as_f64()?;
            let lat = arr[1].as_f64()?;
            Some(GeoPoint::new(lat, lng))
        }
        _ => None,
    }
}

fn number_or_string(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Base-32 geohash of `point` with `precision` characters, as the engine
/// keys `geohash_grid` buckets.
pub fn geohash(point: &GeoPoint, precision: usize) -> String {
    let (mut lat_lo, mut lat_hi) = (-90.0_f64, 90.0_f64);
    let (mut lng_lo, mut lng_hi) = (-180.0_f64, 180.0_f64);
    let mut hash = String::with_capacity(precision);
    let mut even_bit = true;
    let mut bit = 0;
    let mut ch = 0usize;

    while hash.len() < precision {
        if even_bit {
            let mid = (lng_lo + lng_hi) / 2.0;
            if point.lng >= mid {
                ch = (ch << 1) | 1;
                lng_lo = mid;
            } else {
                ch <<= 1;
                lng_hi = mid;
            }
        } else {
            let mid = (lat_lo + lat_hi) / 2.0;
            if point.lat >= mid {
                ch = (ch << 1) | 1;
                lat_lo = mid;
            } else {
                ch <<= 1;
                lat_hi = mid;
            }
        }
        even_bit = !even_bit;
        bit += 1;
        if bit == 5 {
            hash.push(GEOHASH_ALPHABET[ch] as char);
            bit = 0;
            ch = 0;
        }
    }
    hash
}
