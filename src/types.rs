use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::query::geo::GeoPoint;

/// A search call as received from the caller.
///
/// `fields` is the positional token list decoded by
/// [`crate::query::SearchFilters`]; `polygon` restricts results to an area
/// when it has at least one point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub polygon: Vec<GeoPoint>,
    #[serde(default)]
    pub filter: String,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, fields: &[&str]) -> Self {
        SearchRequest {
            query: query.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_polygon(mut self, polygon: Vec<GeoPoint>) -> Self {
        self.polygon = polygon;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }
}

/// A contact document as indexed. Fields not modelled here are kept in
/// `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub married_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formdatas: Vec<Formdata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub housenumber: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postalcode: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(
        rename = "PollingStation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub polling_station: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One custom-form answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Formdata {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub form_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub form_ref_id: Option<i64>,
    #[serde(default)]
    pub data: Value,
}

/// Engine documents store numbers as JSON numbers or numeric strings.
fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiEntry {
    pub key: String,
    /// Signed: the reconciled unknown-age count can go below zero.
    pub doc_count: i64,
}

impl KpiEntry {
    pub fn new(key: impl Into<String>, doc_count: i64) -> Self {
        KpiEntry {
            key: key.into(),
            doc_count,
        }
    }
}

/// Counts for one metric, in bucket order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiBlock {
    pub name: String,
    pub entries: Vec<KpiEntry>,
}

/// Contacts sharing one address coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressAggregate {
    pub latitude: String,
    pub doc_count: u64,
    pub contacts: Vec<Contact>,
}

/// A geohash cell with the mean position of its contacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoCluster {
    pub geohash: String,
    pub doc_count: u64,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Flattened pivot: one row per leaf, dimension keys then the count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotTable {
    pub dimensions: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactsReply {
    pub total: u64,
    pub contacts: Vec<Contact>,
    /// Filled instead of `contacts` in address mode.
    pub addresses: Vec<AddressAggregate>,
}
