//! Typed query tree sent to the search engine.
//!
//! Every node kind is a variant of [`Query`]; [`BoolQuery`] is built by value,
//! each builder call consuming the node and returning the extended one.
//! [`Query::to_json`] renders the engine's JSON query DSL.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use super::geo::GeoPoint;

/// A date bound, either relative to the time the engine evaluates the query
/// or absolute.
#[derive(Debug, Clone, PartialEq)]
pub enum DateExpr {
    /// `now/d`
    Today,
    /// `now-<N>y/d`
    YearsAgo(u32),
    Day(NaiveDate),
    Instant(DateTime<Utc>),
}

impl DateExpr {
    pub fn to_expr_string(&self) -> String {
        match self {
            DateExpr::Today => "now/d".to_string(),
            DateExpr::YearsAgo(years) => format!("now-{}y/d", years),
            DateExpr::Day(day) => day.format("%Y-%m-%d").to_string(),
            DateExpr::Instant(ts) => ts.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// A leaf value in a term, terms or range clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Integer(i64),
    Date(DateExpr),
}

impl Scalar {
    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Text(s) => Value::String(s.clone()),
            Scalar::Integer(i) => json!(i),
            Scalar::Date(d) => Value::String(d.to_expr_string()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<&String> for Scalar {
    fn from(s: &String) -> Self {
        Scalar::Text(s.clone())
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Integer(i)
    }
}

impl From<DateExpr> for Scalar {
    fn from(d: DateExpr) -> Self {
        Scalar::Date(d)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    MatchAll,
    /// Cross-field, AND-operator full-text match.
    MultiMatch {
        query: String,
        fields: Vec<String>,
    },
    Term {
        field: String,
        value: Scalar,
    },
    Terms {
        field: String,
        values: Vec<Scalar>,
    },
    /// Inclusive on both provided ends.
    Range {
        field: String,
        gte: Option<Scalar>,
        lte: Option<Scalar>,
    },
    /// Matches documents where `field` has no non-null value.
    Missing {
        field: String,
    },
    Nested {
        path: String,
        query: Box<Query>,
    },
    GeoPolygon {
        field: String,
        points: Vec<GeoPoint>,
    },
    GeoDistance {
        field: String,
        center: GeoPoint,
        distance_m: f64,
    },
    Bool(BoolQuery),
}

impl Query {
    pub fn term(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Query::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn terms<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        Query::Terms {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn range(field: impl Into<String>, gte: Option<Scalar>, lte: Option<Scalar>) -> Self {
        Query::Range {
            field: field.into(),
            gte,
            lte,
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Query::Missing {
            field: field.into(),
        }
    }

    pub fn nested(path: impl Into<String>, query: Query) -> Self {
        Query::Nested {
            path: path.into(),
            query: Box::new(query),
        }
    }

    pub fn as_bool(&self) -> Option<&BoolQuery> {
        match self {
            Query::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Query::MatchAll => json!({"match_all": {}}),
            Query::MultiMatch { query, fields } => {
                let mut body = Map::new();
                body.insert("query".to_string(), Value::String(query.clone()));
                body.insert("type".to_string(), json!("cross_fields"));
                body.insert("operator".to_string(), json!("and"));
                if !fields.is_empty() {
                    body.insert("fields".to_string(), json!(fields));
                }
                json!({ "multi_match": Value::Object(body) })
            }
            Query::Term { field, value } => json!({"term": { field.as_str(): value.to_json() }}),
            Query::Terms { field, values } => {
                let values: Vec<Value> = values.iter().map(Scalar::to_json).collect();
                json!({"terms": { field.as_str(): values }})
            }
            Query::Range { field, gte, lte } => {
                let mut bounds = Map::new();
                if let Some(lo) = gte {
                    bounds.insert("gte".to_string(), lo.to_json());
                }
                if let Some(hi) = lte {
                    bounds.insert("lte".to_string(), hi.to_json());
                }
                json!({"range": { field.as_str(): Value::Object(bounds) }})
            }
            Query::Missing { field } => {
                json!({"bool": {"must_not": [{"exists": {"field": field}}]}})
            }
            Query::Nested { path, query } => {
                json!({"nested": {"path": path, "query": query.to_json()}})
            }
            Query::GeoPolygon { field, points } => {
                let points: Vec<Value> = points.iter().map(GeoPoint::to_json).collect();
                json!({"geo_polygon": { field.as_str(): {"points": points} }})
            }
            Query::GeoDistance {
                field,
                center,
                distance_m,
            } => json!({"geo_distance": {
                "distance": format!("{}m", distance_m),
                field.as_str(): center.to_json(),
            }}),
            Query::Bool(b) => b.to_json(),
        }
    }
}

impl From<BoolQuery> for Query {
    fn from(b: BoolQuery) -> Self {
        Query::Bool(b)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<Query>,
    pub should: Vec<Query>,
    pub must_not: Vec<Query>,
    pub filter: Vec<Query>,
    pub minimum_should_match: Option<u32>,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, q: impl Into<Query>) -> Self {
        self.must.push(q.into());
        self
    }

    pub fn should(mut self, q: impl Into<Query>) -> Self {
        self.should.push(q.into());
        self
    }

    pub fn must_not(mut self, q: impl Into<Query>) -> Self {
        self.must_not.push(q.into());
        self
    }

    pub fn filter(mut self, q: impl Into<Query>) -> Self {
        self.filter.push(q.into());
        self
    }

    pub fn minimum_should_match(mut self, n: u32) -> Self {
        self.minimum_should_match = Some(n);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
            && self.should.is_empty()
            && self.must_not.is_empty()
            && self.filter.is_empty()
    }

    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        for (name, clauses) in [
            ("must", &self.must),
            ("should", &self.should),
            ("must_not", &self.must_not),
            ("filter", &self.filter),
        ] {
            if !clauses.is_empty() {
                let rendered: Vec<Value> = clauses.iter().map(Query::to_json).collect();
                body.insert(name.to_string(), Value::Array(rendered));
            }
        }
        if let Some(n) = self.minimum_should_match {
            body.insert("minimum_should_match".to_string(), json!(n));
        }
        json!({ "bool": Value::Object(body) })
    }
}

/// One sort criterion of a search or top-hits request.
#[derive(Debug, Clone, PartialEq)]
pub enum SortSpec {
    Field { field: String, ascending: bool },
    /// Nearest first, in kilometres along the arc.
    GeoDistance { field: String, origin: GeoPoint },
}

impl SortSpec {
    pub fn field(field: impl Into<String>, ascending: bool) -> Self {
        SortSpec::Field {
            field: field.into(),
            ascending,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            SortSpec::Field { field, ascending } => {
                let order = if *ascending { "asc" } else { "desc" };
                json!({ field.as_str(): {"order": order} })
            }
            SortSpec::GeoDistance { field, origin } => json!({"_geo_distance": {
                field.as_str(): origin.to_json(),
                "order": "asc",
                "unit": "km",
                "distance_type": "arc",
            }}),
        }
    }
}
