use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::query::dsl::{DateExpr, Query, SortSpec};

/// Named aggregation requests, in request order.
pub type AggregationMap = IndexMap<String, AggregationSpec>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarInterval {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl CalendarInterval {
    pub fn as_str(self) -> &'static str {
        match self {
            CalendarInterval::Hour => "hour",
            CalendarInterval::Day => "day",
            CalendarInterval::Week => "week",
            CalendarInterval::Month => "month",
            CalendarInterval::Year => "year",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationKind {
    Terms {
        field: String,
        size: Option<usize>,
    },
    DateHistogram {
        field: String,
        interval: CalendarInterval,
    },
    /// One bucket per `(from, to)` pair.
    DateRange {
        field: String,
        ranges: Vec<(DateExpr, DateExpr)>,
    },
    Missing {
        field: String,
    },
    Nested {
        path: String,
    },
    /// Back from a nested scope to the root document.
    ReverseNested,
    Filter {
        query: Query,
    },
    TopHits {
        size: usize,
        sort: Vec<SortSpec>,
        source: Vec<String>,
    },
    GeoHashGrid {
        field: String,
        precision: u8,
    },
    Avg {
        field: String,
    },
}

impl AggregationKind {
    /// Whether the response node carries a `buckets` list.
    pub fn is_bucketed(&self) -> bool {
        matches!(
            self,
            AggregationKind::Terms { .. }
                | AggregationKind::DateHistogram { .. }
                | AggregationKind::DateRange { .. }
                | AggregationKind::GeoHashGrid { .. }
        )
    }

    fn to_json(&self) -> (&'static str, Value) {
        match self {
            AggregationKind::Terms { field, size } => {
                let mut body = Map::new();
                body.insert("field".to_string(), json!(field));
                if let Some(size) = size {
                    body.insert("size".to_string(), json!(size));
                }
                ("terms", Value::Object(body))
            }
            AggregationKind::DateHistogram { field, interval } => (
                "date_histogram",
                json!({"field": field, "calendar_interval": interval.as_str()}),
            ),
            AggregationKind::DateRange { field, ranges } => {
                let ranges: Vec<Value> = ranges
                    .iter()
                    .map(|(from, to)| {
                        json!({"from": from.to_expr_string(), "to": to.to_expr_string()})
                    })
                    .collect();
                ("date_range", json!({"field": field, "ranges": ranges}))
            }
            AggregationKind::Missing { field } => ("missing", json!({ "field": field })),
            AggregationKind::Nested { path } => ("nested", json!({ "path": path })),
            AggregationKind::ReverseNested => ("reverse_nested", json!({})),
            AggregationKind::Filter { query } => ("filter", query.to_json()),
            AggregationKind::TopHits { size, sort, source } => {
                let mut body = Map::new();
                body.insert("size".to_string(), json!(size));
                if !sort.is_empty() {
                    let sort: Vec<Value> = sort.iter().map(SortSpec::to_json).collect();
                    body.insert("sort".to_string(), Value::Array(sort));
                }
                if !source.is_empty() {
                    body.insert("_source".to_string(), json!({ "includes": source }));
                }
                ("top_hits", Value::Object(body))
            }
            AggregationKind::GeoHashGrid { field, precision } => (
                "geohash_grid",
                json!({"field": field, "precision": precision}),
            ),
            AggregationKind::Avg { field } => ("avg", json!({ "field": field })),
        }
    }
}

/// One aggregation request and the sub-aggregations run inside each of its
/// buckets.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationSpec {
    pub kind: AggregationKind,
    pub sub: AggregationMap,
}

impl AggregationSpec {
    pub fn new(kind: AggregationKind) -> Self {
        AggregationSpec {
            kind,
            sub: AggregationMap::new(),
        }
    }

    pub fn terms(field: impl Into<String>, size: Option<usize>) -> Self {
        Self::new(AggregationKind::Terms {
            field: field.into(),
            size,
        })
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(AggregationKind::Missing {
            field: field.into(),
        })
    }

    pub fn date_histogram(field: impl Into<String>, interval: CalendarInterval) -> Self {
        Self::new(AggregationKind::DateHistogram {
            field: field.into(),
            interval,
        })
    }

    pub fn avg(field: impl Into<String>) -> Self {
        Self::new(AggregationKind::Avg {
            field: field.into(),
        })
    }

    pub fn with_sub(mut self, name: impl Into<String>, spec: AggregationSpec) -> Self {
        self.sub.insert(name.into(), spec);
        self
    }

    pub fn with_subs(mut self, subs: AggregationMap) -> Self {
        self.sub.extend(subs);
        self
    }

    pub fn to_json(&self) -> Value {
        let (kind, body) = self.kind.to_json();
        let mut node = Map::new();
        node.insert(kind.to_string(), body);
        if !self.sub.is_empty() {
            node.insert("aggs".to_string(), aggregations_to_json(&self.sub));
        }
        Value::Object(node)
    }
}

pub fn aggregations_to_json(aggs: &AggregationMap) -> Value {
    let map: Map<String, Value> = aggs
        .iter()
        .map(|(name, spec)| (name.clone(), spec.to_json()))
        .collect();
    Value::Object(map)
}
