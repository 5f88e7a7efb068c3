//! Parsed aggregation responses.
//!
//! The engine's response does not say which kind of aggregation produced a
//! node, so parsing walks the requested [`AggregationSpec`] tree alongside
//! the response and reads each node the way its request implies.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{CanvassError, Result};

use super::spec::{AggregationKind, AggregationMap, AggregationSpec};

pub type AggregationResults = IndexMap<String, AggregationResult>;

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub key: Value,
    pub key_as_string: Option<String>,
    pub doc_count: u64,
    pub sub: AggregationResults,
}

impl Bucket {
    /// Display form of the key: `key_as_string` when present, otherwise the
    /// key itself (strings unquoted).
    pub fn key_string(&self) -> String {
        if let Some(s) = &self.key_as_string {
            return s.clone();
        }
        match &self.key {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationResult {
    Buckets(Vec<Bucket>),
    /// missing, nested, reverse_nested and filter aggregations.
    Single {
        doc_count: u64,
        sub: AggregationResults,
    },
    /// top_hits: `_source` of each hit.
    Hits { total: u64, hits: Vec<Value> },
    Metric(Option<f64>),
}

impl AggregationResult {
    pub fn buckets(&self) -> &[Bucket] {
        match self {
            AggregationResult::Buckets(b) => b,
            _ => &[],
        }
    }

    pub fn doc_count(&self) -> u64 {
        match self {
            AggregationResult::Buckets(b) => b.iter().map(|b| b.doc_count).sum(),
            AggregationResult::Single { doc_count, .. } => *doc_count,
            AggregationResult::Hits { total, .. } => *total,
            AggregationResult::Metric(_) => 0,
        }
    }

    pub fn hits(&self) -> &[Value] {
        match self {
            AggregationResult::Hits { hits, .. } => hits,
            _ => &[],
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            AggregationResult::Metric(v) => *v,
            _ => None,
        }
    }
}

/// Looks up a named result, reporting absence as
/// [`CanvassError::MissingAggregation`].
pub fn lookup<'a>(results: &'a AggregationResults, name: &str) -> Result<&'a AggregationResult> {
    results
        .get(name)
        .ok_or_else(|| CanvassError::MissingAggregation(name.to_string()))
}

/// Parses the `aggregations` object of a response. Names requested but
/// absent from `raw` are absent from the result.
pub fn parse_aggregations(specs: &AggregationMap, raw: &Value) -> Result<AggregationResults> {
    let mut results = AggregationResults::new();
    for (name, spec) in specs {
        if let Some(node) = raw.get(name) {
            results.insert(name.clone(), parse_node(name, spec, node)?);
        }
    }
    Ok(results)
}

fn parse_node(name: &str, spec: &AggregationSpec, node: &Value) -> Result<AggregationResult> {
    if spec.kind.is_bucketed() {
        let raw_buckets: Vec<&Value> = match node.get("buckets") {
            Some(Value::Array(items)) => items.iter().collect(),
            // keyed date ranges
            Some(Value::Object(map)) => map.values().collect(),
            None => Vec::new(),
            Some(_) => return Err(malformed(name, "`buckets` is not a list")),
        };
        let buckets = raw_buckets
            .into_iter()
            .map(|b| parse_bucket(name, spec, b))
            .collect::<Result<Vec<_>>>()?;
        return Ok(AggregationResult::Buckets(buckets));
    }

    match &spec.kind {
        AggregationKind::TopHits { .. } => {
            let hits = node.get("hits").unwrap_or(&Value::Null);
            let total = hits.get("total").map(total_hits).unwrap_or(0);
            let sources = match hits.get("hits") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|h| h.get("_source").cloned().unwrap_or_else(|| h.clone()))
                    .collect(),
                None => Vec::new(),
                Some(_) => return Err(malformed(name, "`hits.hits` is not a list")),
            };
            Ok(AggregationResult::Hits {
                total,
                hits: sources,
            })
        }
        AggregationKind::Avg { .. } => Ok(AggregationResult::Metric(
            node.get("value").and_then(Value::as_f64),
        )),
        _ => Ok(AggregationResult::Single {
            doc_count: doc_count(node),
            sub: parse_aggregations(&spec.sub, node)?,
        }),
    }
}

fn parse_bucket(name: &str, spec: &AggregationSpec, raw: &Value) -> Result<Bucket> {
    if !raw.is_object() {
        return Err(malformed(name, "bucket is not an object"));
    }
    Ok(Bucket {
        key: raw.get("key").cloned().unwrap_or(Value::Null),
        key_as_string: raw
            .get("key_as_string")
            .and_then(Value::as_str)
            .map(str::to_string),
        doc_count: doc_count(raw),
        sub: parse_aggregations(&spec.sub, raw)?,
    })
}

fn doc_count(node: &Value) -> u64 {
    node.get("doc_count").and_then(Value::as_u64).unwrap_or(0)
}

/// `hits.total` is either a number or `{"value": n, ...}`.
pub fn total_hits(v: &Value) -> u64 {
    v.as_u64()
        .or_else(|| v.get("value").and_then(Value::as_u64))
        .unwrap_or(0)
}

fn malformed(name: &str, what: &str) -> CanvassError {
    CanvassError::engine(format!("aggregation '{}': {}", name, what))
}
