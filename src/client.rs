//! Search engine access.
//!
//! [`SearchBackend`] is the seam between the compiler and the engine: it
//! takes one [`SearchBody`] and returns the parsed [`SearchResponse`].
//! [`HttpSearchClient`] implements it over the engine's `_search` endpoint;
//! engine failures come back as [`CanvassError::Engine`] with the engine's
//! response body verbatim.

use std::future::Future;

use serde_json::{json, Map, Value};

use crate::aggregation::result::{parse_aggregations, total_hits, AggregationResults};
use crate::aggregation::spec::{aggregations_to_json, AggregationMap};
use crate::config::SearchConfig;
use crate::error::{CanvassError, Result};
use crate::query::dsl::{Query, SortSpec};

/// One `_search` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchBody {
    pub index: String,
    pub query: Query,
    pub post_filter: Option<Query>,
    pub aggregations: AggregationMap,
    pub size: usize,
    pub from: usize,
    pub sort: Vec<SortSpec>,
    /// `_source` includes; empty returns whole documents.
    pub source: Vec<String>,
}

impl SearchBody {
    pub fn new(index: impl Into<String>, query: Query) -> Self {
        SearchBody {
            index: index.into(),
            query,
            post_filter: None,
            aggregations: AggregationMap::new(),
            size: 10,
            from: 0,
            sort: Vec::new(),
            source: Vec::new(),
        }
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn offset(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn post_filter(mut self, filter: Query) -> Self {
        self.post_filter = Some(filter);
        self
    }

    pub fn aggregations(mut self, aggregations: AggregationMap) -> Self {
        self.aggregations.extend(aggregations);
        self
    }

    pub fn source<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Request body as sent to the engine (the index is part of the URL).
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert("query".to_string(), self.query.to_json());
        if let Some(filter) = &self.post_filter {
            body.insert("post_filter".to_string(), filter.to_json());
        }
        if !self.aggregations.is_empty() {
            body.insert("aggs".to_string(), aggregations_to_json(&self.aggregations));
        }
        body.insert("size".to_string(), json!(self.size));
        body.insert("from".to_string(), json!(self.from));
        if !self.sort.is_empty() {
            let sort: Vec<Value> = self.sort.iter().map(SortSpec::to_json).collect();
            body.insert("sort".to_string(), Value::Array(sort));
        }
        if !self.source.is_empty() {
            body.insert("_source".to_string(), json!({ "includes": self.source }));
        }
        Value::Object(body)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub total: u64,
    /// `_source` of each hit, in rank order.
    pub hits: Vec<Value>,
    /// `None` when the response has no `aggregations` object.
    pub aggregations: Option<AggregationResults>,
}

impl SearchResponse {
    /// Reads a raw engine response, interpreting aggregations against the
    /// requested `specs`.
    pub fn from_json(raw: &Value, specs: &AggregationMap) -> Result<Self> {
        let hits_node = raw.get("hits");
        let total = hits_node
            .and_then(|h| h.get("total"))
            .map(total_hits)
            .unwrap_or(0);
        let hits = match hits_node.and_then(|h| h.get("hits")) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|h| h.get("_source").cloned().unwrap_or(Value::Null))
                .collect(),
            Some(_) => return Err(CanvassError::engine("`hits.hits` is not a list")),
            None => Vec::new(),
        };
        let aggregations = raw
            .get("aggregations")
            .map(|aggs| parse_aggregations(specs, aggs))
            .transpose()?;
        Ok(SearchResponse {
            total,
            hits,
            aggregations,
        })
    }
}

/// Executes searches against the engine.
pub trait SearchBackend {
    fn search(&self, body: &SearchBody) -> impl Future<Output = Result<SearchResponse>> + Send;
}

/// [`SearchBackend`] over HTTP.
pub struct HttpSearchClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpSearchClient {
    pub fn new(config: &SearchConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: config.engine_url.trim_end_matches('/').to_string(),
            http_client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl SearchBackend for HttpSearchClient {
    async fn search(&self, body: &SearchBody) -> Result<SearchResponse> {
        let url = format!("{}/{}/_search", self.base_url, body.index);
        let payload = body.to_json();
        tracing::debug!(index = %body.index, body = %payload, "search request");

        let response = self
            .http_client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(index = %body.index, "search request failed: {}", e);
                CanvassError::from(e)
            })?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::error!(index = %body.index, status = %status, "engine error: {}", text);
            return Err(CanvassError::Engine {
                status: Some(status.as_u16()),
                message: text,
            });
        }

        let raw: Value = serde_json::from_str(&text).map_err(|e| {
            CanvassError::engine(format!("unreadable response from {}: {}", url, e))
        })?;
        SearchResponse::from_json(&raw, &body.aggregations)
    }
}
