pub mod geo;
pub mod matcher;

use canvass::{ContactSearch, HttpSearchClient, SearchConfig};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[allow(unused_imports)]
pub use matcher::Matches;

/// Owned token list.
#[allow(dead_code)]
pub fn fields(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|s| s.to_string()).collect()
}

/// Fixed clock for date-math evaluation: 2024-06-15 12:00 UTC.
#[allow(dead_code)]
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

/// Contact document in tenant 42 with `extra` merged on top.
#[allow(dead_code)]
pub fn contact(extra: Value) -> Value {
    let mut doc = json!({
        "group_id": "42",
        "firstname": "Jeanne",
        "surname": "Dupont",
    });
    if let (Some(base), Some(extra)) = (doc.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    doc
}

/// Search service pointed at a fresh mock engine.
#[allow(dead_code)]
pub async fn mock_engine() -> (MockServer, ContactSearch<HttpSearchClient>) {
    let server = MockServer::start().await;
    let search = ContactSearch::from_config(SearchConfig::with_engine_url(server.uri()));
    (server, search)
}

/// Answers every `_search` on `index` with `body`.
#[allow(dead_code)]
pub async fn respond(server: &MockServer, index: &str, body: Value) {
    Mock::given(method("POST"))
        .and(path(format!("/{}/_search", index)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// JSON bodies of every request the mock engine received, in order.
#[allow(dead_code)]
pub async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}
