use std::time::Duration;

/// Search engine connection and index settings, loaded from environment
/// variables.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Base URL of the search engine, without trailing slash.
    pub engine_url: String,
    pub contacts_index: String,
    /// Index holding per-contact facts (status, location).
    pub facts_index: String,
    pub timeout_secs: u64,
    /// Maximum number of contact ids returned by a polygon lookup.
    pub id_lookup_limit: usize,
    /// Terms size of the polling-station KPI aggregation.
    pub polling_station_buckets: usize,
    /// Form whose answers a `presence` pivot level reads.
    pub presence_form_id: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            engine_url: "http://127.0.0.1:9200".to_string(),
            contacts_index: "contacts".to_string(),
            facts_index: "facts".to_string(),
            timeout_secs: 30,
            id_lookup_limit: 10_000,
            polling_station_buckets: 500,
            presence_form_id: 1,
        }
    }
}

impl SearchConfig {
    /// Load config from environment variables. Unset or unparseable values
    /// keep their default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            engine_url: std::env::var("CANVASS_ENGINE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.engine_url),
            contacts_index: std::env::var("CANVASS_CONTACTS_INDEX")
                .unwrap_or(defaults.contacts_index),
            facts_index: std::env::var("CANVASS_FACTS_INDEX").unwrap_or(defaults.facts_index),
            timeout_secs: std::env::var("CANVASS_ENGINE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            id_lookup_limit: std::env::var("CANVASS_ID_LOOKUP_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.id_lookup_limit),
            polling_station_buckets: std::env::var("CANVASS_POLLING_STATION_BUCKETS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.polling_station_buckets),
            presence_form_id: std::env::var("CANVASS_PRESENCE_FORM_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.presence_form_id),
        }
    }

    /// Default settings pointed at `engine_url` (for tests).
    pub fn with_engine_url(engine_url: impl Into<String>) -> Self {
        Self {
            engine_url: engine_url.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
