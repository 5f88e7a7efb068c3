//! # Canvass
//!
//! Contact search for a canvassing database. Compact request tokens from the
//! front end are decoded into typed filters, compiled into search-engine
//! boolean queries and aggregation trees, run against the engine over HTTP,
//! and normalized into KPI blocks, address groups, geo clusters and pivot
//! tables.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use canvass::{ContactSearch, SearchConfig, SearchRequest};
//!
//! # async fn run() -> canvass::Result<()> {
//! let search = ContactSearch::from_config(SearchConfig::from_env());
//!
//! // group 12, fullname mode, 50 per page, women only
//! let request = SearchRequest::new("dupont", &["12", "fullname", "50", "0", "F"]);
//! let reply = search.search_contacts(&request).await?;
//! println!("{} contacts", reply.total);
//!
//! let kpi = search.kpi_contacts(&request).await?;
//! for block in &kpi {
//!     println!("{}: {} entries", block.name, block.entries.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Compiling without an engine
//!
//! ```rust
//! use canvass::query::compiler::compile;
//! use canvass::query::SearchFilters;
//!
//! let fields: Vec<String> = ["12", "fullname"].iter().map(|s| s.to_string()).collect();
//! let filters = SearchFilters::decode(&fields).unwrap();
//! let query = compile(&filters, "dupont");
//! assert_eq!(query.must.len(), 2);
//! ```

pub mod aggregation;
pub mod client;
pub mod config;
pub mod error;
pub mod query;
pub mod service;
pub mod types;

pub use client::{HttpSearchClient, SearchBackend, SearchBody, SearchResponse};
pub use config::SearchConfig;
pub use error::{CanvassError, Result};
pub use service::ContactSearch;
pub use types::*;

/// Installs a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
