//! Contact search operations.
//!
//! Each operation decodes the request tokens, compiles the query and
//! aggregations, runs them through the [`SearchBackend`] and normalizes the
//! response. Decoding errors abort before any engine call.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::Value;

use crate::aggregation::address::{
    build_address_aggregations, build_cluster_aggregations, build_nearby_aggregations,
    extract_addresses, extract_clusters, extract_nearby,
};
use crate::aggregation::kpi::{build_kpi_aggregations, extract_kpi};
use crate::aggregation::pivot::{
    build_pivot_aggregations, flatten_rows, pick_interval, PivotDimension,
};
use crate::aggregation::spec::CalendarInterval;
use crate::client::{HttpSearchClient, SearchBackend, SearchBody};
use crate::config::SearchConfig;
use crate::error::{CanvassError, Result};
use crate::query::compiler::{
    self, polygon_clause, tenant_clause, text_clause, LAST_CHANGE_FIELD, LOCATION_FIELD,
};
use crate::query::dsl::{BoolQuery, Query, SortSpec};
use crate::query::geo::{parse_lat_lng, GeoPoint};
use crate::query::tokens::{AddressLookup, NearbyLookup, SearchFilters, SearchMode};
use crate::types::{
    AddressAggregate, Contact, ContactsReply, GeoCluster, KpiBlock, PivotTable, SearchRequest,
};

/// Fields returned for each contact of a search.
pub const CONTACT_SOURCE: &[&str] = &[
    "id",
    "firstname",
    "surname",
    "married_name",
    "address.street",
    "address.housenumber",
    "address.city",
    "address.latitude",
    "address.longitude",
    "gender",
    "birthdate",
    "phone",
    "mobile",
    "mail",
    "lastchange",
    "formdatas",
];

/// Fields returned by address and proximity lookups.
pub const ADDRESS_SOURCE: &[&str] = &["address.street", "address.housenumber", "address.city"];

/// Fields returned by a full tenant listing.
pub const LISTING_SOURCE: &[&str] = &[
    "id",
    "firstname",
    "surname",
    "married_name",
    "address.street",
    "address.housenumber",
    "address.city",
];

/// Size of a full tenant listing.
pub const RETRIEVE_LIMIT: usize = 20_000;

/// Terms size of each pivot level.
pub const PIVOT_BUCKETS: usize = 1_000;

/// Location field of fact documents.
pub const FACT_LOCATION_FIELD: &str = "contact.address.location";
pub const FACT_STATUS_FIELD: &str = "status";
pub const FACT_CONTACT_ID_FIELD: &str = "contact_id";

const SURNAME_FIELD: &str = "surname";

pub struct ContactSearch<B> {
    backend: B,
    config: SearchConfig,
}

impl ContactSearch<HttpSearchClient> {
    pub fn from_config(config: SearchConfig) -> Self {
        let backend = HttpSearchClient::new(&config);
        Self::new(backend, config)
    }
}

impl<B: SearchBackend> ContactSearch<B> {
    pub fn new(backend: B, config: SearchConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Paged, sorted contact search. In `address` mode the contacts are
    /// grouped by latitude into `addresses` instead.
    pub async fn search_contacts(&self, request: &SearchRequest) -> Result<ContactsReply> {
        tracing::debug!(query = %request.query, fields = ?request.fields, "search_contacts");
        let filters = SearchFilters::decode(&request.fields)?;
        let query = compiler::compile(&filters, &request.query);

        let mut body = SearchBody::new(&self.config.contacts_index, query.into())
            .source(CONTACT_SOURCE.iter().copied());
        let address_mode = filters.mode == SearchMode::Address;
        if address_mode {
            body = body
                .size(0)
                .aggregations(build_address_aggregations(
                    filters.paging.size,
                    filters.paging.size,
                ))
                .sort(SortSpec::field(SURNAME_FIELD, true));
        } else {
            body = body
                .size(filters.paging.size)
                .offset(filters.paging.from)
                .sort(SortSpec::field(&filters.sort.field, filters.sort.ascending));
        }
        if !request.polygon.is_empty() {
            body = body.post_filter(polygon_clause(LOCATION_FIELD, &request.polygon));
        }

        let response = self.backend.search(&body).await?;
        let contacts = to_contacts(response.hits)?;
        let addresses = match (&response.aggregations, address_mode) {
            (Some(results), true) => extract_addresses(results)?,
            _ => Vec::new(),
        };
        Ok(ContactsReply {
            total: response.total,
            contacts,
            addresses,
        })
    }

    /// KPI blocks for the contacts matching the request. Empty when the
    /// engine returns no aggregations.
    pub async fn kpi_contacts(&self, request: &SearchRequest) -> Result<Vec<KpiBlock>> {
        tracing::debug!(query = %request.query, fields = ?request.fields, "kpi_contacts");
        let filters = SearchFilters::decode(&request.fields)?;
        let query = with_polygon(
            compiler::compile(&filters, &request.query),
            LOCATION_FIELD,
            &request.polygon,
        );

        let body = SearchBody::new(&self.config.contacts_index, query.into())
            .size(0)
            .aggregations(build_kpi_aggregations(self.config.polling_station_buckets));

        let response = self.backend.search(&body).await?;
        match &response.aggregations {
            Some(results) => extract_kpi(response.total, results),
            None => Ok(Vec::new()),
        }
    }

    /// Free-text address search, grouped by latitude.
    pub async fn search_addresses(&self, request: &SearchRequest) -> Result<Vec<AddressAggregate>> {
        tracing::debug!(query = %request.query, fields = ?request.fields, "search_addresses");
        let lookup = AddressLookup::decode(&request.fields)?;
        let query = BoolQuery::new()
            .must(text_clause(&SearchMode::Address, &request.query))
            .must(tenant_clause(&lookup.group_id));

        let body = SearchBody::new(&self.config.contacts_index, query.into())
            .size(0)
            .source(ADDRESS_SOURCE.iter().copied())
            .aggregations(build_address_aggregations(
                lookup.buckets,
                lookup.hits_per_bucket,
            ))
            .sort(SortSpec::field(SURNAME_FIELD, true));

        let response = self.backend.search(&body).await?;
        match &response.aggregations {
            Some(results) => extract_addresses(results),
            None => Ok(Vec::new()),
        }
    }

    /// Contacts nearest to the `"lat,lng"` point in `query`, optionally
    /// within a radius.
    pub async fn search_nearby(&self, request: &SearchRequest) -> Result<Vec<Contact>> {
        tracing::debug!(query = %request.query, fields = ?request.fields, "search_nearby");
        let origin = parse_lat_lng(&request.query).ok_or_else(|| {
            CanvassError::Decode(format!("'{}' is not a \"lat,lng\" point", request.query))
        })?;
        let lookup = NearbyLookup::decode(&request.fields)?;

        let mut query = BoolQuery::new().must(tenant_clause(&lookup.group_id));
        if let Some(radius) = lookup.radius_m {
            query = query.must(Query::GeoDistance {
                field: LOCATION_FIELD.to_string(),
                center: origin,
                distance_m: radius,
            });
        }

        let body = SearchBody::new(&self.config.contacts_index, query.into())
            .size(0)
            .source(ADDRESS_SOURCE.iter().copied())
            .aggregations(build_nearby_aggregations(LOCATION_FIELD, origin, lookup.size));

        let response = self.backend.search(&body).await?;
        match &response.aggregations {
            Some(results) => extract_nearby(results),
            None => Ok(Vec::new()),
        }
    }

    /// Ids of contacts whose facts lie inside `polygon`, optionally with a
    /// given `status` (`filter`).
    pub async fn contact_ids_in_polygon(&self, request: &SearchRequest) -> Result<Vec<i64>> {
        if request.polygon.len() < 3 {
            return Err(CanvassError::Decode(format!(
                "polygon needs at least 3 points, got {}",
                request.polygon.len()
            )));
        }
        let mut query = BoolQuery::new()
            .must(Query::MatchAll)
            .filter(polygon_clause(FACT_LOCATION_FIELD, &request.polygon));
        if !request.filter.is_empty() {
            query = query.filter(Query::term(FACT_STATUS_FIELD, request.filter.as_str()));
        }

        let body = SearchBody::new(&self.config.facts_index, query.into())
            .size(self.config.id_lookup_limit)
            .source([FACT_CONTACT_ID_FIELD]);

        let response = self.backend.search(&body).await?;
        let mut ids = Vec::with_capacity(response.hits.len());
        for hit in &response.hits {
            match hit.get(FACT_CONTACT_ID_FIELD).and_then(as_id) {
                Some(id) => ids.push(id),
                None => tracing::debug!(hit = %hit, "fact without contact id"),
            }
        }
        Ok(ids)
    }

    /// Every contact of the tenant, by surname.
    pub async fn retrieve_contacts(&self, request: &SearchRequest) -> Result<Vec<Contact>> {
        let filters = SearchFilters::decode(&request.fields)?;
        let query = BoolQuery::new()
            .must(Query::MatchAll)
            .must(tenant_clause(&filters.group_id));

        let body = SearchBody::new(&self.config.contacts_index, query.into())
            .size(RETRIEVE_LIMIT)
            .sort(SortSpec::field(SURNAME_FIELD, true))
            .source(LISTING_SOURCE.iter().copied());

        let response = self.backend.search(&body).await?;
        to_contacts(response.hits)
    }

    /// Pivot table of the matching contacts over `dimensions`, outermost
    /// first.
    ///
    /// With a `date` level, the oldest and then the newest `lastchange` are
    /// fetched first to size the histogram interval. A bare `presence` level
    /// reads the answers to the configured presence form.
    pub async fn pivot_contacts<S: AsRef<str>>(
        &self,
        request: &SearchRequest,
        dimensions: &[S],
    ) -> Result<PivotTable> {
        let dims = PivotDimension::parse_all(dimensions, self.config.presence_form_id)?;
        if dims.is_empty() {
            return Err(CanvassError::Decode("no pivot level requested".to_string()));
        }
        let filters = SearchFilters::decode(&request.fields)?;
        let query: Query = with_polygon(
            compiler::compile(&filters, &request.query),
            LOCATION_FIELD,
            &request.polygon,
        )
        .into();

        let interval = if dims.contains(&PivotDimension::Date) {
            let oldest = self.last_change_edge(&query, true).await?;
            let newest = self.last_change_edge(&query, false).await?;
            pick_interval(oldest, newest)
        } else {
            CalendarInterval::Week
        };
        tracing::debug!(levels = dims.len(), interval = interval.as_str(), "pivot_contacts");

        let body = SearchBody::new(&self.config.contacts_index, query)
            .size(0)
            .aggregations(build_pivot_aggregations(&dims, interval, PIVOT_BUCKETS));
        let response = self.backend.search(&body).await?;
        let rows = match &response.aggregations {
            Some(results) => flatten_rows(&dims, results),
            None => Vec::new(),
        };
        Ok(PivotTable {
            dimensions: dims.iter().map(|d| d.name().to_string()).collect(),
            rows,
        })
    }

    /// Geohash clusters of the matching contacts.
    pub async fn cluster_contacts(
        &self,
        request: &SearchRequest,
        precision: u8,
    ) -> Result<Vec<GeoCluster>> {
        let filters = SearchFilters::decode(&request.fields)?;
        let query = with_polygon(
            compiler::compile(&filters, &request.query),
            LOCATION_FIELD,
            &request.polygon,
        );
        let body = SearchBody::new(&self.config.contacts_index, query.into())
            .size(0)
            .aggregations(build_cluster_aggregations(LOCATION_FIELD, precision));

        let response = self.backend.search(&body).await?;
        Ok(response
            .aggregations
            .as_ref()
            .map(extract_clusters)
            .unwrap_or_default())
    }

    /// Oldest (`ascending`) or newest `lastchange` among matching contacts.
    async fn last_change_edge(
        &self,
        query: &Query,
        ascending: bool,
    ) -> Result<Option<DateTime<Utc>>> {
        let body = SearchBody::new(&self.config.contacts_index, query.clone())
            .size(1)
            .sort(SortSpec::field(LAST_CHANGE_FIELD, ascending))
            .source([LAST_CHANGE_FIELD]);
        let response = self.backend.search(&body).await?;
        Ok(response
            .hits
            .first()
            .and_then(|hit| hit.get(LAST_CHANGE_FIELD))
            .and_then(parse_timestamp))
    }
}

fn with_polygon(query: BoolQuery, field: &str, polygon: &[GeoPoint]) -> BoolQuery {
    if polygon.is_empty() {
        query
    } else {
        query.filter(polygon_clause(field, polygon))
    }
}

fn to_contacts(hits: Vec<Value>) -> Result<Vec<Contact>> {
    hits.into_iter()
        .map(|source| serde_json::from_value::<Contact>(source).map_err(CanvassError::from))
        .collect()
}

fn as_id(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Stored timestamps are RFC 3339, `YYYY-MM-DD` or epoch milliseconds.
fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|ts| ts.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)))
            }),
        _ => None,
    }
}
