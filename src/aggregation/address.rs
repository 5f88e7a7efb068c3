//! Grouping of contacts by address coordinate, and geohash clustering.

use crate::error::Result;
use crate::query::dsl::SortSpec;
use crate::query::geo::GeoPoint;
use crate::types::{AddressAggregate, Contact, GeoCluster};

use super::result::{lookup, AggregationResult, AggregationResults};
use super::spec::{AggregationKind, AggregationMap, AggregationSpec};

pub const ADDRESS_AGG: &str = "result_aggreg";
pub const ADDRESS_HITS_AGG: &str = "result_subaggreg";
pub const NEARBY_AGG: &str = "aggreg_sortGeodistance";
pub const CLUSTER_AGG: &str = "cluster_aggreg";
pub const CLUSTER_LAT_AGG: &str = "lat_avg";
pub const CLUSTER_LNG_AGG: &str = "lng_avg";

const LATITUDE_FIELD: &str = "address.latitude";
const LONGITUDE_FIELD: &str = "address.longitude";

/// Geohash precisions accepted by the engine.
pub const MIN_GEOHASH_PRECISION: u8 = 1;
pub const MAX_GEOHASH_PRECISION: u8 = 12;

/// One bucket per distinct latitude (`buckets` of them), each holding up to
/// `hits_per_bucket` contacts.
pub fn build_address_aggregations(buckets: usize, hits_per_bucket: usize) -> AggregationMap {
    let hits = AggregationSpec::new(AggregationKind::TopHits {
        size: hits_per_bucket,
        sort: Vec::new(),
        source: Vec::new(),
    });
    let mut aggs = AggregationMap::new();
    aggs.insert(
        ADDRESS_AGG.to_string(),
        AggregationSpec::terms(LATITUDE_FIELD, Some(buckets)).with_sub(ADDRESS_HITS_AGG, hits),
    );
    aggs
}

/// Address groups in bucket order. Buckets without a hits node are skipped.
pub fn extract_addresses(results: &AggregationResults) -> Result<Vec<AddressAggregate>> {
    let groups = match lookup(results, ADDRESS_AGG) {
        Ok(agg) => agg,
        Err(e) => {
            tracing::debug!("{}", e);
            return Ok(Vec::new());
        }
    };
    let mut addresses = Vec::new();
    for bucket in groups.buckets() {
        let Some(hits) = bucket.sub.get(ADDRESS_HITS_AGG) else {
            continue;
        };
        let contacts = hits
            .hits()
            .iter()
            .map(|source| serde_json::from_value::<Contact>(source.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        addresses.push(AddressAggregate {
            latitude: bucket.key_string(),
            doc_count: bucket.doc_count,
            contacts,
        });
    }
    Ok(addresses)
}

/// The `size` contacts nearest to `origin` on `field`.
pub fn build_nearby_aggregations(field: &str, origin: GeoPoint, size: usize) -> AggregationMap {
    let mut aggs = AggregationMap::new();
    aggs.insert(
        NEARBY_AGG.to_string(),
        AggregationSpec::new(AggregationKind::TopHits {
            size,
            sort: vec![SortSpec::GeoDistance {
                field: field.to_string(),
                origin,
            }],
            source: Vec::new(),
        }),
    );
    aggs
}

pub fn extract_nearby(results: &AggregationResults) -> Result<Vec<Contact>> {
    let Some(nearest) = results.get(NEARBY_AGG) else {
        tracing::debug!(aggregation = NEARBY_AGG, "aggregation absent from response");
        return Ok(Vec::new());
    };
    let contacts = nearest
        .hits()
        .iter()
        .map(|source| serde_json::from_value::<Contact>(source.clone()))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(contacts)
}

pub fn clamp_precision(precision: u8) -> u8 {
    precision.clamp(MIN_GEOHASH_PRECISION, MAX_GEOHASH_PRECISION)
}

/// Geohash grid on `field` with the mean coordinate of each cell.
pub fn build_cluster_aggregations(field: &str, precision: u8) -> AggregationMap {
    let grid = AggregationSpec::new(AggregationKind::GeoHashGrid {
        field: field.to_string(),
        precision: clamp_precision(precision),
    })
    .with_sub(CLUSTER_LAT_AGG, AggregationSpec::avg(LATITUDE_FIELD))
    .with_sub(CLUSTER_LNG_AGG, AggregationSpec::avg(LONGITUDE_FIELD));
    let mut aggs = AggregationMap::new();
    aggs.insert(CLUSTER_AGG.to_string(), grid);
    aggs
}

pub fn extract_clusters(results: &AggregationResults) -> Vec<GeoCluster> {
    let grid = match lookup(results, CLUSTER_AGG) {
        Ok(agg) => agg,
        Err(e) => {
            tracing::error!("{}", e);
            return Vec::new();
        }
    };
    grid.buckets()
        .iter()
        .map(|b| GeoCluster {
            geohash: b.key_string(),
            doc_count: b.doc_count,
            lat: b.sub.get(CLUSTER_LAT_AGG).and_then(AggregationResult::value),
            lng: b.sub.get(CLUSTER_LNG_AGG).and_then(AggregationResult::value),
        })
        .collect()
}
