//! KPI aggregations over a contact query.
//!
//! Age counts are reconciled from two sources: the stored `age_category`
//! terms and per-category birthdate date ranges. For categories 1 to 6 the
//! count is `date_range + age_category[i]`; for the unknown category it is
//! `missing_birthdate - (sum(age_category) - age_category[0])`.

use crate::error::{CanvassError, Result};
use crate::query::age::AgeCategory;
use crate::query::compiler::{
    AGE_CATEGORY_FIELD, BIRTHDATE_FIELD, GENDER_FIELD, LAST_CHANGE_FIELD, MAIL_FIELD,
    PHONE_FIELD, POLLING_STATION_FIELD,
};
use crate::types::{KpiBlock, KpiEntry};

use super::result::{lookup, AggregationResults};
use super::spec::{AggregationKind, AggregationMap, AggregationSpec, CalendarInterval};

pub const GENDER_AGG: &str = "gender_aggreg";
pub const GENDER_MISSING_AGG: &str = "gender_missing_aggreg";
pub const POLLING_STATION_AGG: &str = "pollingstation_aggreg";
pub const POLLING_STATION_MISSING_AGG: &str = "pollingstation_missing_aggreg";
pub const AGE_CATEGORY_AGG: &str = "agecategory_aggreg";
pub const LAST_CHANGE_AGG: &str = "lastchange_aggreg";
pub const MAIL_MISSING_AGG: &str = "mail_missing_aggreg";
pub const PHONE_MISSING_AGG: &str = "phone_missing_aggreg";

/// Key used for "no value" entries.
pub const MISSING_KEY: &str = "missing";

const AGE_SLOTS: usize = 7;

/// Birthdate aggregation of each age slot. Slot 0 counts missing birthdates.
pub const AGE_AGGS: [&str; AGE_SLOTS] = [
    "0_aggreg", "1_aggreg", "2_aggreg", "3_aggreg", "4_aggreg", "5_aggreg", "6_aggreg",
];

/// Every KPI aggregation, in request order.
pub const KPI_AGGREGATIONS: [&str; 15] = [
    GENDER_AGG,
    GENDER_MISSING_AGG,
    POLLING_STATION_AGG,
    POLLING_STATION_MISSING_AGG,
    AGE_CATEGORY_AGG,
    LAST_CHANGE_AGG,
    AGE_AGGS[0],
    AGE_AGGS[1],
    AGE_AGGS[2],
    AGE_AGGS[3],
    AGE_AGGS[4],
    AGE_AGGS[5],
    AGE_AGGS[6],
    MAIL_MISSING_AGG,
    PHONE_MISSING_AGG,
];

pub fn build_kpi_aggregations(polling_station_buckets: usize) -> AggregationMap {
    let mut aggs = AggregationMap::new();
    aggs.insert(GENDER_AGG.to_string(), AggregationSpec::terms(GENDER_FIELD, None));
    aggs.insert(
        GENDER_MISSING_AGG.to_string(),
        AggregationSpec::missing(GENDER_FIELD),
    );
    aggs.insert(
        POLLING_STATION_AGG.to_string(),
        AggregationSpec::terms(POLLING_STATION_FIELD, Some(polling_station_buckets)),
    );
    aggs.insert(
        POLLING_STATION_MISSING_AGG.to_string(),
        AggregationSpec::missing(POLLING_STATION_FIELD),
    );
    aggs.insert(
        AGE_CATEGORY_AGG.to_string(),
        AggregationSpec::terms(AGE_CATEGORY_FIELD, None),
    );
    aggs.insert(
        LAST_CHANGE_AGG.to_string(),
        AggregationSpec::date_histogram(LAST_CHANGE_FIELD, CalendarInterval::Week),
    );
    aggs.insert(AGE_AGGS[0].to_string(), AggregationSpec::missing(BIRTHDATE_FIELD));
    for cat in AgeCategory::ALL {
        let (from, to) = cat.kpi_window();
        aggs.insert(
            AGE_AGGS[cat.code() as usize].to_string(),
            AggregationSpec::new(AggregationKind::DateRange {
                field: BIRTHDATE_FIELD.to_string(),
                ranges: vec![(from, to)],
            }),
        );
    }
    aggs.insert(
        MAIL_MISSING_AGG.to_string(),
        AggregationSpec::missing(MAIL_FIELD),
    );
    aggs.insert(
        PHONE_MISSING_AGG.to_string(),
        AggregationSpec::missing(PHONE_FIELD),
    );
    aggs
}

/// Builds the KPI blocks: total, gender, polling station, age, last change,
/// missing mail, missing phone.
///
/// Every requested aggregation absent from `results` is logged and read as
/// empty.
pub fn extract_kpi(total: u64, results: &AggregationResults) -> Result<Vec<KpiBlock>> {
    for name in KPI_AGGREGATIONS {
        if let Err(e) = lookup(results, name) {
            tracing::error!(aggregation = %name, "{}", e);
        }
    }
    let buckets = |name: &str| results.get(name).map(|r| r.buckets()).unwrap_or(&[]);
    let count = |name: &str| results.get(name).map(|r| r.doc_count()).unwrap_or(0);

    let mut blocks = vec![KpiBlock {
        name: "total".to_string(),
        entries: vec![KpiEntry::new("total", total as i64)],
    }];

    let mut gender: Vec<KpiEntry> = buckets(GENDER_AGG)
        .iter()
        .map(|b| KpiEntry::new(b.key_string(), b.doc_count as i64))
        .collect();
    push_missing(&mut gender, count(GENDER_MISSING_AGG));
    blocks.push(KpiBlock {
        name: "gender".to_string(),
        entries: gender,
    });

    let mut polling: Vec<KpiEntry> = buckets(POLLING_STATION_AGG)
        .iter()
        .map(|b| {
            let key = b.key_string();
            let key = if key.is_empty() { MISSING_KEY.to_string() } else { key };
            KpiEntry::new(key, b.doc_count as i64)
        })
        .collect();
    push_missing(&mut polling, count(POLLING_STATION_MISSING_AGG));
    blocks.push(KpiBlock {
        name: "pollingstation".to_string(),
        entries: polling,
    });

    blocks.push(KpiBlock {
        name: "agecategory".to_string(),
        entries: reconcile_ages(results)?,
    });

    blocks.push(KpiBlock {
        name: "lastchange".to_string(),
        entries: buckets(LAST_CHANGE_AGG)
            .iter()
            .map(|b| KpiEntry::new(b.key_string(), b.doc_count as i64))
            .collect(),
    });

    for (name, agg) in [
        ("mail_missing", MAIL_MISSING_AGG),
        ("phone_missing", PHONE_MISSING_AGG),
    ] {
        blocks.push(KpiBlock {
            name: name.to_string(),
            entries: vec![KpiEntry::new(MISSING_KEY, count(agg) as i64)],
        });
    }

    Ok(blocks)
}

fn push_missing(entries: &mut Vec<KpiEntry>, missing: u64) {
    if missing > 0 {
        entries.push(KpiEntry::new(MISSING_KEY, missing as i64));
    }
}

fn reconcile_ages(results: &AggregationResults) -> Result<Vec<KpiEntry>> {
    let mut by_category = [0u64; AGE_SLOTS];
    let mut sum = 0u64;
    if let Some(agecat) = results.get(AGE_CATEGORY_AGG) {
        for b in agecat.buckets() {
            let slot = age_slot(&b.key_string())?;
            by_category[slot] = b.doc_count;
            sum += b.doc_count;
        }
    }

    let missing_birthdate = results
        .get(AGE_AGGS[0])
        .map(|r| r.doc_count())
        .unwrap_or(0);
    let unknown = missing_birthdate as i64 - (sum as i64 - by_category[0] as i64);

    if unknown < 0 {
        tracing::warn!(
            missing_birthdate,
            categorised = sum - by_category[0],
            "unknown age count is negative"
        );
    }
    let mut entries = vec![KpiEntry::new("0", unknown)];
    for cat in AgeCategory::ALL {
        let slot = cat.code() as usize;
        if let Some(range) = results.get(AGE_AGGS[slot]) {
            for b in range.buckets() {
                entries.push(KpiEntry::new(
                    slot.to_string(),
                    (b.doc_count + by_category[slot]) as i64,
                ));
            }
        }
    }
    Ok(entries)
}

/// Age category keys come back as `"3"`, `3` or `3.0`.
fn age_slot(key: &str) -> Result<usize> {
    let unsupported =
        || CanvassError::UnsupportedValue(format!("age category bucket '{}'", key));
    let value: f64 = key.parse().map_err(|_| unsupported())?;
    if value.fract() != 0.0 || !(0.0..AGE_SLOTS as f64).contains(&value) {
        return Err(unsupported());
    }
    Ok(value as usize)
}
