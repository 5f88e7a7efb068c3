//! Generic pivot over contact dimensions.
//!
//! Each dimension level requests two aggregations: `<dim>` (one bucket per
//! value) and `<dim>_missing` (documents without a value), both carrying the
//! next level as sub-aggregations. Flattening turns the tree into rows of
//! `[key, key, ..., count]`; the missing companion is always walked under
//! the `N/A` key, even with a zero count.
//!
//! The `presence` level reads the answers given to one form. Its value node
//! is a nested `formdatas` aggregation filtered on the form id, with one
//! terms bucket per answer; each bucket goes back to the contact through a
//! `reverse_nested` node, so inner levels and counts are per contact. Its
//! companion counts contacts without an answer to that form.

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{CanvassError, Result};
use crate::query::compiler::{
    AGE_CATEGORY_FIELD, GENDER_FIELD, LAST_CHANGE_FIELD, POLLING_STATION_FIELD,
};
use crate::query::dsl::{BoolQuery, Query};
use crate::query::form::{FORMDATAS_PATH, FORM_ID_FIELD, STRICT_DATA_FIELD};

use super::result::{AggregationResult, AggregationResults, Bucket};
use super::spec::{AggregationKind, AggregationMap, AggregationSpec, CalendarInterval};

/// Key standing for "no value" at a pivot level.
pub const NOT_AVAILABLE: &str = "N/A";

/// Inner nodes of a presence level.
pub const PRESENCE_FORM_AGG: &str = "form";
pub const PRESENCE_ANSWER_AGG: &str = "answer";
pub const PRESENCE_CONTACTS_AGG: &str = "contacts";

pub type Row = Vec<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotDimension {
    User,
    Date,
    Gender,
    PollingStation,
    AgeCategory,
    City,
    PostalCode,
    /// Answer to the form `form_id`.
    Presence { form_id: i64 },
}

impl PivotDimension {
    /// Parses a level name. `presence` reads `presence_form_id` unless the
    /// name carries its own, as in `presence/12`.
    pub fn parse(name: &str, presence_form_id: i64) -> Result<Self> {
        match name {
            "user" => Ok(PivotDimension::User),
            "date" => Ok(PivotDimension::Date),
            "gender" => Ok(PivotDimension::Gender),
            "pollingstation" => Ok(PivotDimension::PollingStation),
            "agecategory" => Ok(PivotDimension::AgeCategory),
            "city" => Ok(PivotDimension::City),
            "postalcode" => Ok(PivotDimension::PostalCode),
            "presence" => Ok(PivotDimension::Presence {
                form_id: presence_form_id,
            }),
            other => match other.strip_prefix("presence/") {
                Some(id) => id
                    .parse()
                    .map(|form_id| PivotDimension::Presence { form_id })
                    .map_err(|_| {
                        CanvassError::Decode(format!("presence form id '{}' is not a number", id))
                    }),
                None => Err(CanvassError::UnsupportedValue(format!(
                    "pivot level '{}'",
                    other
                ))),
            },
        }
    }

    pub fn parse_all<S: AsRef<str>>(names: &[S], presence_form_id: i64) -> Result<Vec<Self>> {
        names
            .iter()
            .map(|n| Self::parse(n.as_ref(), presence_form_id))
            .collect()
    }

    pub fn name(self) -> &'static str {
        match self {
            PivotDimension::User => "user",
            PivotDimension::Date => "date",
            PivotDimension::Gender => "gender",
            PivotDimension::PollingStation => "pollingstation",
            PivotDimension::AgeCategory => "agecategory",
            PivotDimension::City => "city",
            PivotDimension::PostalCode => "postalcode",
            PivotDimension::Presence { .. } => "presence",
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            PivotDimension::User => "lastchangeuserid",
            PivotDimension::Date => LAST_CHANGE_FIELD,
            PivotDimension::Gender => GENDER_FIELD,
            PivotDimension::PollingStation => POLLING_STATION_FIELD,
            PivotDimension::AgeCategory => AGE_CATEGORY_FIELD,
            PivotDimension::City => "address.city",
            PivotDimension::PostalCode => "address.postalcode",
            PivotDimension::Presence { .. } => STRICT_DATA_FIELD,
        }
    }

    pub fn missing_name(self) -> String {
        format!("{}_missing", self.name())
    }

    /// Value node of this level, with `inner` run once per value.
    fn value_aggregation(
        self,
        interval: CalendarInterval,
        size: usize,
        inner: AggregationMap,
    ) -> AggregationSpec {
        match self {
            PivotDimension::Date => {
                AggregationSpec::date_histogram(self.field(), interval).with_subs(inner)
            }
            PivotDimension::Presence { form_id } => {
                let contacts =
                    AggregationSpec::new(AggregationKind::ReverseNested).with_subs(inner);
                let answers = AggregationSpec::terms(self.field(), Some(size))
                    .with_sub(PRESENCE_CONTACTS_AGG, contacts);
                let form = AggregationSpec::new(AggregationKind::Filter {
                    query: Query::term(FORM_ID_FIELD, form_id),
                })
                .with_sub(PRESENCE_ANSWER_AGG, answers);
                AggregationSpec::new(AggregationKind::Nested {
                    path: FORMDATAS_PATH.to_string(),
                })
                .with_sub(PRESENCE_FORM_AGG, form)
            }
            _ => AggregationSpec::terms(self.field(), Some(size)).with_subs(inner),
        }
    }

    /// Companion node counting documents without a value.
    fn missing_aggregation(self, inner: AggregationMap) -> AggregationSpec {
        match self {
            PivotDimension::Presence { form_id } => {
                let unanswered = BoolQuery::new().must_not(Query::nested(
                    FORMDATAS_PATH,
                    Query::term(FORM_ID_FIELD, form_id),
                ));
                AggregationSpec::new(AggregationKind::Filter {
                    query: unanswered.into(),
                })
                .with_subs(inner)
            }
            _ => AggregationSpec::missing(self.field()).with_subs(inner),
        }
    }
}

/// Aggregation tree for `dimensions`, outermost first. `interval` applies to
/// the date level and `size` bounds the terms levels.
pub fn build_pivot_aggregations(
    dimensions: &[PivotDimension],
    interval: CalendarInterval,
    size: usize,
) -> AggregationMap {
    let mut aggs = AggregationMap::new();
    let Some((dim, rest)) = dimensions.split_first() else {
        return aggs;
    };
    let inner = build_pivot_aggregations(rest, interval, size);
    aggs.insert(
        dim.name().to_string(),
        dim.value_aggregation(interval, size, inner.clone()),
    );
    aggs.insert(dim.missing_name(), dim.missing_aggregation(inner));
    aggs
}

/// Histogram granularity for a `lastchange` span: hour up to 2 days, day up
/// to 62 days, week up to 366 days, month up to 5 years, year beyond. No
/// documents gives week.
pub fn pick_interval(
    oldest: Option<DateTime<Utc>>,
    newest: Option<DateTime<Utc>>,
) -> CalendarInterval {
    let (Some(oldest), Some(newest)) = (oldest, newest) else {
        return CalendarInterval::Week;
    };
    let span = newest - oldest;
    if span <= Duration::days(2) {
        CalendarInterval::Hour
    } else if span <= Duration::days(62) {
        CalendarInterval::Day
    } else if span <= Duration::days(366) {
        CalendarInterval::Week
    } else if span <= Duration::days(5 * 366) {
        CalendarInterval::Month
    } else {
        CalendarInterval::Year
    }
}

/// Flattens a pivot aggregation tree into rows.
pub fn flatten_rows(dimensions: &[PivotDimension], results: &AggregationResults) -> Vec<Row> {
    let mut rows = Vec::new();
    if dimensions.is_empty() {
        return rows;
    }
    let mut prefix = Vec::with_capacity(dimensions.len() + 1);
    walk(dimensions, results, &mut prefix, &mut rows);
    rows
}

fn walk(
    dimensions: &[PivotDimension],
    results: &AggregationResults,
    prefix: &mut Row,
    rows: &mut Vec<Row>,
) {
    let Some((dim, rest)) = dimensions.split_first() else {
        return;
    };

    for (key, count, sub) in values(*dim, results) {
        prefix.push(key);
        descend(rest, sub, count, prefix, rows);
        prefix.pop();
    }

    let empty = AggregationResults::new();
    let (count, sub) = match results.get(&dim.missing_name()) {
        Some(AggregationResult::Single { doc_count, sub }) => (*doc_count, sub),
        Some(other) => (other.doc_count(), &empty),
        None => (0, &empty),
    };
    prefix.push(NOT_AVAILABLE.to_string());
    descend(rest, sub, count, prefix, rows);
    prefix.pop();
}

/// `(key, count, inner results)` of each value at `dim`.
fn values(
    dim: PivotDimension,
    results: &AggregationResults,
) -> Vec<(String, u64, &AggregationResults)> {
    let Some(node) = results.get(dim.name()) else {
        return Vec::new();
    };
    let PivotDimension::Presence { .. } = dim else {
        return node
            .buckets()
            .iter()
            .map(|b| (b.key_string(), b.doc_count, &b.sub))
            .collect();
    };
    let answers = single_sub(node)
        .and_then(|s| s.get(PRESENCE_FORM_AGG))
        .and_then(single_sub)
        .and_then(|s| s.get(PRESENCE_ANSWER_AGG))
        .map(AggregationResult::buckets)
        .unwrap_or(&[]);
    answers
        .iter()
        .map(|b| match b.sub.get(PRESENCE_CONTACTS_AGG) {
            Some(AggregationResult::Single { doc_count, sub }) => {
                (b.key_string(), *doc_count, sub)
            }
            _ => (b.key_string(), b.doc_count, &b.sub),
        })
        .collect()
}

fn single_sub(node: &AggregationResult) -> Option<&AggregationResults> {
    match node {
        AggregationResult::Single { sub, .. } => Some(sub),
        _ => None,
    }
}

fn descend(
    rest: &[PivotDimension],
    sub: &AggregationResults,
    count: u64,
    prefix: &mut Row,
    rows: &mut Vec<Row>,
) {
    if rest.is_empty() {
        let mut row = prefix.clone();
        row.push(count.to_string());
        rows.push(row);
    } else {
        walk(rest, sub, prefix, rows);
    }
}

/// Builds the aggregation tree `rows` were flattened from. Counts of inner
/// nodes are the sums of their leaves; `N/A` cells go to the missing
/// companion, which is always present.
pub fn fold_rows(dimensions: &[PivotDimension], rows: &[Row]) -> Result<AggregationResults> {
    for row in rows {
        if row.len() != dimensions.len() + 1 {
            return Err(CanvassError::Decode(format!(
                "pivot row {:?} has {} cells, expected {}",
                row,
                row.len(),
                dimensions.len() + 1
            )));
        }
    }
    let parsed = rows
        .iter()
        .map(|row| {
            let (count, keys) = row.split_last().ok_or_else(|| {
                CanvassError::Decode("empty pivot row".to_string())
            })?;
            let count = count.parse::<u64>().map_err(|_| {
                CanvassError::Decode(format!("pivot count '{}' is not a number", count))
            })?;
            Ok((keys, count))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(fold_level(dimensions, &parsed))
}

fn fold_level(dimensions: &[PivotDimension], rows: &[(&[String], u64)]) -> AggregationResults {
    let mut results = AggregationResults::new();
    let Some((dim, rest)) = dimensions.split_first() else {
        return results;
    };

    let mut groups: IndexMap<&str, Vec<(&[String], u64)>> = IndexMap::new();
    let mut missing: Vec<(&[String], u64)> = Vec::new();
    for (keys, count) in rows {
        let (head, tail) = (&keys[0], &keys[1..]);
        if head == NOT_AVAILABLE {
            missing.push((tail, *count));
        } else {
            groups.entry(head.as_str()).or_default().push((tail, *count));
        }
    }

    let buckets: Vec<Bucket> = groups
        .into_iter()
        .map(|(key, group)| {
            let doc_count: u64 = group.iter().map(|(_, c)| c).sum();
            let sub = fold_level(rest, &group);
            let sub = match dim {
                PivotDimension::Presence { .. } => {
                    let mut contacts = AggregationResults::new();
                    contacts.insert(
                        PRESENCE_CONTACTS_AGG.to_string(),
                        AggregationResult::Single { doc_count, sub },
                    );
                    contacts
                }
                _ => sub,
            };
            Bucket {
                key: Value::String(key.to_string()),
                key_as_string: None,
                doc_count,
                sub,
            }
        })
        .collect();
    let value_node = match dim {
        PivotDimension::Presence { .. } => {
            let doc_count: u64 = buckets.iter().map(|b| b.doc_count).sum();
            let mut answers = AggregationResults::new();
            answers.insert(
                PRESENCE_ANSWER_AGG.to_string(),
                AggregationResult::Buckets(buckets),
            );
            let mut form = AggregationResults::new();
            form.insert(
                PRESENCE_FORM_AGG.to_string(),
                AggregationResult::Single {
                    doc_count,
                    sub: answers,
                },
            );
            AggregationResult::Single {
                doc_count,
                sub: form,
            }
        }
        _ => AggregationResult::Buckets(buckets),
    };
    results.insert(dim.name().to_string(), value_node);
    results.insert(
        dim.missing_name(),
        AggregationResult::Single {
            doc_count: missing.iter().map(|(_, c)| c).sum(),
            sub: fold_level(rest, &missing),
        },
    );
    results
}
