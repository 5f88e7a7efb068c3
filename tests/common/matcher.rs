//! In-memory evaluation of a compiled query against one JSON document.
//!
//! Follows the engine's matching rules closely enough to check compiled
//! queries without a running engine:
//!
//! - dotted paths flatten through arrays of objects; `null` is no value
//! - a `strictdata` segment on a scalar reads the scalar itself (keyword
//!   sub-field)
//! - term-level clauses compare exactly, except on analysed text fields
//!   where they compare against lower-cased tokens
//! - date ranges round `/d` expressions and bare days down for `gte` and up
//!   to the end of the day for `lte`
//! - a bool query without an explicit `minimum_should_match` needs one
//!   `should` clause only when it has no `must`/`filter` clause
#![allow(dead_code)]

use canvass::query::dsl::{BoolQuery, DateExpr, Query, Scalar};
use canvass::query::form::DATA_FIELD;
use chrono::{DateTime, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::{Map, Value};

use super::geo::{haversine, parse_location, point_in_polygon};

/// Fields indexed as analysed text (term clauses see lower-cased tokens).
const ANALYZED_FIELDS: &[&str] = &[DATA_FIELD];

/// Keyword sub-field name of multi-fields.
const STRICT_SUBFIELD: &str = "strictdata";

pub trait Matches {
    /// Whether `doc` matches, with date math resolved against `now`.
    fn matches(&self, doc: &Value, now: DateTime<Utc>) -> bool;
}

impl Matches for Query {
    fn matches(&self, doc: &Value, now: DateTime<Utc>) -> bool {
        match self {
            Query::MatchAll => true,
            Query::MultiMatch { query, fields } => multi_match(doc, query, fields),
            Query::Term { field, value } => {
                let analyzed = ANALYZED_FIELDS.contains(&field.as_str());
                values_at(doc, field)
                    .iter()
                    .any(|v| value_equals(v, value, analyzed, now))
            }
            Query::Terms { field, values } => {
                let analyzed = ANALYZED_FIELDS.contains(&field.as_str());
                values_at(doc, field).iter().any(|v| {
                    values
                        .iter()
                        .any(|s| value_equals(v, s, analyzed, now))
                })
            }
            Query::Range { field, gte, lte } => values_at(doc, field)
                .iter()
                .any(|v| in_range(v, gte.as_ref(), lte.as_ref(), now)),
            Query::Missing { field } => values_at(doc, field).is_empty(),
            Query::Nested { path, query } => nested_elements(doc, path)
                .into_iter()
                .any(|elem| query.matches(&scoped(path, elem), now)),
            Query::GeoPolygon { field, points } => values_at(doc, field)
                .iter()
                .filter_map(|v| parse_location(v))
                .any(|p| point_in_polygon(&p, points)),
            Query::GeoDistance {
                field,
                center,
                distance_m,
            } => values_at(doc, field)
                .iter()
                .filter_map(|v| parse_location(v))
                .any(|p| haversine(center.lat, center.lng, p.lat, p.lng) <= *distance_m),
            Query::Bool(b) => b.matches(doc, now),
        }
    }
}

impl Matches for BoolQuery {
    fn matches(&self, doc: &Value, now: DateTime<Utc>) -> bool {
        if !self.must.iter().all(|q| q.matches(doc, now)) {
            return false;
        }
        if !self.filter.iter().all(|q| q.matches(doc, now)) {
            return false;
        }
        if self.must_not.iter().any(|q| q.matches(doc, now)) {
            return false;
        }
        let required = match self.minimum_should_match {
            Some(n) => n as usize,
            None if !self.should.is_empty() && self.must.is_empty() && self.filter.is_empty() => 1,
            None => 0,
        };
        if required == 0 {
            return true;
        }
        self.should.iter().filter(|q| q.matches(doc, now)).count() >= required
    }
}

/// All non-null leaf values at a dotted `path`.
pub fn values_at<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for v in current {
            collect_segment(v, segment, &mut next);
        }
        current = next;
    }
    let mut leaves = Vec::new();
    for v in current {
        flatten_into(v, &mut leaves);
    }
    leaves
}

fn collect_segment<'a>(v: &'a Value, segment: &str, out: &mut Vec<&'a Value>) {
    match v {
        Value::Object(obj) => {
            if let Some(child) = obj.get(segment) {
                out.push(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_segment(item, segment, out);
            }
        }
        Value::Null => {}
        scalar if segment == STRICT_SUBFIELD => out.push(scalar),
        _ => {}
    }
}

fn flatten_into<'a>(v: &'a Value, out: &mut Vec<&'a Value>) {
    match v {
        Value::Null => {}
        Value::Array(items) if !is_coordinate_pair(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        other => out.push(other),
    }
}

/// `[lon, lat]` arrays are one geo value, not two numbers.
fn is_coordinate_pair(items: &[Value]) -> bool {
    items.len() == 2 && items.iter().all(Value::is_f64)
}

fn nested_elements<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut elements = Vec::new();
    for v in values_at(doc, path) {
        if v.is_object() {
            elements.push(v);
        }
    }
    elements
}

/// A document holding only `elem` at `path`.
fn scoped(path: &str, elem: &Value) -> Value {
    path.rsplit('.').fold(elem.clone(), |inner, segment| {
        let mut obj = Map::new();
        obj.insert(segment.to_string(), inner);
        Value::Object(obj)
    })
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn multi_match(doc: &Value, query: &str, fields: &[String]) -> bool {
    let mut haystack: Vec<String> = Vec::new();
    if fields.is_empty() {
        collect_text(doc, &mut haystack);
    } else {
        for field in fields {
            for v in values_at(doc, field) {
                haystack.extend(tokens(&scalar_text(v)));
            }
        }
    }
    let mut wanted = tokens(query).peekable();
    if wanted.peek().is_none() {
        return false;
    }
    wanted.all(|t| haystack.contains(&t))
}

fn collect_text(v: &Value, out: &mut Vec<String>) {
    match v {
        Value::Object(obj) => obj.values().for_each(|c| collect_text(c, out)),
        Value::Array(items) => items.iter().for_each(|c| collect_text(c, out)),
        Value::String(s) => out.extend(tokens(s)),
        _ => {}
    }
}

fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_equals(v: &Value, expected: &Scalar, analyzed: bool, now: DateTime<Utc>) -> bool {
    match expected {
        Scalar::Text(s) => match v {
            Value::String(actual) if analyzed => tokens(actual).any(|t| &t == s),
            Value::String(actual) => actual == s,
            Value::Number(n) => n.to_string() == *s,
            Value::Bool(b) => b.to_string() == *s,
            _ => false,
        },
        Scalar::Integer(i) => match v {
            Value::Number(n) => n.as_f64() == Some(*i as f64),
            Value::String(actual) => actual.trim().parse::<i64>().ok() == Some(*i),
            _ => false,
        },
        Scalar::Date(expr) => {
            let lo = resolve_date(expr, now, Rounding::Down);
            let hi = resolve_date(expr, now, Rounding::Up);
            doc_millis(v).is_some_and(|m| m >= lo && m <= hi)
        }
    }
}

#[derive(Clone, Copy)]
enum Rounding {
    Down,
    Up,
}

fn in_range(v: &Value, gte: Option<&Scalar>, lte: Option<&Scalar>, now: DateTime<Utc>) -> bool {
    let lower_ok = gte.map_or(true, |bound| {
        compare(v, bound, now, Rounding::Down).is_some_and(|o| o.is_ge())
    });
    let upper_ok = lte.map_or(true, |bound| {
        compare(v, bound, now, Rounding::Up).is_some_and(|o| o.is_le())
    });
    lower_ok && upper_ok
}

/// Orders a document value against a range bound.
fn compare(
    v: &Value,
    bound: &Scalar,
    now: DateTime<Utc>,
    rounding: Rounding,
) -> Option<std::cmp::Ordering> {
    match bound {
        Scalar::Integer(i) => {
            let actual = match v {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => match s.trim().parse::<f64>() {
                    Ok(f) => f,
                    Err(_) => doc_millis(v)? as f64,
                },
                _ => return None,
            };
            actual.partial_cmp(&(*i as f64))
        }
        Scalar::Date(expr) => {
            let bound = resolve_date(expr, now, rounding);
            Some(doc_millis(v)?.cmp(&bound))
        }
        Scalar::Text(s) => {
            if let Some(expr) = parse_date_text(s) {
                let bound = resolve_date(&expr, now, rounding);
                return Some(doc_millis(v)?.cmp(&bound));
            }
            match v {
                Value::String(actual) => Some(actual.as_str().cmp(s.as_str())),
                Value::Number(n) => n.as_f64()?.partial_cmp(&s.parse::<f64>().ok()?),
                _ => None,
            }
        }
    }
}

fn parse_date_text(s: &str) -> Option<DateExpr> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(DateExpr::Instant(ts.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(DateExpr::Day)
}

/// Epoch milliseconds of a stored date (RFC 3339, `YYYY-MM-DD` or a number
/// of milliseconds).
fn doc_millis(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => match parse_date_text(s)? {
            DateExpr::Instant(ts) => Some(ts.timestamp_millis()),
            DateExpr::Day(day) => Some(start_of(day).timestamp_millis()),
            _ => None,
        },
        _ => None,
    }
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
}

fn resolve_date(expr: &DateExpr, now: DateTime<Utc>, rounding: Rounding) -> i64 {
    let day = match expr {
        DateExpr::Instant(ts) => return ts.timestamp_millis(),
        DateExpr::Today => now.date_naive(),
        DateExpr::YearsAgo(years) => {
            let today = now.date_naive();
            today
                .checked_sub_months(Months::new(12 * years))
                .unwrap_or(NaiveDate::MIN)
        }
        DateExpr::Day(day) => *day,
    };
    let start = start_of(day);
    match rounding {
        Rounding::Down => start.timestamp_millis(),
        Rounding::Up => (start + Duration::days(1)).timestamp_millis() - 1,
    }
}
