//! Decoding of the positional `fields` token list.
//!
//! Requests carry their filters as an ordered list of strings. This module
//! turns that list into typed values once, at the boundary; nothing past
//! [`SearchFilters::decode`] looks at raw positions again.
//!
//! Absent or empty optional tokens mean "no filter". Paging and sort tokens
//! fall back to their defaults when they do not parse. Every other provided
//! token that does not parse is a [`CanvassError::Decode`].

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexSet;

use crate::error::{CanvassError, Result};

use super::age::{AgeCategory, UNKNOWN_AGE_CODE};
use super::dsl::DateExpr;
use super::form::FormFilterSpec;

pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const DEFAULT_SORT_FIELD: &str = "surname";

/// Polling-station value standing for "no polling station recorded".
pub const MISSING_POLLING_STATION: &str = "missing";

/// Email token value requiring an address to be present.
pub const EMAIL_SET: &str = "SET";

/// Token positions.
pub mod position {
    pub const GROUP: usize = 0;
    pub const MODE: usize = 1;
    pub const PAGE_SIZE: usize = 2;
    pub const OFFSET: usize = 3;
    pub const GENDER: usize = 4;
    pub const POLLING_STATION: usize = 5;
    pub const AGE: usize = 6;
    pub const SORT_FIELD: usize = 7;
    pub const SORT_ASC: usize = 8;
    pub const LAST_CHANGE: usize = 9;
    /// Email filter, or the first form filter when it reads as one.
    pub const EMAIL: usize = 10;
    pub const FORMS: usize = 11;
}

/// Parts of the shortest form filter token (`KIND/form_id/must_exist`).
const MIN_FORM_PARTS: usize = 3;

/// Boolean literals accepted by the protocol: `1 t T TRUE true True` and
/// `0 f F FALSE false False`.
pub fn parse_flag(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Which document fields the free-text query is matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchMode {
    Firstname,
    Name,
    Fullname,
    Street,
    All,
    CityAndName,
    CityNameAndStreet,
    Address,
    /// Unrecognised mode: the engine's default field set is used.
    Other(String),
}

impl SearchMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "firstname" => SearchMode::Firstname,
            "name" => SearchMode::Name,
            "fullname" => SearchMode::Fullname,
            "street" => SearchMode::Street,
            "all" => SearchMode::All,
            "city&name" => SearchMode::CityAndName,
            "city&name&street" => SearchMode::CityNameAndStreet,
            "address" => SearchMode::Address,
            other => SearchMode::Other(other.to_string()),
        }
    }

    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            SearchMode::Firstname => &["firstname"],
            SearchMode::Name => &["surname", "married_name"],
            SearchMode::Fullname => &["firstname", "surname", "married_name"],
            SearchMode::Street => &["address.street", "address.city"],
            SearchMode::All => &[
                "surname",
                "firstname",
                "married_name",
                "address.street",
                "address.city",
            ],
            SearchMode::CityAndName => &["address.city", "surname", "married_name"],
            SearchMode::CityNameAndStreet => &[
                "address.city",
                "surname",
                "married_name",
                "address.street",
            ],
            SearchMode::Address => &["address.street", "address.housenumber", "address.city"],
            SearchMode::Other(_) => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub size: usize,
    pub from: usize,
}

impl Default for Paging {
    fn default() -> Self {
        Paging {
            size: DEFAULT_PAGE_SIZE,
            from: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub field: String,
    pub ascending: bool,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder {
            field: DEFAULT_SORT_FIELD.to_string(),
            ascending: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingStationFilter {
    /// Accepted values; `""` means "field present but empty".
    pub values: IndexSet<String>,
    /// The `missing` sentinel was requested.
    pub include_missing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeFilter {
    /// The `0` sentinel was requested.
    pub include_unknown: bool,
    pub categories: Vec<AgeCategory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailFilter {
    Present,
    Absent,
}

/// Typed view of a contact search's `fields` tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchFilters {
    pub group_id: String,
    pub mode: SearchMode,
    pub paging: Paging,
    pub sort: SortOrder,
    pub gender: Option<IndexSet<String>>,
    pub polling_station: Option<PollingStationFilter>,
    pub age: Option<AgeFilter>,
    pub last_change: Option<DateExpr>,
    pub email: Option<EmailFilter>,
    pub forms: Vec<FormFilterSpec>,
}

impl SearchFilters {
    pub fn decode(fields: &[String]) -> Result<Self> {
        Self::decode_with_min(fields, 1)
    }

    /// Like [`decode`](Self::decode), but rejects lists shorter than
    /// `min_len`.
    pub fn decode_with_min(fields: &[String], min_len: usize) -> Result<Self> {
        if fields.len() < min_len.max(1) {
            return Err(CanvassError::Decode(format!(
                "expected at least {} field tokens, got {}",
                min_len.max(1),
                fields.len()
            )));
        }
        let group_id = group_id(fields)?;

        let mode = SearchMode::parse(token(fields, position::MODE).unwrap_or(""));

        let paging = Paging {
            size: parse_or(fields, position::PAGE_SIZE, DEFAULT_PAGE_SIZE),
            from: parse_or(fields, position::OFFSET, 0),
        };

        // fields[7] applies without fields[8]; an absent or unreadable
        // direction is ascending.
        let sort = SortOrder {
            field: token(fields, position::SORT_FIELD)
                .unwrap_or(DEFAULT_SORT_FIELD)
                .to_string(),
            ascending: token(fields, position::SORT_ASC)
                .and_then(parse_flag)
                .unwrap_or(true),
        };

        let gender = token(fields, position::GENDER).map(value_set);

        let polling_station = token(fields, position::POLLING_STATION).map(|raw| {
            let mut values = value_set(raw);
            let include_missing = values.shift_remove(MISSING_POLLING_STATION);
            if include_missing {
                values.insert(String::new());
            }
            PollingStationFilter {
                values,
                include_missing,
            }
        });

        let age = token(fields, position::AGE).map(decode_age).transpose()?;

        let last_change = token(fields, position::LAST_CHANGE)
            .map(decode_last_change)
            .transpose()?;

        let (email, leading_form) = match token(fields, position::EMAIL) {
            Some(raw) => decode_email_or_form(raw)?,
            None => (None, None),
        };

        let mut forms: Vec<FormFilterSpec> = leading_form.into_iter().collect();
        for raw in fields.iter().skip(position::FORMS).filter(|t| !t.is_empty()) {
            forms.push(FormFilterSpec::decode(raw)?);
        }

        Ok(SearchFilters {
            group_id,
            mode,
            paging,
            sort,
            gender,
            polling_station,
            age,
            last_change,
            email,
            forms,
        })
    }
}

/// Tokens of an address lookup: group, bucket count, hits per bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressLookup {
    pub group_id: String,
    pub buckets: usize,
    pub hits_per_bucket: usize,
}

impl AddressLookup {
    pub fn decode(fields: &[String]) -> Result<Self> {
        Ok(AddressLookup {
            group_id: group_id(fields)?,
            buckets: parse_or(fields, position::PAGE_SIZE, DEFAULT_PAGE_SIZE),
            hits_per_bucket: parse_or(fields, position::OFFSET, DEFAULT_PAGE_SIZE),
        })
    }
}

/// Tokens of a proximity lookup: group, result size, optional radius.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyLookup {
    pub group_id: String,
    pub size: usize,
    pub radius_m: Option<f64>,
}

impl NearbyLookup {
    /// Number of hits returned per requested unit of size.
    pub const SIZE_FACTOR: usize = 10;

    pub fn decode(fields: &[String]) -> Result<Self> {
        let size = token(fields, position::PAGE_SIZE)
            .and_then(|t| t.parse::<usize>().ok())
            .map(|n| n.saturating_mul(Self::SIZE_FACTOR))
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let radius_m = token(fields, position::OFFSET)
            .map(|t| {
                t.parse::<f64>()
                    .ok()
                    .filter(|r| r.is_finite() && *r >= 0.0)
                    .ok_or_else(|| {
                        CanvassError::Decode(format!("radius '{}' is not a distance", t))
                    })
            })
            .transpose()?;
        Ok(NearbyLookup {
            group_id: group_id(fields)?,
            size,
            radius_m,
        })
    }
}

fn group_id(fields: &[String]) -> Result<String> {
    token(fields, position::GROUP)
        .map(str::to_string)
        .ok_or_else(|| CanvassError::Decode("missing group id".to_string()))
}

/// Token at `idx`, `None` when absent or empty.
fn token(fields: &[String], idx: usize) -> Option<&str> {
    fields
        .get(idx)
        .map(String::as_str)
        .filter(|t| !t.is_empty())
}

fn parse_or(fields: &[String], idx: usize, default: usize) -> usize {
    token(fields, idx)
        .and_then(|t| t.parse().ok())
        .unwrap_or(default)
}

/// Slash-separated values, deduplicated in request order.
fn value_set(raw: &str) -> IndexSet<String> {
    raw.split('/').map(str::to_string).collect()
}

/// The token at the email position is the email filter when it holds a
/// single value. Otherwise a token long enough to be a form filter is
/// decoded as one; anything else is no filter.
fn decode_email_or_form(raw: &str) -> Result<(Option<EmailFilter>, Option<FormFilterSpec>)> {
    let values = value_set(raw);
    if values.len() == 1 {
        let email = if values.contains(EMAIL_SET) {
            EmailFilter::Present
        } else {
            EmailFilter::Absent
        };
        return Ok((Some(email), None));
    }
    if raw.split('/').count() >= MIN_FORM_PARTS {
        return Ok((None, Some(FormFilterSpec::decode(raw)?)));
    }
    Ok((None, None))
}

fn decode_age(raw: &str) -> Result<AgeFilter> {
    let mut include_unknown = false;
    let mut categories = Vec::new();
    for code in value_set(raw) {
        if code == UNKNOWN_AGE_CODE {
            include_unknown = true;
            continue;
        }
        let cat = AgeCategory::from_code(&code)?;
        if !categories.contains(&cat) {
            categories.push(cat);
        }
    }
    Ok(AgeFilter {
        include_unknown,
        categories,
    })
}

fn decode_last_change(raw: &str) -> Result<DateExpr> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(DateExpr::Instant(ts.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(DateExpr::Day)
        .map_err(|_| {
            CanvassError::Decode(format!(
                "last change bound '{}' is neither a date nor an RFC 3339 timestamp",
                raw
            ))
        })
}
