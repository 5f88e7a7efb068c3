//! Custom-form filters.
//!
//! A form filter token is `KIND/form_id/must_exist[/form_ref_id[/value[/value2]]]`.
//! Its arity decides what is matched:
//!
//! | parts | matches                                                        |
//! |-------|----------------------------------------------------------------|
//! | 3     | any answer recorded for `form_id`                              |
//! | 4     | an answer for the option `form_ref_id`                         |
//! | 5     | an answer for `form_ref_id` equal to `value` (nested)          |
//! | 6     | an answer for `form_ref_id` within `[value, value2]` (nested)  |
//!
//! With `must_exist=false` each shape is negated so that contacts with no
//! answer at all also match.

use chrono::DateTime;

use crate::error::{CanvassError, Result};

use super::dsl::{BoolQuery, Query, Scalar};
use super::tokens::parse_flag;

pub const FORMDATAS_PATH: &str = "formdatas";
pub const FORM_ID_FIELD: &str = "formdatas.form_id";
pub const FORM_REF_ID_FIELD: &str = "formdatas.form_ref_id";
pub const DATA_FIELD: &str = "formdatas.data";
pub const STRICT_DATA_FIELD: &str = "formdatas.data.strictdata";

/// A DATE answer matches the whole day: `[start, start + 86399000ms]`.
pub const DAY_SPAN_MS: i64 = 86_399_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Text,
    Radio,
    Checkbox,
    Range,
    Date,
}

impl FormKind {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "TEXT" => Ok(FormKind::Text),
            "RADIO" => Ok(FormKind::Radio),
            "CHECKBOX" => Ok(FormKind::Checkbox),
            "RANGE" => Ok(FormKind::Range),
            "DATE" => Ok(FormKind::Date),
            other => Err(CanvassError::Decode(format!(
                "unknown form kind '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    Integer(i64),
    /// Epoch milliseconds, whole seconds.
    Millis(i64),
}

impl FormValue {
    fn parse(kind: FormKind, raw: &str, token: &str) -> Result<Self> {
        match kind {
            FormKind::Date => {
                let ts = DateTime::parse_from_rfc3339(raw).map_err(|e| {
                    CanvassError::Decode(format!(
                        "form filter '{}': '{}' is not an RFC 3339 date ({})",
                        token, raw, e
                    ))
                })?;
                Ok(FormValue::Millis(ts.timestamp() * 1000))
            }
            FormKind::Range => raw.parse::<i64>().map(FormValue::Integer).map_err(|_| {
                CanvassError::Decode(format!(
                    "form filter '{}': '{}' is not an integer",
                    token, raw
                ))
            }),
            FormKind::Text | FormKind::Radio | FormKind::Checkbox => {
                Ok(FormValue::Text(raw.to_string()))
            }
        }
    }

    fn to_scalar(&self) -> Scalar {
        match self {
            FormValue::Text(s) => Scalar::Text(s.clone()),
            FormValue::Integer(i) | FormValue::Millis(i) => Scalar::Integer(*i),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormCriterion {
    Answered,
    Option {
        form_ref_id: i64,
    },
    Value {
        form_ref_id: i64,
        value: FormValue,
    },
    Range {
        form_ref_id: i64,
        low: FormValue,
        high: FormValue,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormFilterSpec {
    pub kind: FormKind,
    pub form_id: i64,
    pub must_exist: bool,
    pub criterion: FormCriterion,
}

impl FormFilterSpec {
    pub fn decode(token: &str) -> Result<Self> {
        let parts: Vec<&str> = token.split('/').collect();
        if !(3..=6).contains(&parts.len()) {
            return Err(CanvassError::Decode(format!(
                "form filter '{}' has {} parts, expected 3 to 6",
                token,
                parts.len()
            )));
        }

        let kind = FormKind::parse(parts[0])?;
        let form_id = parse_int(parts[1], token)?;
        let must_exist = parse_flag(parts[2]).ok_or_else(|| {
            CanvassError::Decode(format!(
                "form filter '{}': '{}' is not a boolean",
                token, parts[2]
            ))
        })?;

        let criterion = match parts.len() {
            3 => FormCriterion::Answered,
            4 => FormCriterion::Option {
                form_ref_id: parse_int(parts[3], token)?,
            },
            5 => FormCriterion::Value {
                form_ref_id: parse_int(parts[3], token)?,
                value: FormValue::parse(kind, parts[4], token)?,
            },
            _ => FormCriterion::Range {
                form_ref_id: parse_int(parts[3], token)?,
                low: FormValue::parse(kind, parts[4], token)?,
                high: FormValue::parse(kind, parts[5], token)?,
            },
        };

        Ok(FormFilterSpec {
            kind,
            form_id,
            must_exist,
            criterion,
        })
    }

    pub fn to_query(&self) -> Query {
        match &self.criterion {
            FormCriterion::Answered => {
                presence_clause(FORM_ID_FIELD, self.form_id, self.must_exist)
            }
            FormCriterion::Option { form_ref_id } => {
                presence_clause(FORM_REF_ID_FIELD, *form_ref_id, self.must_exist)
            }
            FormCriterion::Value { form_ref_id, value } => {
                answer_clause(*form_ref_id, self.value_match(value), self.must_exist)
            }
            FormCriterion::Range {
                form_ref_id,
                low,
                high,
            } => {
                let matcher = Query::range(
                    STRICT_DATA_FIELD,
                    Some(low.to_scalar()),
                    Some(high.to_scalar()),
                );
                answer_clause(*form_ref_id, matcher, self.must_exist)
            }
        }
    }

    fn value_match(&self, value: &FormValue) -> Query {
        match (self.kind, value) {
            (FormKind::Date, FormValue::Millis(start)) => Query::range(
                STRICT_DATA_FIELD,
                Some(Scalar::Integer(*start)),
                Some(Scalar::Integer(start + DAY_SPAN_MS)),
            ),
            (FormKind::Text, FormValue::Text(text)) => Query::terms(DATA_FIELD, text_terms(text)),
            _ => Query::terms(STRICT_DATA_FIELD, [value.to_scalar()]),
        }
    }
}

fn parse_int(raw: &str, token: &str) -> Result<i64> {
    raw.parse::<i64>().map_err(|_| {
        CanvassError::Decode(format!(
            "form filter '{}': '{}' is not an integer",
            token, raw
        ))
    })
}

/// Lower-cased, space-separated words of a TEXT answer; empty words dropped.
pub fn text_terms(text: &str) -> Vec<String> {
    text.split(' ')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// 3- and 4-part shapes: `field` holds `id`, or (negated) no answer exists
/// or the recorded answers are not `id`.
fn presence_clause(field: &str, id: i64, must_exist: bool) -> Query {
    if must_exist {
        return Query::terms(field, [id]);
    }
    BoolQuery::new()
        .should(Query::missing(FORM_REF_ID_FIELD))
        .should(BoolQuery::new().must_not(Query::term(field, id)))
        .minimum_should_match(1)
        .into()
}

/// 5- and 6-part shapes, scoped to one answer sub-document.
fn answer_clause(form_ref_id: i64, matcher: Query, must_exist: bool) -> Query {
    if must_exist {
        let answer = BoolQuery::new()
            .must(Query::term(FORM_REF_ID_FIELD, form_ref_id))
            .must(matcher);
        return Query::nested(FORMDATAS_PATH, answer.into());
    }

    let mismatching_answer = BoolQuery::new()
        .should(Query::missing(FORM_REF_ID_FIELD))
        .should(
            BoolQuery::new()
                .must_not(matcher)
                .must(Query::term(FORM_REF_ID_FIELD, form_ref_id)),
        )
        .minimum_should_match(1);

    BoolQuery::new()
        .should(Query::nested(FORMDATAS_PATH, mismatching_answer.into()))
        .should(BoolQuery::new().must_not(Query::term(FORM_REF_ID_FIELD, form_ref_id)))
        .minimum_should_match(1)
        .into()
}
