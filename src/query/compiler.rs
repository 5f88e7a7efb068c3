//! Contact query compiler.
//!
//! Turns decoded [`SearchFilters`] plus the free-text query into one bool
//! query: the text clause and the tenant pin are always `must`, each
//! provided filter adds its clause in a fixed order, and age filtering adds
//! `should` clauses under an outer `minimum_should_match = 1`.

use super::dsl::{BoolQuery, Query, Scalar};
use super::geo::GeoPoint;
use super::tokens::{AgeFilter, EmailFilter, PollingStationFilter, SearchFilters, SearchMode};
use super::age::UNKNOWN_AGE_CODE;

pub const GROUP_FIELD: &str = "group_id";
pub const GENDER_FIELD: &str = "gender";
pub const POLLING_STATION_FIELD: &str = "address.PollingStation";
pub const BIRTHDATE_FIELD: &str = "birthdate";
pub const AGE_CATEGORY_FIELD: &str = "age_category";
pub const LAST_CHANGE_FIELD: &str = "lastchange";
pub const MAIL_FIELD: &str = "mail";
pub const PHONE_FIELD: &str = "phone";
pub const LOCATION_FIELD: &str = "address.location";

/// Compiles a contact search.
pub fn compile(filters: &SearchFilters, text: &str) -> BoolQuery {
    let mut q = BoolQuery::new()
        .must(text_clause(&filters.mode, text))
        .must(tenant_clause(&filters.group_id));

    if let Some(genders) = &filters.gender {
        q = q.must(Query::terms(GENDER_FIELD, genders));
    }
    if let Some(ps) = &filters.polling_station {
        q = q.must(polling_station_clause(ps));
    }
    if let Some(age) = &filters.age {
        q = apply_age(q, age);
    }
    if let Some(since) = &filters.last_change {
        q = q.must(Query::range(
            LAST_CHANGE_FIELD,
            Some(Scalar::Date(since.clone())),
            None,
        ));
    }
    match filters.email {
        Some(EmailFilter::Present) => q = q.must_not(Query::missing(MAIL_FIELD)),
        Some(EmailFilter::Absent) => q = q.must(Query::missing(MAIL_FIELD)),
        None => {}
    }
    for form in &filters.forms {
        q = q.must(form.to_query());
    }

    tracing::debug!(
        group_id = %filters.group_id,
        forms = filters.forms.len(),
        "compiled contact query"
    );
    q
}

/// Free text over the mode's fields, or match-all when there is none.
pub fn text_clause(mode: &SearchMode, text: &str) -> Query {
    if text.trim().is_empty() {
        return Query::MatchAll;
    }
    Query::MultiMatch {
        query: text.to_lowercase(),
        fields: mode.fields().iter().map(|f| f.to_string()).collect(),
    }
}

/// Multi-tenancy boundary; present in every contact query.
pub fn tenant_clause(group_id: &str) -> Query {
    Query::term(GROUP_FIELD, group_id)
}

/// Geo-polygon constraint on `field`.
pub fn polygon_clause(field: &str, polygon: &[GeoPoint]) -> Query {
    Query::GeoPolygon {
        field: field.to_string(),
        points: polygon.to_vec(),
    }
}

fn polling_station_clause(ps: &PollingStationFilter) -> Query {
    let values = Query::terms(POLLING_STATION_FIELD, &ps.values);
    if !ps.include_missing {
        return values;
    }
    BoolQuery::new()
        .should(Query::missing(POLLING_STATION_FIELD))
        .should(values)
        .minimum_should_match(1)
        .into()
}

fn apply_age(mut q: BoolQuery, age: &AgeFilter) -> BoolQuery {
    if age.include_unknown {
        q = q.should(
            BoolQuery::new()
                .should(Query::missing(BIRTHDATE_FIELD))
                .should(Query::missing(AGE_CATEGORY_FIELD))
                .should(Query::term(AGE_CATEGORY_FIELD, UNKNOWN_AGE_CODE))
                .minimum_should_match(2),
        );
    }
    for cat in &age.categories {
        let (gte, lte) = cat.birthdate_bounds();
        q = q.should(Query::range(
            BIRTHDATE_FIELD,
            gte.map(Scalar::Date),
            lte.map(Scalar::Date),
        ));
    }
    if !age.categories.is_empty() {
        let codes: Vec<String> = age.categories.iter().map(|c| c.code().to_string()).collect();
        q = q.should(Query::terms(AGE_CATEGORY_FIELD, codes));
    }
    q.minimum_should_match(1)
}
