use canvass::query::compiler::compile;
use canvass::query::dsl::{BoolQuery, DateExpr, Query, Scalar};
use canvass::query::tokens::SortOrder;
use canvass::query::SearchFilters;
use canvass::CanvassError;
use serde_json::{json, Value};

mod common;
use common::{contact, fields, now, Matches};

fn compiled(tokens: &[&str], text: &str) -> BoolQuery {
    compile(&SearchFilters::decode(&fields(tokens)).unwrap(), text)
}

fn matches(tokens: &[&str], doc: &Value) -> bool {
    compiled(tokens, "").matches(doc, now())
}

mod end_to_end {
    use super::*;

    #[test]
    fn test_fullname_search_for_women() {
        let tokens = ["42", "fullname", "50", "0", "F", "", "", "surname", "true"];
        let filters = SearchFilters::decode(&fields(&tokens)).unwrap();
        assert_eq!(filters.paging.size, 50);
        assert_eq!(filters.paging.from, 0);
        assert_eq!(
            filters.sort,
            SortOrder {
                field: "surname".to_string(),
                ascending: true
            }
        );

        let q = compile(&filters, "dupont");
        assert_eq!(
            q.must,
            vec![
                Query::MultiMatch {
                    query: "dupont".to_string(),
                    fields: vec![
                        "firstname".to_string(),
                        "surname".to_string(),
                        "married_name".to_string()
                    ],
                },
                Query::term("group_id", "42"),
                Query::terms("gender", ["F"]),
            ]
        );
        assert!(q.should.is_empty());
        assert!(q.must_not.is_empty());
    }

    #[test]
    fn test_unknown_or_under_18() {
        let q = compiled(&["42", "all", "", "", "", "", "0/1"], "");
        assert_eq!(q.minimum_should_match, Some(1));
        assert_eq!(q.should.len(), 3);

        let unknown = q.should[0].as_bool().expect("unknown-age clause is a bool");
        assert_eq!(unknown.should.len(), 3);
        assert_eq!(unknown.minimum_should_match, Some(2));
        assert_eq!(
            unknown.should,
            vec![
                Query::missing("birthdate"),
                Query::missing("age_category"),
                Query::term("age_category", "0"),
            ]
        );

        assert_eq!(
            q.should[1],
            Query::range(
                "birthdate",
                Some(Scalar::Date(DateExpr::YearsAgo(18))),
                None
            )
        );
        assert_eq!(q.should[1].to_json()["range"]["birthdate"]["gte"], json!("now-18y/d"));
        assert_eq!(q.should[2], Query::terms("age_category", ["1"]));
    }

    #[test]
    fn test_serialized_shape() {
        let q = compiled(&["42", "name", "", "", "F/M"], "Martin");
        assert_eq!(
            Query::from(q).to_json(),
            json!({"bool": {"must": [
                {"multi_match": {
                    "query": "martin",
                    "type": "cross_fields",
                    "operator": "and",
                    "fields": ["surname", "married_name"]
                }},
                {"term": {"group_id": "42"}},
                {"terms": {"gender": ["F", "M"]}}
            ]}})
        );
    }
}

mod short_vectors {
    use super::*;

    const FULL: [&str; 12] = [
        "42",
        "all",
        "20",
        "40",
        "F",
        "12/missing",
        "0/3",
        "firstname",
        "false",
        "2016-01-01",
        "SET",
        "RADIO/7/true",
    ];

    #[test]
    fn test_truncated_equals_explicitly_omitted() {
        for len in 1..FULL.len() {
            let truncated = compiled(&FULL[..len], "");
            let mut padded: Vec<&str> = FULL[..len].to_vec();
            padded.resize(FULL.len(), "");
            assert_eq!(
                truncated,
                compiled(&padded, ""),
                "prefix of length {} differs from its padded form",
                len
            );
        }
    }

    #[test]
    fn test_group_only() {
        let q = compiled(&["42"], "");
        assert_eq!(q.must, vec![Query::MatchAll, Query::term("group_id", "42")]);
    }

    #[test]
    fn test_empty_vector_is_rejected() {
        assert!(matches!(
            SearchFilters::decode(&[]),
            Err(CanvassError::Decode(_))
        ));
    }
}

mod set_membership {
    use super::*;

    #[test]
    fn test_gender() {
        let tokens = ["42", "all", "", "", "F/X"];
        assert!(matches(&tokens, &contact(json!({"gender": "F"}))));
        assert!(matches(&tokens, &contact(json!({"gender": "X"}))));
        assert!(!matches(&tokens, &contact(json!({"gender": "M"}))));
        assert!(!matches(&tokens, &contact(json!({}))));
    }

    #[test]
    fn test_polling_station() {
        let tokens = ["42", "all", "", "", "", "12/14"];
        let at = |ps: &str| contact(json!({"address": {"PollingStation": ps}}));
        assert!(matches(&tokens, &at("12")));
        assert!(matches(&tokens, &at("14")));
        assert!(!matches(&tokens, &at("13")));
        assert!(!matches(&tokens, &contact(json!({"address": {}}))));
    }

    #[test]
    fn test_polling_station_with_missing_sentinel() {
        let tokens = ["42", "all", "", "", "", "12/missing"];
        assert!(matches(
            &tokens,
            &contact(json!({"address": {"PollingStation": "12"}}))
        ));
        assert!(matches(&tokens, &contact(json!({"address": {}}))));
        assert!(matches(&tokens, &contact(json!({}))));
        assert!(!matches(
            &tokens,
            &contact(json!({"address": {"PollingStation": "13"}}))
        ));
    }

    #[test]
    fn test_age_category() {
        // No birthdate: only the stored category can match.
        let tokens = ["42", "all", "", "", "", "", "2/3"];
        let aged = |code: &str| contact(json!({"age_category": code}));
        assert!(matches(&tokens, &aged("2")));
        assert!(matches(&tokens, &aged("3")));
        assert!(!matches(&tokens, &aged("4")));
    }

    #[test]
    fn test_unknown_age_needs_two_signals() {
        let tokens = ["42", "all", "", "", "", "", "0"];
        assert!(matches(&tokens, &contact(json!({}))));
        assert!(matches(&tokens, &contact(json!({"age_category": "0"}))));
        assert!(!matches(&tokens, &contact(json!({"age_category": "5"}))));
        assert!(!matches(
            &tokens,
            &contact(json!({"birthdate": "1980-01-01", "age_category": "0"}))
        ));
    }

    #[test]
    fn test_other_tenant_never_matches() {
        let mut doc = contact(json!({"gender": "F"}));
        doc["group_id"] = json!("43");
        assert!(!matches(&["42", "all", "", "", "F"], &doc));
    }

    #[test]
    fn test_email_presence() {
        let with_mail = contact(json!({"mail": "j.dupont@example.org"}));
        let without = contact(json!({}));
        let present = ["42", "all", "", "", "", "", "", "", "", "", "SET"];
        let absent = ["42", "all", "", "", "", "", "", "", "", "", "UNSET"];
        assert!(matches(&present, &with_mail));
        assert!(!matches(&present, &without));
        assert!(matches(&absent, &without));
        assert!(!matches(&absent, &with_mail));
    }

    #[test]
    fn test_last_change_since() {
        let tokens = ["42", "all", "", "", "", "", "", "", "", "2016-03-01"];
        assert!(matches(
            &tokens,
            &contact(json!({"lastchange": "2016-03-01T08:00:00Z"}))
        ));
        assert!(!matches(
            &tokens,
            &contact(json!({"lastchange": "2016-02-29T23:59:59Z"}))
        ));
    }

    #[test]
    fn test_free_text_spans_fields() {
        let q = compiled(&["42", "fullname"], "jeanne dupont");
        assert!(q.matches(&contact(json!({})), now()));
        let q = compiled(&["42", "fullname"], "jeanne martin");
        assert!(!q.matches(&contact(json!({})), now()));
    }
}

mod age_boundaries {
    use super::*;

    fn born(day: &str) -> Value {
        contact(json!({ "birthdate": day }))
    }

    // now() is 2024-06-15: exactly 18 years ago is 2006-06-15.
    #[test]
    fn test_eighteenth_birthday_is_in_both_buckets() {
        let under_18 = ["42", "all", "", "", "", "", "1"];
        let from_18 = ["42", "all", "", "", "", "", "2"];
        assert!(matches(&under_18, &born("2006-06-15")));
        assert!(matches(&from_18, &born("2006-06-15")));
    }

    #[test]
    fn test_neighbouring_days() {
        let under_18 = ["42", "all", "", "", "", "", "1"];
        let from_18 = ["42", "all", "", "", "", "", "2"];
        assert!(matches(&under_18, &born("2006-06-16")));
        assert!(!matches(&from_18, &born("2006-06-16")));
        assert!(!matches(&under_18, &born("2006-06-14")));
        assert!(matches(&from_18, &born("2006-06-14")));
    }

    #[test]
    fn test_over_65_is_open_ended() {
        let over_65 = ["42", "all", "", "", "", "", "6"];
        assert!(matches(&over_65, &born("1920-01-01")));
        assert!(matches(&over_65, &born("1959-06-15")));
        assert!(!matches(&over_65, &born("1959-06-16")));
    }

    #[test]
    fn test_unsupported_code() {
        let err = SearchFilters::decode(&fields(&["42", "all", "", "", "", "", "7"])).unwrap_err();
        assert!(matches!(err, CanvassError::UnsupportedValue(_)));
    }
}

mod forms {
    use super::*;

    fn answers(items: Value) -> Value {
        contact(json!({ "formdatas": items }))
    }

    fn with_form(token: &str, doc: &Value) -> bool {
        let tokens = ["42", "all", "", "", "", "", "", "", "", "", "", token];
        matches(&tokens, doc)
    }

    #[test]
    fn test_arity_3_any_answer() {
        let answered = answers(json!([{"form_id": 7, "form_ref_id": 70, "data": "oui"}]));
        let other_form = answers(json!([{"form_id": 8, "form_ref_id": 80, "data": "oui"}]));
        let none = contact(json!({}));

        assert!(with_form("RADIO/7/true", &answered));
        assert!(!with_form("RADIO/7/true", &other_form));
        assert!(!with_form("RADIO/7/true", &none));

        assert!(!with_form("RADIO/7/false", &answered));
        assert!(with_form("RADIO/7/false", &other_form));
        assert!(with_form("RADIO/7/false", &none));
    }

    #[test]
    fn test_arity_4_option() {
        let picked = answers(json!([{"form_id": 7, "form_ref_id": 70, "data": "x"}]));
        let other = answers(json!([{"form_id": 7, "form_ref_id": 71, "data": "x"}]));

        assert!(with_form("CHECKBOX/7/true/70", &picked));
        assert!(!with_form("CHECKBOX/7/true/70", &other));
        assert!(!with_form("CHECKBOX/7/false/70", &picked));
        assert!(with_form("CHECKBOX/7/false/70", &other));
        assert!(with_form("CHECKBOX/7/false/70", &contact(json!({}))));
    }

    #[test]
    fn test_arity_5_value_is_nested() {
        let yes = answers(json!([{"form_id": 7, "form_ref_id": 70, "data": "oui"}]));
        let no = answers(json!([{"form_id": 7, "form_ref_id": 70, "data": "non"}]));
        // "oui" was answered, but for another question.
        let crossed = answers(json!([
            {"form_id": 7, "form_ref_id": 70, "data": "non"},
            {"form_id": 7, "form_ref_id": 71, "data": "oui"}
        ]));

        assert!(with_form("RADIO/7/true/70/oui", &yes));
        assert!(!with_form("RADIO/7/true/70/oui", &no));
        assert!(!with_form("RADIO/7/true/70/oui", &crossed));

        assert!(!with_form("RADIO/7/false/70/oui", &yes));
        assert!(with_form("RADIO/7/false/70/oui", &no));
        assert!(with_form("RADIO/7/false/70/oui", &crossed));
        assert!(with_form("RADIO/7/false/70/oui", &contact(json!({}))));
    }

    #[test]
    fn test_arity_5_text_matches_words() {
        let doc = answers(json!([{"form_id": 3, "form_ref_id": 30, "data": "Un grand jardin"}]));
        assert!(with_form("TEXT/3/true/30/Jardin", &doc));
        assert!(!with_form("TEXT/3/true/30/potager", &doc));
    }

    #[test]
    fn test_arity_5_date_covers_the_day() {
        // 2016-03-01T00:00:00Z
        let start = 1_456_790_400_000_i64;
        let at = |ms: i64| answers(json!([{"form_id": 5, "form_ref_id": 50, "data": ms}]));
        let token = "DATE/5/true/50/2016-03-01T00:00:00Z";
        assert!(with_form(token, &at(start)));
        assert!(with_form(token, &at(start + 15 * 3_600_000)));
        assert!(!with_form(token, &at(start + 86_400_000)));
    }

    #[test]
    fn test_arity_6_range() {
        let at = |n: i64| answers(json!([{"form_id": 9, "form_ref_id": 90, "data": n}]));
        assert!(with_form("RANGE/9/true/90/18/30", &at(18)));
        assert!(with_form("RANGE/9/true/90/18/30", &at(30)));
        assert!(!with_form("RANGE/9/true/90/18/30", &at(31)));

        assert!(!with_form("RANGE/9/false/90/18/30", &at(25)));
        assert!(with_form("RANGE/9/false/90/18/30", &at(40)));
        assert!(with_form("RANGE/9/false/90/18/30", &contact(json!({}))));
    }

    #[test]
    fn test_form_at_email_position() {
        let answered = answers(json!([{"form_id": 7, "form_ref_id": 70, "data": "oui"}]));
        let none = contact(json!({}));
        let at_ten = |token: &str, doc: &Value| {
            matches(&["42", "all", "", "", "", "", "", "", "", "", token], doc)
        };

        assert!(at_ten("RADIO/7/true", &answered));
        assert!(!at_ten("RADIO/7/true", &none));
        assert!(at_ten("TEXT/7/true/70/Oui", &answered));

        // a single value is still the email filter
        assert!(at_ten("NOTSET", &none));
        assert!(!at_ten("SET", &none));
    }

    #[test]
    fn test_malformed_tokens() {
        for token in [
            "RADIO/7",
            "RADIO/7/maybe",
            "RADIO/x/true",
            "RANGE/9/true/90/a/b",
            "RADIO/7/true/70/a/b/c",
        ] {
            let tokens = ["42", "all", "", "", "", "", "", "", "", "", "", token];
            match SearchFilters::decode(&fields(&tokens)) {
                Err(CanvassError::Decode(_)) => {}
                other => panic!("Expected decode error for '{}', got {:?}", token, other),
            }
        }
    }
}
