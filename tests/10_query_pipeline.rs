use std::collections::HashMap;

use serde_json::Value;

use trailhead_api::query::{
    CompareOp, Condition, ListQuery, QueryFeatures, SortDirection, SqlRenderer,
};

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn assemble(pairs: &[(&str, &str)]) -> ListQuery {
    QueryFeatures::new(params(pairs)).into_list_query()
}

#[test]
fn scenario_query_renders_expected_retrieval() {
    // ?duration[gte]=5&difficulty=easy&sort=-price&limit=2&page=1 must select
    // the 2 highest-priced easy tours with duration >= 5.
    let query = assemble(&[
        ("duration[gte]", "5"),
        ("difficulty", "easy"),
        ("sort", "-price"),
        ("limit", "2"),
        ("page", "1"),
    ]);

    assert_eq!(query.limit, 2);
    assert_eq!(query.offset, 0);
    assert_eq!(query.order.len(), 1);
    assert_eq!(query.order[0].column, "price");
    assert_eq!(query.order[0].direction, SortDirection::Desc);

    assert!(query
        .conditions
        .contains(&Condition::new("difficulty", CompareOp::Eq, Value::from("easy"))));
    assert!(query
        .conditions
        .contains(&Condition::new("duration", CompareOp::Gte, Value::from(5))));

    let rendered = SqlRenderer::new("tours").unwrap().select_sql(&query).unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT * FROM \"tours\" WHERE \"difficulty\" = $1 AND \"duration\" >= $2 \
         ORDER BY \"price\" DESC LIMIT 2 OFFSET 0"
    );
}

#[test]
fn stages_commute() {
    let input = params(&[
        ("price[lt]", "1500"),
        ("max_group_size[gte]", "8"),
        ("sort", "-ratings_average,price"),
        ("fields", "name,price,ratings_average"),
        ("page", "2"),
        ("limit", "3"),
    ]);

    // filter -> sort -> project -> paginate
    let a = QueryFeatures::new(input.clone());
    let conditions = a.filter();
    let order = a.sort();
    let select = a.project();
    let (limit, offset) = a.paginate();
    let forward = ListQuery {
        conditions,
        order,
        select,
        limit,
        offset,
    };

    // paginate -> project -> sort -> filter
    let b = QueryFeatures::new(input);
    let (limit, offset) = b.paginate();
    let select = b.project();
    let order = b.sort();
    let conditions = b.filter();
    let backward = ListQuery {
        conditions,
        order,
        select,
        limit,
        offset,
    };

    assert_eq!(forward, backward);
}

#[test]
fn pagination_identity_holds_for_all_combinations() {
    for page in 1..=7i64 {
        for limit in 1..=25i64 {
            let query = assemble(&[
                ("page", &page.to_string()),
                ("limit", &limit.to_string()),
            ]);
            assert_eq!(query.limit, limit);
            assert_eq!(query.offset, (page - 1) * limit);
        }
    }
}

#[test]
fn defaults_page_one_limit_ten() {
    let query = assemble(&[]);
    assert_eq!(query.limit, 10);
    assert_eq!(query.offset, 0);

    // page=0 behaves like a missing page
    let query = assemble(&[("page", "0")]);
    assert_eq!(query.offset, 0);
}

#[test]
fn no_upper_bound_on_limit() {
    let query = assemble(&[("limit", "100000")]);
    assert_eq!(query.limit, 100_000);
}

#[test]
fn reserved_keys_never_become_filters() {
    let query = assemble(&[
        ("page", "2"),
        ("sort", "price"),
        ("limit", "5"),
        ("fields", "name"),
    ]);
    assert!(query.conditions.is_empty());
}

#[test]
fn scoping_composes_with_client_filters() {
    let query = assemble(&[("rating[gte]", "4")]).scoped(Condition::new(
        "tour_id",
        CompareOp::Eq,
        Value::from("5f9f1b9b-0000-0000-0000-000000000000"),
    ));

    let rendered = SqlRenderer::new("reviews").unwrap().select_sql(&query).unwrap();
    // The scope constraint leads, the client filter follows.
    assert!(rendered.sql.contains("\"tour_id\" = $1 AND \"rating\" >= $2"));
}

#[test]
fn hostile_identifiers_never_reach_sql() {
    for key in [
        "price; DROP TABLE tours--",
        "name\"",
        "a b",
        "duration[unknown]",
    ] {
        let query = assemble(&[(key, "1")]);
        assert!(
            SqlRenderer::new("tours").unwrap().select_sql(&query).is_err(),
            "expected rejection for key {:?}",
            key
        );
    }
}
