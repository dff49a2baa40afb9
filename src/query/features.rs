use std::collections::HashMap;

use serde_json::Value;

use super::types::{CompareOp, Condition, ListQuery, SortDirection, SortKey};

/// Keys that drive the sort/projection/pagination stages rather than the
/// filter stage.
pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;

/// Translates an untrusted query-string map into a bounded retrieval request.
///
/// The four stages are independent transformations over the same input map;
/// applying them in any order produces the same `ListQuery`. Nothing here
/// touches the database - the renderer and repository do that later.
pub struct QueryFeatures {
    params: HashMap<String, String>,
    default_sort: SortKey,
}

impl QueryFeatures {
    pub fn new(params: HashMap<String, String>) -> Self {
        Self {
            params,
            // Newest first when the client does not ask otherwise.
            default_sort: SortKey {
                column: "created_at".to_string(),
                direction: SortDirection::Desc,
            },
        }
    }

    /// Filter stage: every non-reserved key becomes a constraint. Keys of the
    /// form `field[op]` with op in {gte, gt, lte, lt} become comparisons; bare
    /// keys become equality. Unrecognized bracket operators are carried
    /// through unchanged and rejected downstream as invalid identifiers.
    pub fn filter(&self) -> Vec<Condition> {
        let mut conditions: Vec<Condition> = self
            .params
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| match split_operator_key(key) {
                Some((field, op)) => Condition::new(field, op, coerce_value(value)),
                None => Condition::new(key.clone(), CompareOp::Eq, coerce_value(value)),
            })
            .collect();

        // HashMap iteration order is arbitrary; keep the rendered SQL stable.
        conditions.sort_by(|a, b| a.column.cmp(&b.column));
        conditions
    }

    /// Sort stage: comma-separated field list, `-` prefix for descending.
    pub fn sort(&self) -> Vec<SortKey> {
        match self.params.get("sort") {
            Some(spec) => spec
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty() && *part != "-")
                .map(|part| match part.strip_prefix('-') {
                    Some(column) => SortKey {
                        column: column.to_string(),
                        direction: SortDirection::Desc,
                    },
                    None => SortKey {
                        column: part.to_string(),
                        direction: SortDirection::Asc,
                    },
                })
                .collect(),
            None => vec![self.default_sort.clone()],
        }
    }

    /// Projection stage: comma-separated allow-list. `id` always rides along;
    /// empty result means all columns.
    pub fn project(&self) -> Vec<String> {
        match self.params.get("fields") {
            Some(spec) => {
                let mut fields: Vec<String> = spec
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect();
                if !fields.is_empty() && !fields.iter().any(|f| f == "id") {
                    fields.insert(0, "id".to_string());
                }
                fields
            }
            None => vec![],
        }
    }

    /// Pagination stage: `skip = (page - 1) * limit`. Missing or
    /// non-positive values fall back to the defaults; no upper bound is
    /// enforced on `limit`.
    pub fn paginate(&self) -> (i64, i64) {
        let page = positive_or(self.params.get("page"), DEFAULT_PAGE);
        let limit = positive_or(self.params.get("limit"), DEFAULT_LIMIT);
        (limit, (page - 1) * limit)
    }

    pub fn into_list_query(self) -> ListQuery {
        let (limit, offset) = self.paginate();
        ListQuery {
            conditions: self.filter(),
            order: self.sort(),
            select: self.project(),
            limit,
            offset,
        }
    }
}

fn positive_or(raw: Option<&String>, default: i64) -> i64 {
    raw.and_then(|v| v.parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// Split `duration[gte]` into `("duration", Gte)`. Returns None for bare keys
/// and for bracket operators outside the recognized set, which then flow
/// through the filter stage as-is.
fn split_operator_key(key: &str) -> Option<(String, CompareOp)> {
    let open = key.find('[')?;
    let suffix = key.strip_suffix(']')?;
    let op = CompareOp::from_suffix(&suffix[open + 1..])?;
    Some((key[..open].to_string(), op))
}

/// Query-string values are all strings; bind numerics and booleans as their
/// own types so comparisons against numeric columns stay well-typed.
fn coerce_value(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn filter_translates_bracket_operators() {
        let features = QueryFeatures::new(params(&[
            ("duration[gte]", "5"),
            ("difficulty", "easy"),
            ("page", "2"),
        ]));

        let conditions = features.filter();
        assert_eq!(conditions.len(), 2);
        assert_eq!(
            conditions[0],
            Condition::new("difficulty", CompareOp::Eq, Value::from("easy"))
        );
        assert_eq!(
            conditions[1],
            Condition::new("duration", CompareOp::Gte, Value::from(5))
        );
    }

    #[test]
    fn unrecognized_operator_keys_pass_through() {
        let features = QueryFeatures::new(params(&[("duration[near]", "5")]));
        let conditions = features.filter();
        // The whole key survives; identifier validation rejects it downstream.
        assert_eq!(conditions[0].column, "duration[near]");
        assert_eq!(conditions[0].op, CompareOp::Eq);
    }

    #[test]
    fn sort_parses_direction_prefixes() {
        let features = QueryFeatures::new(params(&[("sort", "-price,duration")]));
        assert_eq!(
            features.sort(),
            vec![
                SortKey {
                    column: "price".to_string(),
                    direction: SortDirection::Desc
                },
                SortKey {
                    column: "duration".to_string(),
                    direction: SortDirection::Asc
                },
            ]
        );
    }

    #[test]
    fn sort_defaults_to_newest_first() {
        let features = QueryFeatures::new(params(&[]));
        assert_eq!(
            features.sort(),
            vec![SortKey {
                column: "created_at".to_string(),
                direction: SortDirection::Desc
            }]
        );
    }

    #[test]
    fn projection_always_includes_id() {
        let features = QueryFeatures::new(params(&[("fields", "name,price")]));
        assert_eq!(features.project(), vec!["id", "name", "price"]);

        let features = QueryFeatures::new(params(&[]));
        assert!(features.project().is_empty());
    }

    #[test]
    fn pagination_math_holds_exactly() {
        let features = QueryFeatures::new(params(&[("page", "3"), ("limit", "7")]));
        assert_eq!(features.paginate(), (7, 14));
    }

    #[test]
    fn pagination_defaults() {
        assert_eq!(QueryFeatures::new(params(&[])).paginate(), (10, 0));
        // page=0 and non-numeric values fall back to page 1
        assert_eq!(
            QueryFeatures::new(params(&[("page", "0")])).paginate(),
            (10, 0)
        );
        assert_eq!(
            QueryFeatures::new(params(&[("page", "x"), ("limit", "-2")])).paginate(),
            (10, 0)
        );
    }

    #[test]
    fn stages_are_order_independent() {
        let input = params(&[
            ("duration[gte]", "5"),
            ("difficulty", "easy"),
            ("sort", "-price"),
            ("fields", "name,price"),
            ("limit", "2"),
            ("page", "1"),
        ]);

        // Assemble in two different stage orders and compare the result.
        let a = QueryFeatures::new(input.clone());
        let (limit, offset) = a.paginate();
        let forward = ListQuery {
            conditions: a.filter(),
            order: a.sort(),
            select: a.project(),
            limit,
            offset,
        };

        let b = QueryFeatures::new(input);
        let select = b.project();
        let order = b.sort();
        let (limit, offset) = b.paginate();
        let reverse = ListQuery {
            conditions: b.filter(),
            order,
            select,
            limit,
            offset,
        };

        assert_eq!(forward, reverse);
    }

    #[test]
    fn coerces_query_string_values() {
        assert_eq!(coerce_value("5"), Value::from(5));
        assert_eq!(coerce_value("4.5"), Value::from(4.5));
        assert_eq!(coerce_value("true"), Value::Bool(true));
        assert_eq!(coerce_value("easy"), Value::from("easy"));
    }
}
