use serde_json::Value;

use super::error::QueryError;
use super::types::{CompareOp, ListQuery, SortKey, SqlQuery};

/// Renders a `ListQuery` into parameterized SQL for one table.
///
/// Identifiers are validated here rather than escaped; a constraint on a key
/// the schema does not recognize (including unrecognized bracket operators
/// carried through the filter stage) is rejected before any SQL is built.
pub struct SqlRenderer<'a> {
    table: &'a str,
}

impl<'a> SqlRenderer<'a> {
    pub fn new(table: &'a str) -> Result<Self, QueryError> {
        validate_identifier(table).map_err(|_| QueryError::InvalidTableName(table.to_string()))?;
        Ok(Self { table })
    }

    pub fn select_sql(&self, query: &ListQuery) -> Result<SqlQuery, QueryError> {
        let select_clause = build_select_clause(&query.select)?;
        let (where_clause, params) = build_where_clause(&query.conditions)?;
        let order_clause = build_order_clause(&query.order)?;

        let sql = [
            format!("SELECT {}", select_clause),
            format!("FROM \"{}\"", self.table),
            if where_clause.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", where_clause)
            },
            order_clause,
            if query.limit == ListQuery::NO_LIMIT {
                String::new()
            } else {
                format!("LIMIT {} OFFSET {}", query.limit, query.offset)
            },
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        Ok(SqlQuery { sql, params })
    }

    pub fn count_sql(&self, query: &ListQuery) -> Result<SqlQuery, QueryError> {
        let (where_clause, params) = build_where_clause(&query.conditions)?;
        let sql = if where_clause.is_empty() {
            format!("SELECT COUNT(*) AS count FROM \"{}\"", self.table)
        } else {
            format!(
                "SELECT COUNT(*) AS count FROM \"{}\" WHERE {}",
                self.table, where_clause
            )
        };
        Ok(SqlQuery { sql, params })
    }
}

fn build_select_clause(columns: &[String]) -> Result<String, QueryError> {
    if columns.is_empty() {
        return Ok("*".to_string());
    }
    for column in columns {
        validate_identifier(column)
            .map_err(|_| QueryError::InvalidColumn(column.to_string()))?;
    }
    Ok(columns
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", "))
}

fn build_where_clause(
    conditions: &[super::types::Condition],
) -> Result<(String, Vec<Value>), QueryError> {
    let mut params: Vec<Value> = vec![];
    let mut parts: Vec<String> = vec![];

    for condition in conditions {
        validate_identifier(&condition.column)
            .map_err(|_| QueryError::InvalidColumn(condition.column.to_string()))?;

        let quoted = format!("\"{}\"", condition.column);
        let part = match (&condition.op, &condition.value) {
            (CompareOp::Eq, Value::Null) => format!("{} IS NULL", quoted),
            (CompareOp::Ne, Value::Null) => format!("{} IS NOT NULL", quoted),
            (op, value) => {
                params.push(value.clone());
                format!("{} {} ${}", quoted, op.to_sql(), params.len())
            }
        };
        parts.push(part);
    }

    Ok((parts.join(" AND "), params))
}

fn build_order_clause(order: &[SortKey]) -> Result<String, QueryError> {
    if order.is_empty() {
        return Ok(String::new());
    }
    let mut parts = Vec::with_capacity(order.len());
    for key in order {
        validate_identifier(&key.column)
            .map_err(|_| QueryError::InvalidSortKey(key.column.to_string()))?;
        parts.push(format!("\"{}\" {}", key.column, key.direction.to_sql()));
    }
    Ok(format!("ORDER BY {}", parts.join(", ")))
}

/// Snake_case SQL identifier check shared with the repository's dynamic
/// INSERT/UPDATE paths.
pub fn valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn validate_identifier(name: &str) -> Result<(), ()> {
    if valid_identifier(name) {
        Ok(())
    } else {
        Err(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::features::QueryFeatures;
    use super::super::types::{CompareOp, Condition, SortDirection};
    use super::*;
    use std::collections::HashMap;

    fn query_for(pairs: &[(&str, &str)]) -> ListQuery {
        let params: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        QueryFeatures::new(params).into_list_query()
    }

    #[test]
    fn renders_full_scenario_query() {
        // ?duration[gte]=5&difficulty=easy&sort=-price&limit=2&page=1
        let query = query_for(&[
            ("duration[gte]", "5"),
            ("difficulty", "easy"),
            ("sort", "-price"),
            ("limit", "2"),
            ("page", "1"),
        ]);

        let rendered = SqlRenderer::new("tours").unwrap().select_sql(&query).unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT * FROM \"tours\" WHERE \"difficulty\" = $1 AND \"duration\" >= $2 \
             ORDER BY \"price\" DESC LIMIT 2 OFFSET 0"
        );
        assert_eq!(rendered.params, vec![Value::from("easy"), Value::from(5)]);
    }

    #[test]
    fn renders_projection_and_default_sort() {
        let query = query_for(&[("fields", "name,price")]);
        let rendered = SqlRenderer::new("tours").unwrap().select_sql(&query).unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT \"id\", \"name\", \"price\" FROM \"tours\" \
             ORDER BY \"created_at\" DESC LIMIT 10 OFFSET 0"
        );
    }

    #[test]
    fn null_equality_renders_is_null() {
        let query = ListQuery {
            conditions: vec![Condition::new("slug", CompareOp::Eq, Value::Null)],
            order: vec![],
            select: vec![],
            limit: 10,
            offset: 0,
        };
        let rendered = SqlRenderer::new("tours").unwrap().select_sql(&query).unwrap();
        assert!(rendered.sql.contains("\"slug\" IS NULL"));
        assert!(rendered.params.is_empty());
    }

    #[test]
    fn rejects_invalid_identifiers() {
        // Unrecognized bracket operators survive the filter stage and die here.
        let query = query_for(&[("duration[near]", "5")]);
        let err = SqlRenderer::new("tours").unwrap().select_sql(&query);
        assert!(matches!(err, Err(QueryError::InvalidColumn(_))));

        assert!(SqlRenderer::new("tours; DROP TABLE tours").is_err());
    }

    #[test]
    fn count_sql_shares_where_clause() {
        let query = query_for(&[("difficulty", "easy")]);
        let rendered = SqlRenderer::new("tours").unwrap().count_sql(&query).unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT COUNT(*) AS count FROM \"tours\" WHERE \"difficulty\" = $1"
        );
    }

    #[test]
    fn scope_conditions_render_first() {
        let query = query_for(&[("rating[gte]", "4")]).scoped(Condition::new(
            "tour_id",
            CompareOp::Eq,
            Value::from("0c3e6a8e-0000-0000-0000-000000000000"),
        ));
        let rendered = SqlRenderer::new("reviews").unwrap().select_sql(&query).unwrap();
        assert!(rendered
            .sql
            .starts_with("SELECT * FROM \"reviews\" WHERE \"tour_id\" = $1 AND \"rating\" >= $2"));
    }

    #[test]
    fn sort_direction_sql() {
        assert_eq!(SortDirection::Asc.to_sql(), "ASC");
        assert_eq!(SortDirection::Desc.to_sql(), "DESC");
    }
}
