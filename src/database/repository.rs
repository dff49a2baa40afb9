use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Column, FromRow, PgPool, Row};
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::models::Model;
use crate::query::sql::valid_identifier;
use crate::query::{CompareOp, Condition, ListQuery, SqlRenderer};

/// Generic data access for one resource type. The five handler operations
/// (list, get-one, create, update, delete) are identical across resources;
/// anything resource-specific happens before these calls.
pub struct Repository<T> {
    pool: PgPool,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Model> Repository<T> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Execute an assembled retrieval request.
    pub async fn select(&self, query: &ListQuery) -> Result<Vec<T>, DatabaseError> {
        let rendered = SqlRenderer::new(T::TABLE)
            .and_then(|r| r.select_sql(query))
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        let mut q = sqlx::query_as::<_, T>(&rendered.sql);
        for p in rendered.params.iter() {
            q = bind_value_as(q, p);
        }
        Ok(q.fetch_all(&self.pool).await?)
    }

    /// Execute a retrieval request returning raw JSON rows. List endpoints go
    /// through here so field projection works without a full typed row.
    pub async fn select_json(
        &self,
        query: &ListQuery,
    ) -> Result<Vec<Map<String, Value>>, DatabaseError> {
        let rendered = SqlRenderer::new(T::TABLE)
            .and_then(|r| r.select_sql(query))
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        let mut q = sqlx::query(&rendered.sql);
        for p in rendered.params.iter() {
            q = bind_value(q, p);
        }
        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    pub async fn count(&self, query: &ListQuery) -> Result<i64, DatabaseError> {
        let rendered = SqlRenderer::new(T::TABLE)
            .and_then(|r| r.count_sql(query))
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        let mut q = sqlx::query(&rendered.sql);
        for p in rendered.params.iter() {
            q = bind_value(q, p);
        }
        let row = q.fetch_one(&self.pool).await?;
        Ok(row.try_get("count")?)
    }

    /// Fetch by primary key; absent records surface as NotFound.
    pub async fn find(&self, id: Uuid) -> Result<T, DatabaseError> {
        let sql = format!("SELECT * FROM \"{}\" WHERE id = $1", T::TABLE);
        sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound("No record found with that id".to_string()))
    }

    /// Fetch the first record matching a set of scope conditions.
    pub async fn find_where(&self, conditions: Vec<Condition>) -> Result<Option<T>, DatabaseError> {
        let query = ListQuery {
            conditions,
            order: vec![],
            select: vec![],
            limit: 1,
            offset: 0,
        };
        Ok(self.select(&query).await?.into_iter().next())
    }

    /// Fetch every record matching a set of scope conditions.
    pub async fn find_all_where(&self, conditions: Vec<Condition>) -> Result<Vec<T>, DatabaseError> {
        self.select(&ListQuery::unbounded(conditions)).await
    }

    /// Batch fetch for relationship expansion.
    pub async fn select_ids(&self, ids: &[Uuid]) -> Result<Vec<T>, DatabaseError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let sql = format!("SELECT * FROM \"{}\" WHERE id = ANY($1)", T::TABLE);
        Ok(sqlx::query_as::<_, T>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Dynamic INSERT from a validated field map, returning the stored row.
    pub async fn insert(&self, fields: &Map<String, Value>) -> Result<T, DatabaseError> {
        if fields.is_empty() {
            return Err(DatabaseError::QueryError("no fields to insert".to_string()));
        }
        let columns = validated_columns(fields)?;

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({}) RETURNING *",
            T::TABLE,
            columns
                .iter()
                .map(|c| format!("\"{}\"", c))
                .collect::<Vec<_>>()
                .join(", "),
            placeholders.join(", "),
        );

        let mut q = sqlx::query_as::<_, T>(&sql);
        for column in &columns {
            q = bind_value_as(q, &fields[*column]);
        }
        Ok(q.fetch_one(&self.pool).await?)
    }

    /// Partial dynamic UPDATE; field-level constraints re-run at the schema.
    pub async fn update(&self, id: Uuid, fields: &Map<String, Value>) -> Result<T, DatabaseError> {
        if fields.is_empty() {
            // Nothing to change; behave like a read so callers still get 404s.
            return self.find(id).await;
        }
        let columns = validated_columns(fields)?;

        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("\"{}\" = ${}", c, i + 1))
            .collect();
        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE id = ${} RETURNING *",
            T::TABLE,
            assignments.join(", "),
            columns.len() + 1,
        );

        let mut q = sqlx::query_as::<_, T>(&sql);
        for column in &columns {
            q = bind_value_as(q, &fields[*column]);
        }
        q.bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound("No record found with that id".to_string()))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        let sql = format!("DELETE FROM \"{}\" WHERE id = $1 RETURNING id", T::TABLE);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound("No record found with that id".to_string()))?;
        Ok(())
    }
}

/// Convenience scope builders used by handlers when merging path scoping and
/// visibility filters into the pipeline's filter stage.
pub fn scope_eq(column: &str, value: impl Into<Value>) -> Condition {
    Condition::new(column, CompareOp::Eq, value.into())
}

pub fn scope_ne(column: &str, value: impl Into<Value>) -> Condition {
    Condition::new(column, CompareOp::Ne, value.into())
}

/// Convert a row to JSON by probing the column types this schema uses:
/// jsonb, uuid, text, integers, floats, booleans and timestamps.
fn row_to_json(row: &PgRow) -> Map<String, Value> {
    let mut map = Map::new();
    for i in 0..row.len() {
        let name = row.column(i).name().to_string();

        let value = if let Ok(v) = row.try_get::<Option<Value>, _>(i) {
            v.unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<Uuid>, _>(i) {
            v.map(|u| Value::String(u.to_string())).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(i) {
            v.map(Value::String).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<i32>, _>(i) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
            v.map(Value::Bool).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(i) {
            v.map(|t| Value::String(t.to_rfc3339())).unwrap_or(Value::Null)
        } else {
            Value::Null
        };

        map.insert(name, value);
    }
    map
}

fn validated_columns(fields: &Map<String, Value>) -> Result<Vec<&str>, DatabaseError> {
    let mut columns = Vec::with_capacity(fields.len());
    for key in fields.keys() {
        if !valid_identifier(key) {
            return Err(DatabaseError::QueryError(format!(
                "invalid field name: {}",
                key
            )));
        }
        columns.push(key.as_str());
    }
    Ok(columns)
}

fn bind_value<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => {
            // Uuid-shaped strings bind as uuids so reference columns compare.
            if let Ok(id) = Uuid::parse_str(s) {
                q.bind(id)
            } else {
                q.bind(s)
            }
        }
        // Lists and embedded documents live in jsonb columns.
        Value::Array(_) | Value::Object(_) => q.bind(v.clone()),
    }
}

fn bind_value_as<'q, O>(
    q: sqlx::query::QueryAs<'q, sqlx::Postgres, O, PgArguments>,
    v: &'q Value,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, PgArguments>
where
    O: for<'r> FromRow<'r, sqlx::postgres::PgRow>,
{
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => {
            if let Ok(id) = Uuid::parse_str(s) {
                q.bind(id)
            } else {
                q.bind(s)
            }
        }
        Value::Array(_) | Value::Object(_) => q.bind(v.clone()),
    }
}
