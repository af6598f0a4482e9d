use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;

use super::{key_text, PersistenceError, Row, RowStore};

/// Postgres-backed row store. Rows travel as JSONB so any table shape works.
#[derive(Clone)]
pub struct PgRowStore {
    db: PgPool,
}

impl PgRowStore {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

fn ident(name: &str) -> String { format!("\"{}\"", name.replace('"', "\"\"")) }

fn column_list(row: &Row) -> String { row.keys().map(|k| ident(k)).collect::<Vec<_>>().join(", ") }

fn into_row(value: Value) -> Result<Row, PersistenceError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(PersistenceError::Decode(format!("expected object, got {other}"))),
    }
}

fn map_write_error(table: &str, e: sqlx::Error) -> PersistenceError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => PersistenceError::Conflict {
            table: table.to_string(),
            column: db.constraint().unwrap_or("unique").to_string(),
        },
        _ => PersistenceError::Database(e),
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    async fn select(&self, table: &str) -> Result<Vec<Row>, PersistenceError> {
        let sql = format!("SELECT to_jsonb(r) FROM {} r", ident(table));
        let rows: Vec<Value> = sqlx::query_scalar(&sql).fetch_all(&self.db).await?;
        rows.into_iter().map(into_row).collect()
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, PersistenceError> {
        let t = ident(table);
        let cols = column_list(&row);
        let sql = format!("INSERT INTO {t} AS r ({cols}) SELECT {cols} FROM jsonb_populate_record(NULL::{t}, $1) RETURNING to_jsonb(r)");
        let saved: Value = sqlx::query_scalar(&sql).bind(Value::Object(row)).fetch_one(&self.db).await.map_err(|e| map_write_error(table, e))?;
        into_row(saved)
    }

    async fn update(&self, table: &str, row: Row, key_column: &str, key_value: &Value) -> Result<Row, PersistenceError> {
        let t = ident(table);
        let assignments = row.keys().map(|k| format!("{c} = p.{c}", c = ident(k))).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "UPDATE {t} AS r SET {assignments} FROM jsonb_populate_record(NULL::{t}, $1) AS p WHERE r.{}::text = $2 RETURNING to_jsonb(r)",
            ident(key_column)
        );
        let key = key_text(key_value);
        let saved: Option<Value> = sqlx::query_scalar(&sql)
            .bind(Value::Object(row))
            .bind(&key)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| map_write_error(table, e))?;
        let saved = saved.ok_or_else(|| PersistenceError::NotFound { table: table.to_string(), column: key_column.to_string(), key })?;
        into_row(saved)
    }

    async fn increment(&self, table: &str, column: &str, by: Decimal, key_column: &str, key_value: &Value) -> Result<Row, PersistenceError> {
        let sql = format!(
            "UPDATE {} AS r SET {c} = COALESCE(r.{c}, 0) + $1::numeric WHERE r.{}::text = $2 RETURNING to_jsonb(r)",
            ident(table),
            ident(key_column),
            c = ident(column)
        );
        let key = key_text(key_value);
        let saved: Option<Value> = sqlx::query_scalar(&sql).bind(by.to_string()).bind(&key).fetch_optional(&self.db).await?;
        let saved = saved.ok_or_else(|| PersistenceError::NotFound { table: table.to_string(), column: key_column.to_string(), key })?;
        into_row(saved)
    }

    async fn delete(&self, table: &str, key_column: &str, key_value: &Value) -> Result<(), PersistenceError> {
        let sql = format!("DELETE FROM {} WHERE {}::text = $1", ident(table), ident(key_column));
        let key = key_text(key_value);
        let done = sqlx::query(&sql).bind(&key).execute(&self.db).await?;
        if done.rows_affected() == 0 {
            return Err(PersistenceError::NotFound { table: table.to_string(), column: key_column.to_string(), key });
        }
        Ok(())
    }

    async fn find(&self, table: &str, column: &str, value: &Value) -> Result<Option<Row>, PersistenceError> {
        let sql = format!("SELECT to_jsonb(r) FROM {} r WHERE r.{}::text = $1 LIMIT 1", ident(table), ident(column));
        let row: Option<Value> = sqlx::query_scalar(&sql).bind(key_text(value)).fetch_optional(&self.db).await?;
        row.map(into_row).transpose()
    }

    async fn find_all(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>, PersistenceError> {
        let sql = format!("SELECT to_jsonb(r) FROM {} r WHERE r.{}::text = $1", ident(table), ident(column));
        let rows: Vec<Value> = sqlx::query_scalar(&sql).bind(key_text(value)).fetch_all(&self.db).await?;
        rows.into_iter().map(into_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_are_quoted() {
        assert_eq!(ident("ingrijire-personala"), "\"ingrijire-personala\"");
        assert_eq!(ident("a\"b"), "\"a\"\"b\"");
    }
}
