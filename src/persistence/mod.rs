//! Row store: CRUD by table name over JSON-shaped rows.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

mod memory;
mod postgres;

pub use memory::MemoryRowStore;
pub use postgres::PgRowStore;

pub type Row = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("duplicate value for unique column {column} in {table}")]
    Conflict { table: String, column: String },
    #[error("no row in {table} where {column} = {key}")]
    NotFound { table: String, column: String, key: String },
    #[error("{column} in {table} would overflow")]
    Overflow { table: String, column: String },
    #[error("row could not be decoded: {0}")]
    Decode(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(&self, table: &str) -> Result<Vec<Row>, PersistenceError>;

    /// Returns the stored row, including generated columns.
    async fn insert(&self, table: &str, row: Row) -> Result<Row, PersistenceError>;

    /// Overwrites the given columns of the row whose `key_column` equals `key_value`.
    async fn update(&self, table: &str, row: Row, key_column: &str, key_value: &Value) -> Result<Row, PersistenceError>;

    async fn delete(&self, table: &str, key_column: &str, key_value: &Value) -> Result<(), PersistenceError>;

    /// Adds `by` to a numeric column in place and returns the updated row. A
    /// null column counts as zero.
    async fn increment(&self, table: &str, column: &str, by: Decimal, key_column: &str, key_value: &Value) -> Result<Row, PersistenceError>;

    async fn find(&self, table: &str, column: &str, value: &Value) -> Result<Option<Row>, PersistenceError> {
        let wanted = key_text(value);
        Ok(self.select(table).await?.into_iter().find(|r| r.get(column).map(key_text).as_deref() == Some(wanted.as_str())))
    }

    async fn find_all(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>, PersistenceError> {
        let wanted = key_text(value);
        Ok(self.select(table).await?.into_iter().filter(|r| r.get(column).map(key_text).as_deref() == Some(wanted.as_str())).collect())
    }
}

/// Keys compare by their text form, so `7` and `"7"` address the same row.
pub fn key_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
