use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{key_text, PersistenceError, Row, RowStore};

/// In-process row store. Used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryRowStore {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    unique: HashMap<String, Vec<String>>,
}

impl MemoryRowStore {
    pub fn new() -> Self { Self::default() }

    /// Declares a unique column, enforced on insert and update.
    pub fn with_unique(mut self, table: &str, column: &str) -> Self {
        self.unique.entry(table.to_string()).or_default().push(column.to_string());
        self
    }

    pub async fn seed(&self, table: &str, rows: Vec<Row>) {
        self.tables.write().await.entry(table.to_string()).or_default().extend(rows);
    }

    fn check_unique(&self, table: &str, rows: &[Row], candidate: &Row, skip: Option<usize>) -> Result<(), PersistenceError> {
        for column in self.unique.get(table).into_iter().flatten() {
            let Some(value) = candidate.get(column).filter(|v| !v.is_null()) else { continue };
            let wanted = key_text(value);
            let taken = rows.iter().enumerate()
                .filter(|(i, _)| Some(*i) != skip)
                .any(|(_, r)| r.get(column).map(key_text).as_deref() == Some(wanted.as_str()));
            if taken { return Err(PersistenceError::Conflict { table: table.to_string(), column: column.clone() }); }
        }
        Ok(())
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn select(&self, table: &str) -> Result<Vec<Row>, PersistenceError> {
        Ok(self.tables.read().await.get(table).cloned().unwrap_or_default())
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<Row, PersistenceError> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        self.check_unique(table, rows, &row, None)?;
        if row.get("id").map_or(true, Value::is_null) {
            row.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        }
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, row: Row, key_column: &str, key_value: &Value) -> Result<Row, PersistenceError> {
        let mut tables = self.tables.write().await;
        let wanted = key_text(key_value);
        let not_found = || PersistenceError::NotFound { table: table.to_string(), column: key_column.to_string(), key: wanted.clone() };
        let rows = tables.get_mut(table).ok_or_else(not_found)?;
        let idx = rows.iter().position(|r| r.get(key_column).map(key_text).as_deref() == Some(wanted.as_str())).ok_or_else(not_found)?;
        let mut merged = rows[idx].clone();
        merged.extend(row);
        self.check_unique(table, rows, &merged, Some(idx))?;
        rows[idx] = merged.clone();
        Ok(merged)
    }

    async fn increment(&self, table: &str, column: &str, by: Decimal, key_column: &str, key_value: &Value) -> Result<Row, PersistenceError> {
        let mut tables = self.tables.write().await;
        let wanted = key_text(key_value);
        let not_found = || PersistenceError::NotFound { table: table.to_string(), column: key_column.to_string(), key: wanted.clone() };
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| r.get(key_column).map(key_text).as_deref() == Some(wanted.as_str())))
            .ok_or_else(not_found)?;
        let current = match row.get(column).map(key_text).filter(|t| !t.is_empty()) {
            Some(text) => text.parse::<Decimal>().map_err(|e| PersistenceError::Decode(format!("{column}: {e}")))?,
            None => Decimal::ZERO,
        };
        let next = current.checked_add(by).ok_or_else(|| PersistenceError::Overflow { table: table.to_string(), column: column.to_string() })?;
        row.insert(column.to_string(), Value::String(next.to_string()));
        Ok(row.clone())
    }

    async fn delete(&self, table: &str, key_column: &str, key_value: &Value) -> Result<(), PersistenceError> {
        let mut tables = self.tables.write().await;
        let wanted = key_text(key_value);
        let rows = tables.get_mut(table);
        let before = rows.as_ref().map_or(0, |r| r.len());
        if let Some(rows) = rows {
            rows.retain(|r| r.get(key_column).map(key_text).as_deref() != Some(wanted.as_str()));
            if rows.len() < before { return Ok(()); }
        }
        Err(PersistenceError::NotFound { table: table.to_string(), column: key_column.to_string(), key: wanted })
    }
}
