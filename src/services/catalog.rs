//! Admin catalog editor over the per-category product tables.

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::aggregates::product::{UnknownCategory, COMMON_FIELDS};
use crate::domain::aggregates::{CategoryKey, FieldSpec, FieldViolation, NewCartItem, ProductDraft};
use crate::domain::events::{EventPublisher, StoreEvent};
use crate::persistence::{key_text, PersistenceError, Row, RowStore};

/// Primary key columns, tried in this order on each row.
pub const KEY_CANDIDATES: [&str; 3] = ["id", "code", "Код"];

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    UnknownCategory(#[from] UnknownCategory),
    #[error("invalid product")]
    Invalid(Vec<FieldViolation>),
    #[error("field {0} is not editable in this category")]
    UnknownField(String),
    #[error("a product with this SKU already exists")]
    DuplicateSku,
    #[error("product {0} not found")]
    NotFound(String),
    #[error("deletion must be confirmed")]
    NotConfirmed,
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Registry entry: everything the editor needs to know about one category.
#[derive(Clone, Debug, Serialize)]
pub struct CategoryEntry {
    pub key: CategoryKey,
    pub table: &'static str,
    pub label: &'static str,
    pub fields: Vec<FieldSpec>,
    pub unique: Option<&'static str>,
}

impl CategoryEntry {
    pub fn of(key: CategoryKey) -> Self {
        let schema = key.schema();
        Self {
            key,
            table: key.table(),
            label: key.label(),
            fields: COMMON_FIELDS.iter().chain(schema.extra_fields()).copied().collect(),
            unique: schema.unique_field(),
        }
    }
}

pub fn registry() -> Vec<CategoryEntry> { CategoryKey::ALL.into_iter().map(CategoryEntry::of).collect() }

/// First key candidate carrying a string or number value.
pub fn resolve_key(row: &Row) -> Option<(&'static str, Value)> {
    KEY_CANDIDATES.into_iter().find_map(|column| match row.get(column) {
        Some(v @ (Value::String(_) | Value::Number(_))) => Some((column, v.clone())),
        _ => None,
    })
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn RowStore>,
    events: EventPublisher,
}

impl CatalogService {
    pub fn new(store: Arc<dyn RowStore>, events: EventPublisher) -> Self { Self { store, events } }

    pub async fn list(&self, category: CategoryKey) -> Result<Vec<Row>, CatalogError> {
        Ok(self.store.select(category.table()).await?)
    }

    pub async fn get(&self, category: CategoryKey, key: &str) -> Result<Row, CatalogError> {
        Ok(self.locate(category, key).await?.0)
    }

    #[instrument(skip(self, input))]
    pub async fn create(&self, category: CategoryKey, input: Row) -> Result<Row, CatalogError> {
        reject_unknown(category, &input)?;
        let draft = ProductDraft::parse(category, &input).map_err(CatalogError::Invalid)?;
        let saved = self.store.insert(category.table(), draft.to_row()).await.map_err(conflict_as_duplicate)?;
        let key = resolve_key(&saved).map(|(_, v)| key_text(&v)).unwrap_or_default();
        info!(%key, "product created");
        self.events.publish(StoreEvent::ProductCreated { category, key }).await;
        Ok(saved)
    }

    /// Overwrites only the submitted fields, after validating the merged product.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, category: CategoryKey, key: &str, patch: Row) -> Result<Row, CatalogError> {
        reject_unknown(category, &patch)?;
        let (existing, column, value) = self.locate(category, key).await?;
        let schema = category.schema();
        let mut merged: Row = existing.into_iter().filter(|(k, v)| schema.allows(k) && !v.is_null()).collect();
        merged.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
        let normalized = ProductDraft::parse(category, &merged).map_err(CatalogError::Invalid)?.to_row();
        let changes: Row = normalized.into_iter().filter(|(k, _)| patch.contains_key(k)).collect();
        let saved = self.store.update(category.table(), changes, column, &value).await.map_err(conflict_as_duplicate)?;
        self.events.publish(StoreEvent::ProductUpdated { category, key: key.to_string() }).await;
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, category: CategoryKey, key: &str, confirmed: bool) -> Result<(), CatalogError> {
        if !confirmed { return Err(CatalogError::NotConfirmed); }
        let (_, column, value) = self.locate(category, key).await?;
        self.store.delete(category.table(), column, &value).await?;
        info!("product deleted");
        self.events.publish(StoreEvent::ProductDeleted { category, key: key.to_string() }).await;
        Ok(())
    }

    /// Cart line for a catalog product, priced from its stored row. Without a
    /// category every table is searched in registry order.
    pub async fn cart_item(&self, category: Option<CategoryKey>, product_id: &str, variant_id: Option<String>) -> Result<NewCartItem, CatalogError> {
        let categories = match category {
            Some(key) => vec![key],
            None => CategoryKey::ALL.to_vec(),
        };
        for key in categories {
            let row = match self.locate(key, product_id).await {
                Ok((row, _, _)) => row,
                Err(CatalogError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let unit_price = row.get("sale_price").map(key_text).and_then(|p| p.parse::<Decimal>().ok()).ok_or_else(|| {
                CatalogError::Invalid(vec![FieldViolation { field: "sale_price".into(), message: "missing or malformed price".into() }])
            })?;
            return Ok(NewCartItem {
                product_id: product_id.to_string(),
                variant_id,
                name: row.get("name").map(key_text).unwrap_or_default(),
                unit_price,
                image_ref: row.get("image_url").map(key_text).unwrap_or_default(),
            });
        }
        Err(CatalogError::NotFound(product_id.to_string()))
    }

    /// Finds the row whose resolved key matches, with the column that keyed it.
    async fn locate(&self, category: CategoryKey, key: &str) -> Result<(Row, &'static str, Value), CatalogError> {
        self.store
            .select(category.table())
            .await?
            .into_iter()
            .find_map(|row| {
                let (column, value) = resolve_key(&row)?;
                (key_text(&value) == key).then_some((row, column, value))
            })
            .ok_or_else(|| CatalogError::NotFound(key.to_string()))
    }
}

fn reject_unknown(category: CategoryKey, input: &Row) -> Result<(), CatalogError> {
    let schema = category.schema();
    match input.keys().find(|k| !schema.allows(k)) {
        Some(field) => Err(CatalogError::UnknownField(field.clone())),
        None => Ok(()),
    }
}

fn conflict_as_duplicate(e: PersistenceError) -> CatalogError {
    match e {
        PersistenceError::Conflict { .. } => CatalogError::DuplicateSku,
        other => other.into(),
    }
}
