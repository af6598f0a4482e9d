//! Category registry, public product listing and the admin catalog editor.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::{AppError, Result};
use super::orders::require_admin;
use super::AppState;
use crate::domain::aggregates::CategoryKey;
use crate::domain::value_objects::Currency;
use crate::persistence::Row;
use crate::services::catalog::{self, CatalogError, CategoryEntry};

fn category(raw: &str) -> Result<CategoryKey> { raw.parse().map_err(|e| CatalogError::from(e).into()) }

pub async fn categories() -> Json<Vec<CategoryEntry>> { Json(catalog::registry()) }

pub async fn list(State(s): State<AppState>, Path(raw): Path<String>) -> Result<Json<Vec<Row>>> {
    Ok(Json(s.catalog.list(category(&raw)?).await?))
}

/// Stores the category list on the device, as the storefront does on first load.
pub async fn cache_categories(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<CategoryKey>>> {
    let session = s.sessions.get_or_create(&id).await;
    let mut session = session.lock().await;
    Ok(Json(session.cache_categories()?))
}

#[derive(Debug, Deserialize)]
pub struct PriceQuery { pub amount: Decimal, pub currency: Option<String> }

#[derive(Serialize)]
pub struct FormattedPrice { currency: Currency, converted: Decimal, formatted: String }

/// Base-currency amount rendered in one currency, or in all of them.
pub async fn format_price(Query(q): Query<PriceQuery>) -> Result<Json<Vec<FormattedPrice>>> {
    let currencies = match q.currency {
        Some(code) => vec![code.parse::<Currency>().map_err(|e| AppError::BadRequest(e.to_string()))?],
        None => Currency::ALL.to_vec(),
    };
    Ok(Json(
        currencies
            .into_iter()
            .map(|c| FormattedPrice { currency: c, converted: c.convert(q.amount).round_dp(2), formatted: c.format(q.amount) })
            .collect(),
    ))
}

pub async fn admin_list(State(s): State<AppState>, Path((id, raw)): Path<(String, String)>) -> Result<Json<Vec<Row>>> {
    require_admin(&s, &id).await?;
    Ok(Json(s.catalog.list(category(&raw)?).await?))
}

pub async fn create(State(s): State<AppState>, Path((id, raw)): Path<(String, String)>, Json(input): Json<Row>) -> Result<(StatusCode, Json<Row>)> {
    require_admin(&s, &id).await?;
    let saved = s.catalog.create(category(&raw)?, input).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn update(State(s): State<AppState>, Path((id, raw, key)): Path<(String, String, String)>, Json(patch): Json<Row>) -> Result<Json<Row>> {
    require_admin(&s, &id).await?;
    Ok(Json(s.catalog.update(category(&raw)?, &key, patch).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub confirm: bool,
}

pub async fn remove(State(s): State<AppState>, Path((id, raw, key)): Path<(String, String, String)>, Query(q): Query<DeleteQuery>) -> Result<StatusCode> {
    require_admin(&s, &id).await?;
    s.catalog.delete(category(&raw)?, &key, q.confirm).await?;
    Ok(StatusCode::NO_CONTENT)
}
