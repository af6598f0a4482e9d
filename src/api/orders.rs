//! Order lookup, device order history and admin status management.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use super::error::{AppError, Result};
use super::AppState;
use crate::domain::aggregates::{Order, OrderError, OrderStatus};
use crate::services::auth::AuthError;
use crate::services::orders::OrderServiceError;
use crate::storage::{keys, KeyValueStore};

pub async fn get_order(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Order>> {
    Ok(Json(s.orders.get(&id).await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    pay_id: Option<String>,
}

/// Orders placed from this device, newest first. Ids the store no longer knows are skipped.
pub async fn history(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<HistoryEntry>>> {
    let Some(session) = s.sessions.get(&id).await else { return Ok(Json(vec![])) };
    let (ids, pay_ids) = {
        let session = session.lock().await;
        let ids: Vec<String> = session.local.get_json(keys::MY_ORDERS)?.unwrap_or_default();
        let pay_ids: HashMap<String, String> = session.local.get_json(keys::ORDER_PAY_IDS)?.unwrap_or_default();
        (ids, pay_ids)
    };
    let mut entries = Vec::with_capacity(ids.len());
    for order_id in ids.iter().rev() {
        match s.orders.get(order_id).await {
            Ok(order) => entries.push(HistoryEntry { pay_id: pay_ids.get(order_id).cloned(), order }),
            Err(OrderServiceError::NotFound(_)) => warn!(%order_id, "order in history no longer exists"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery { pub email: String }

pub async fn admin_list(State(s): State<AppState>, Path(id): Path<String>, Query(q): Query<EmailQuery>) -> Result<Json<Vec<Order>>> {
    require_admin(&s, &id).await?;
    Ok(Json(s.orders.list_by_email(q.email.trim()).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest { pub status: String }

pub async fn update_status(State(s): State<AppState>, Path((id, order_id)): Path<(String, String)>, Json(r): Json<StatusRequest>) -> Result<Json<Order>> {
    require_admin(&s, &id).await?;
    let status: OrderStatus = r.status.parse().map_err(|e: OrderError| AppError::BadRequest(e.to_string()))?;
    Ok(Json(s.orders.update_status(&order_id, status).await?))
}

pub(super) async fn require_admin(s: &AppState, session_id: &str) -> Result<()> {
    let session = s.sessions.get(session_id).await.ok_or(AuthError::NotAuthenticated)?;
    let session = session.lock().await;
    session.auth.require_admin()?;
    Ok(())
}
