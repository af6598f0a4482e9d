//! Gateway return, server-to-server callback and refunds.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

use super::error::{AppError, Result};
use super::AppState;
use crate::domain::events::StoreEvent;
use crate::locale::Message;
use crate::payment::{CallbackParams, ConfirmationState, FailureReason, Outcome, PaymentConfirmation, RefundReport};
use crate::persistence::Row;
use crate::storage::{keys, KeyValueStore};

pub const PAYMENT_EVENTS_TABLE: &str = "payment_events";

#[derive(Serialize)]
pub struct ConfirmationResponse {
    #[serde(flatten)]
    outcome: Outcome,
    message: String,
}

fn outcome_message(state: &ConfirmationState) -> Message {
    match state {
        ConfirmationState::Success { .. } => Message::PaymentSucceeded,
        ConfirmationState::Failed { reason: FailureReason::MissingParameters } => Message::PaymentMissingParameters,
        ConfirmationState::Failed { reason: FailureReason::Declined { .. } } => Message::PaymentFailed,
        ConfirmationState::Failed { reason: FailureReason::OrderNotSaved { .. } } => Message::OrderNotSaved,
        _ => Message::PaymentStatusUnknown,
    }
}

/// The shopper lands here from the gateway. Always 200: the body carries the state.
pub async fn confirm_return(State(s): State<AppState>, Path(id): Path<String>, Query(params): Query<CallbackParams>) -> Json<ConfirmationResponse> {
    let session = s.sessions.get_or_create(&id).await;
    let mut guard = session.lock().await;
    let session = &mut *guard;
    let outcome = PaymentConfirmation::new(s.gateway.as_ref(), &s.orders, &s.events, s.redirect_trust)
        .run(&params, &mut session.session, &mut session.local, &mut session.cart)
        .await;
    let message = outcome_message(&outcome.state).text(session.language);
    Json(ConfirmationResponse { outcome, message })
}

/// Gateway notification. Fields come from the query string or a JSON body.
#[instrument(skip_all)]
pub async fn callback(State(s): State<AppState>, Query(query): Query<CallbackParams>, body: Bytes) -> (StatusCode, Json<Value>) {
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        query
    } else {
        match serde_json::from_slice::<CallbackParams>(&body) {
            Ok(params) => params,
            Err(e) => return (StatusCode::BAD_REQUEST, Json(json!({ "ok": false, "error": e.to_string() }))),
        }
    };
    let (Some(pay_id), Some(order_id)) = (params.pay_id.clone().filter(|p| !p.is_empty()), params.order_id.clone().filter(|o| !o.is_empty())) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "ok": false, "error": "payId and orderId are required" })));
    };

    let report = match s.gateway.process_callback(&params).await {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, %pay_id, "callback rejected");
            return (StatusCode::OK, Json(json!({ "ok": false, "payId": pay_id })));
        }
    };
    info!(%pay_id, %order_id, status = ?report.status, "callback verified");

    let mut row = Row::new();
    row.insert("pay_id".into(), json!(pay_id));
    row.insert("order_id".into(), json!(order_id));
    row.insert("status".into(), json!(report.status));
    row.insert("message".into(), json!(report.message));
    row.insert("payload".into(), json!(params.signed_fields()));
    row.insert("received_at".into(), json!(Utc::now()));
    if let Err(e) = s.store.insert(PAYMENT_EVENTS_TABLE, row).await {
        warn!(error = %e, %pay_id, "payment event not recorded");
    }
    (StatusCode::OK, Json(json!({ "ok": true, "payId": pay_id, "status": report.status })))
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundRequest { pub amount: Option<Decimal> }

/// Refunds a card order from this device's order history.
pub async fn refund(State(s): State<AppState>, Path((id, order_id)): Path<(String, String)>, body: Option<Json<RefundRequest>>) -> Result<Json<RefundReport>> {
    let amount = body.map(|Json(r)| r.amount).unwrap_or_default();
    if amount.is_some_and(|a| a <= Decimal::ZERO) {
        return Err(AppError::BadRequest("refund amount must be positive".into()));
    }
    let no_payment = || AppError::NotFound(format!("no card payment recorded for order {order_id}"));
    let session = s.sessions.get(&id).await.ok_or_else(no_payment)?;
    let pay_id = {
        let session = session.lock().await;
        let pay_ids: HashMap<String, String> = session.local.get_json(keys::ORDER_PAY_IDS)?.unwrap_or_default();
        pay_ids.get(&order_id).cloned().ok_or_else(no_payment)?
    };
    let report = s.gateway.refund(&pay_id, amount).await?;
    if report.ok {
        info!(%pay_id, %order_id, "payment refunded");
        s.events.publish(StoreEvent::PaymentRefunded { pay_id, amount: report.amount }).await;
    }
    Ok(Json(report))
}
