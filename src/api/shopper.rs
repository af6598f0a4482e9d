//! Session, cart and checkout handlers.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::{AppError, Result};
use super::AppState;
use crate::domain::aggregates::{CartItem, CategoryKey, LineKey, Registration, UserProfile};
use crate::domain::loyalty::{self, NextTier, Tier};
use crate::domain::value_objects::{Currency, Language};
use crate::locale::Message;
use crate::services::auth::AuthError;
use crate::services::catalog::CatalogError;
use crate::services::checkout::{self, Checkout, CheckoutForm, CheckoutResult};
use crate::session::{ClientSession, Preferences};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    items: Vec<CartItem>,
    total_items: u64,
    total_price: Decimal,
    formatted_total: String,
}

impl CartView {
    pub fn of(session: &ClientSession) -> Self {
        let cart = &session.cart;
        Self {
            items: cart.items().to_vec(),
            total_items: cart.total_items(),
            total_price: cart.total_price(),
            formatted_total: session.currency.format(cart.total_price()),
        }
    }
}

fn snapshot_of(session: &ClientSession) -> Value {
    json!({
        "user": session.auth.current(),
        "cart": CartView::of(session),
        "preferences": session.preferences(),
    })
}

/// An unknown session reads as a fresh one without being opened.
pub async fn snapshot(State(s): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    match s.sessions.get(&id).await {
        Some(session) => Json(snapshot_of(&*session.lock().await)),
        None => Json(snapshot_of(&ClientSession::new())),
    }
}

#[derive(Debug, Deserialize)]
pub struct PreferencesRequest { pub currency: Option<String>, pub language: Option<Language> }

pub async fn set_preferences(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<PreferencesRequest>) -> Result<Json<Preferences>> {
    let currency = r.currency.map(|c| c.parse::<Currency>()).transpose().map_err(|e| AppError::BadRequest(e.to_string()))?;
    let session = s.sessions.get_or_create(&id).await;
    let mut session = session.lock().await;
    if let Some(currency) = currency { session.currency = currency; }
    if let Some(language) = r.language { session.language = language; }
    Ok(Json(session.preferences()))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest { pub email: String, pub password: String }

pub async fn login(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<LoginRequest>) -> Result<Json<UserProfile>> {
    let session = s.sessions.get_or_create(&id).await;
    let mut guard = session.lock().await;
    let session = &mut *guard;
    let user = session.auth.login(s.auth.as_ref(), &mut session.local, &r.email, &r.password).await?;
    Ok(Json(user.clone()))
}

pub async fn register(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<Registration>) -> Result<(StatusCode, Json<UserProfile>)> {
    let session = s.sessions.get_or_create(&id).await;
    let mut guard = session.lock().await;
    let session = &mut *guard;
    let user = session.auth.register(s.auth.as_ref(), &mut session.local, &r, s.registration_bonus).await?;
    Ok((StatusCode::CREATED, Json(user.clone())))
}

pub async fn logout(State(s): State<AppState>, Path(id): Path<String>) -> StatusCode {
    let Some(session) = s.sessions.get(&id).await else { return StatusCode::NO_CONTENT };
    let mut guard = session.lock().await;
    let session = &mut *guard;
    session.auth.logout(&mut session.local);
    StatusCode::NO_CONTENT
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyView {
    total_spent: Decimal,
    formatted_spent: String,
    tier: Tier,
    next: Option<NextTier>,
    /// Percent applied to the next purchase, bonus included.
    active_discount_percent: Decimal,
}

pub async fn loyalty(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<LoyaltyView>> {
    let session = s.sessions.get(&id).await.ok_or(AuthError::NotAuthenticated)?;
    let session = session.lock().await;
    let user = session.auth.current().ok_or(AuthError::NotAuthenticated)?;
    Ok(Json(LoyaltyView {
        total_spent: user.total_spent,
        formatted_spent: session.currency.format(user.total_spent),
        tier: loyalty::tier(user.total_spent),
        next: loyalty::next_tier(user.total_spent),
        active_discount_percent: loyalty::discount_for(user, Decimal::ONE_HUNDRED, Utc::now()),
    }))
}

pub async fn get_cart(State(s): State<AppState>, Path(id): Path<String>) -> Json<CartView> {
    match s.sessions.get(&id).await {
        Some(session) => Json(CartView::of(&*session.lock().await)),
        None => Json(CartView::of(&ClientSession::new())),
    }
}

/// Only the product reference is taken from the client; name and price come
/// from the catalog.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

pub async fn add_to_cart(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<AddItemRequest>) -> Result<Json<CartView>> {
    let category = r.category.as_deref().map(str::parse::<CategoryKey>).transpose().map_err(CatalogError::from)?;
    let item = s.catalog.cart_item(category, &r.product_id, r.variant_id).await?;
    let session = s.sessions.get_or_create(&id).await;
    let mut session = session.lock().await;
    session.cart.add_item(item)?;
    Ok(Json(CartView::of(&session)))
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    #[serde(flatten)]
    pub line: LineKey,
    pub quantity: i64,
}

pub async fn update_quantity(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<QuantityRequest>) -> Result<Json<CartView>> {
    let session = s.sessions.get_or_create(&id).await;
    let mut session = session.lock().await;
    session.cart.update_quantity(&r.line, r.quantity)?;
    Ok(Json(CartView::of(&session)))
}

pub async fn remove_from_cart(State(s): State<AppState>, Path((id, product_id)): Path<(String, String)>) -> Json<CartView> {
    let session = s.sessions.get_or_create(&id).await;
    let mut session = session.lock().await;
    session.cart.remove_item(&product_id);
    Json(CartView::of(&session))
}

pub async fn clear_cart(State(s): State<AppState>, Path(id): Path<String>) -> Json<CartView> {
    let session = s.sessions.get_or_create(&id).await;
    let mut session = session.lock().await;
    session.cart.clear();
    Json(CartView::of(&session))
}

pub async fn quick_checkout(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<checkout::QuickCheckout>> {
    let session = s.sessions.get_or_create(&id).await;
    let mut guard = session.lock().await;
    let session = &mut *guard;
    let done = checkout::quick_checkout(&mut session.cart, &mut session.auth, s.auth.as_ref(), &mut session.local).await?;
    Ok(Json(done))
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    #[serde(flatten)]
    result: CheckoutResult,
    message: String,
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

pub async fn checkout(State(s): State<AppState>, Path(id): Path<String>, headers: HeaderMap, Json(form): Json<CheckoutForm>) -> Result<Json<CheckoutResponse>> {
    let session = s.sessions.get_or_create(&id).await;
    let mut guard = session.lock().await;
    let session = &mut *guard;
    let user = session.auth.current().cloned();
    let result = Checkout::new(&s.orders, s.gateway.as_ref())
        .submit(&form, user.as_ref(), &mut session.cart, &mut session.session, &mut session.local, session.language, client_ip(&headers))
        .await?;
    let message = match result {
        CheckoutResult::Placed { .. } => Message::OrderPlaced,
        CheckoutResult::RedirectToPayment { .. } => Message::PaymentRedirect,
    };
    Ok(Json(CheckoutResponse { message: message.text(session.language), result }))
}
