//! HTTP surface.
//!
//! Shopper state lives under `/api/v1/sessions/:session`; each request locks
//! that session for its whole duration.

use axum::{
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::domain::events::EventPublisher;
use crate::payment::{PaymentGateway, RedirectTrust};
use crate::persistence::RowStore;
use crate::services::auth::{AuthProvider, BonusPolicy, TableAuthProvider};
use crate::services::catalog::CatalogService;
use crate::services::orders::OrderService;
use crate::session::SessionRegistry;

pub mod error;
mod catalog;
mod orders;
mod payments;
mod shopper;

pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RowStore>,
    pub orders: OrderService,
    pub catalog: CatalogService,
    pub auth: Arc<dyn AuthProvider>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub events: EventPublisher,
    pub sessions: Arc<SessionRegistry>,
    pub redirect_trust: RedirectTrust,
    pub registration_bonus: BonusPolicy,
}

impl AppState {
    pub fn new(store: Arc<dyn RowStore>, gateway: Arc<dyn PaymentGateway>, events: EventPublisher) -> Self {
        Self {
            orders: OrderService::new(store.clone(), events.clone()),
            catalog: CatalogService::new(store.clone(), events.clone()),
            auth: Arc::new(TableAuthProvider::new(store.clone(), events.clone())),
            store,
            gateway,
            events,
            sessions: Arc::new(SessionRegistry::new()),
            redirect_trust: RedirectTrust::default(),
            registration_bonus: BonusPolicy::default(),
        }
    }

    pub fn with_redirect_trust(mut self, trust: RedirectTrust) -> Self { self.redirect_trust = trust; self }

    pub fn with_registration_bonus(mut self, bonus: BonusPolicy) -> Self { self.registration_bonus = bonus; self }
}

pub fn router(state: AppState) -> Router {
    let session = Router::new()
        .route("/", get(shopper::snapshot))
        .route("/preferences", put(shopper::set_preferences))
        .route("/login", post(shopper::login))
        .route("/register", post(shopper::register))
        .route("/logout", post(shopper::logout))
        .route("/loyalty", get(shopper::loyalty))
        .route("/cart", get(shopper::get_cart).delete(shopper::clear_cart))
        .route("/cart/items", post(shopper::add_to_cart).put(shopper::update_quantity))
        .route("/cart/items/:product_id", delete(shopper::remove_from_cart))
        .route("/cart/checkout", post(shopper::quick_checkout))
        .route("/checkout", post(shopper::checkout))
        .route("/payment/return", get(payments::confirm_return))
        .route("/orders", get(orders::history))
        .route("/orders/:id/refund", post(payments::refund))
        .route("/categories", get(catalog::cache_categories))
        .route("/admin/categories/:category/products", get(catalog::admin_list).post(catalog::create))
        .route("/admin/categories/:category/products/:key", patch(catalog::update).delete(catalog::remove))
        .route("/admin/orders", get(orders::admin_list))
        .route("/admin/orders/:id/status", put(orders::update_status));

    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "adress-storefront"})) }))
        .route("/api/v1/categories", get(catalog::categories))
        .route("/api/v1/categories/:category/products", get(catalog::list))
        .route("/api/v1/currency/format", get(catalog::format_price))
        .route("/api/v1/orders/:id", get(orders::get_order))
        .route("/api/v1/payments/maib/callback", post(payments::callback))
        .nest("/api/v1/sessions/:session", session)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
