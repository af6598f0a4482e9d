//! HTTP error mapping.
//!
//! Every failure renders as `{"error": <code>, "messages": {"RO": .., "RU": ..}}`,
//! plus `fields` for validation failures. Internal details are logged, never sent.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::aggregates::{CartError, FieldViolation, OrderError};
use crate::domain::value_objects::Language;
use crate::locale::Message;
use crate::payment::GatewayError;
use crate::persistence::PersistenceError;
use crate::services::auth::AuthError;
use crate::services::catalog::CatalogError;
use crate::services::checkout::CheckoutError;
use crate::services::orders::OrderServiceError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Orders(#[from] OrderServiceError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

struct Rendered {
    status: StatusCode,
    code: &'static str,
    message: Option<Message>,
    fields: Vec<FieldViolation>,
    detail: Option<String>,
}

impl Rendered {
    fn new(status: StatusCode, code: &'static str) -> Self { Self { status, code, message: None, fields: vec![], detail: None } }
    fn message(mut self, message: Message) -> Self { self.message = Some(message); self }
    fn detail(mut self, detail: impl ToString) -> Self { self.detail = Some(detail.to_string()); self }
    fn fields(mut self, fields: &[FieldViolation]) -> Self { self.fields = fields.to_vec(); self }
}

fn cart(e: &CartError) -> Rendered {
    match e {
        CartError::Empty => Rendered::new(StatusCode::BAD_REQUEST, "cart_empty").message(Message::CartEmpty),
        CartError::NotAuthenticated => Rendered::new(StatusCode::UNAUTHORIZED, "sign_in_required").message(Message::SignInRequired),
        CartError::NegativePrice => Rendered::new(StatusCode::UNPROCESSABLE_ENTITY, "negative_price").detail(e),
        CartError::PriceTooHigh => Rendered::new(StatusCode::UNPROCESSABLE_ENTITY, "price_out_of_range").detail(e),
        CartError::QuantityTooHigh => Rendered::new(StatusCode::UNPROCESSABLE_ENTITY, "quantity_out_of_range").detail(e),
    }
}

fn auth(e: &AuthError) -> Rendered {
    match e {
        AuthError::InvalidCredentials => Rendered::new(StatusCode::UNAUTHORIZED, "invalid_credentials").detail(e),
        AuthError::UserAlreadyExists => Rendered::new(StatusCode::CONFLICT, "user_exists").detail(e),
        AuthError::NotAuthenticated => Rendered::new(StatusCode::UNAUTHORIZED, "sign_in_required").message(Message::SignInRequired),
        AuthError::Forbidden => Rendered::new(StatusCode::FORBIDDEN, "admin_required").message(Message::AdminRequired),
        AuthError::Invalid(fields) => Rendered::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_registration").fields(fields),
        AuthError::Persistence(e) => persistence(e),
        AuthError::PasswordHash | AuthError::Malformed(_) | AuthError::Storage(_) => internal(),
    }
}

fn orders(e: &OrderServiceError) -> Rendered {
    match e {
        OrderServiceError::NotFound(_) => Rendered::new(StatusCode::NOT_FOUND, "order_not_found").detail(e),
        OrderServiceError::Order(OrderError::NoItems) => Rendered::new(StatusCode::BAD_REQUEST, "cart_empty").message(Message::CartEmpty),
        OrderServiceError::Order(OrderError::TotalOutOfRange) => Rendered::new(StatusCode::UNPROCESSABLE_ENTITY, "amount_out_of_range").detail(e),
        OrderServiceError::Order(e) => Rendered::new(StatusCode::CONFLICT, "invalid_status").detail(e),
        OrderServiceError::Persistence(_) | OrderServiceError::Malformed(_) => {
            Rendered::new(StatusCode::INTERNAL_SERVER_ERROR, "order_not_saved").message(Message::OrderNotSaved)
        }
    }
}

fn gateway(e: &GatewayError) -> Rendered {
    match e {
        GatewayError::NotConfigured => Rendered::new(StatusCode::SERVICE_UNAVAILABLE, "payments_unavailable"),
        GatewayError::MissingSignature | GatewayError::InvalidSignature => Rendered::new(StatusCode::UNAUTHORIZED, "invalid_signature"),
        GatewayError::Transport(_) | GatewayError::Http { .. } | GatewayError::Decode(_) => {
            Rendered::new(StatusCode::BAD_GATEWAY, "gateway_error").message(Message::PaymentFailed)
        }
    }
}

fn persistence(e: &PersistenceError) -> Rendered {
    match e {
        PersistenceError::Conflict { .. } => Rendered::new(StatusCode::CONFLICT, "conflict"),
        PersistenceError::NotFound { .. } => Rendered::new(StatusCode::NOT_FOUND, "not_found"),
        PersistenceError::Overflow { .. } => Rendered::new(StatusCode::UNPROCESSABLE_ENTITY, "amount_out_of_range"),
        PersistenceError::Decode(_) | PersistenceError::Database(_) => internal(),
    }
}

fn internal() -> Rendered { Rendered::new(StatusCode::INTERNAL_SERVER_ERROR, "internal") }

impl AppError {
    fn render(&self) -> Rendered {
        match self {
            Self::Cart(e) => cart(e),
            Self::Checkout(e) => match e {
                CheckoutError::Cart(e) => cart(e),
                CheckoutError::Auth(e) => auth(e),
                CheckoutError::Order(e) => orders(e),
                CheckoutError::Gateway(e) => gateway(e),
                CheckoutError::Storage(_) => internal(),
                CheckoutError::MissingField(field) => Rendered::new(StatusCode::UNPROCESSABLE_ENTITY, "field_required")
                    .message(Message::FieldRequired(*field))
                    .fields(&[FieldViolation { field: (*field).to_string(), message: e.to_string() }]),
                CheckoutError::TermsNotAccepted => Rendered::new(StatusCode::UNPROCESSABLE_ENTITY, "terms_not_accepted").message(Message::TermsNotAccepted),
            },
            Self::Auth(e) => auth(e),
            Self::Catalog(e) => match e {
                CatalogError::UnknownCategory(_) => Rendered::new(StatusCode::NOT_FOUND, "unknown_category").detail(e),
                CatalogError::NotFound(_) => Rendered::new(StatusCode::NOT_FOUND, "product_not_found").detail(e),
                CatalogError::Invalid(fields) => Rendered::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_product").fields(fields),
                CatalogError::UnknownField(_) => Rendered::new(StatusCode::UNPROCESSABLE_ENTITY, "unknown_field").detail(e),
                CatalogError::DuplicateSku => Rendered::new(StatusCode::CONFLICT, "duplicate_sku").message(Message::DuplicateSku),
                CatalogError::NotConfirmed => Rendered::new(StatusCode::BAD_REQUEST, "delete_not_confirmed").message(Message::DeleteNotConfirmed),
                CatalogError::Persistence(e) => persistence(e),
            },
            Self::Orders(e) => orders(e),
            Self::Gateway(e) => gateway(e),
            Self::Storage(_) => internal(),
            Self::Persistence(e) => persistence(e),
            Self::BadRequest(msg) => Rendered::new(StatusCode::BAD_REQUEST, "bad_request").detail(msg),
            Self::NotFound(msg) => Rendered::new(StatusCode::NOT_FOUND, "not_found").detail(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let rendered = self.render();
        if rendered.status.is_server_error() {
            tracing::error!(error = %self, status = rendered.status.as_u16(), "Request error");
        } else {
            tracing::debug!(error = %self, status = rendered.status.as_u16(), "Request rejected");
        }
        let mut body = json!({ "error": rendered.code });
        if let Some(message) = rendered.message {
            body["messages"] = json!({ "RO": message.text(Language::Ro), "RU": message.text(Language::Ru) });
        }
        if let Some(detail) = rendered.detail.filter(|_| !rendered.status.is_server_error()) {
            body["detail"] = json!(detail);
        }
        if !rendered.fields.is_empty() {
            body["fields"] = json!(rendered.fields);
        }
        (rendered.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::from(CatalogError::DuplicateSku).render().status, StatusCode::CONFLICT);
        assert_eq!(AppError::from(AuthError::Forbidden).render().status, StatusCode::FORBIDDEN);
        assert_eq!(AppError::from(CheckoutError::TermsNotAccepted).render().status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::from(GatewayError::Decode("x".into())).render().status, StatusCode::BAD_GATEWAY);
        assert_eq!(AppError::from(OrderServiceError::NotFound("o".into())).render().status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_internal_detail_hidden() {
        let rendered = AppError::from(OrderServiceError::Malformed("column x".into())).render();
        assert_eq!(rendered.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(rendered.message, Some(Message::OrderNotSaved));
    }
}
