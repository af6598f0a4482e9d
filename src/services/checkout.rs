//! Checkout: form validation, order assembly and submission.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{
    CartError, CartStore, CustomerInfo, DeliveryMethod, Order, OrderDraft, OrderError, OrderLine, PaymentMethod, PostalAddress,
    UserProfile,
};
use crate::domain::loyalty;
use crate::domain::value_objects::Language;
use crate::locale::Message;
use crate::payment::{GatewayError, PaymentGateway, PaymentItem, PaymentRequest};
use crate::services::auth::{AuthError, AuthProvider, SessionStore};
use crate::services::orders::{OrderService, OrderServiceError};
use crate::storage::{remember_order, KeyValueStore, PendingPaymentSession, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("field {0} is required")]
    MissingField(&'static str),
    #[error("terms and conditions must be accepted")]
    TermsNotAccepted,
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Order(#[from] OrderServiceError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CheckoutError {
    /// Localizable message for the shopper, when one applies.
    pub fn message(&self) -> Option<Message> {
        match self {
            Self::MissingField(field) => Some(Message::FieldRequired(*field)),
            Self::TermsNotAccepted => Some(Message::TermsNotAccepted),
            Self::Cart(CartError::Empty) => Some(Message::CartEmpty),
            Self::Cart(CartError::NotAuthenticated) | Self::Auth(AuthError::NotAuthenticated) => Some(Message::SignInRequired),
            Self::Order(_) => Some(Message::OrderNotSaved),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub delivery_method: DeliveryMethod,
    pub payment_method: PaymentMethod,
    pub notes: String,
    pub accept_terms: bool,
}

impl CheckoutForm {
    /// Reports the first missing field in form order, then the terms flag.
    pub fn validate(&self) -> Result<(), CheckoutError> {
        let required: [(&'static str, &str); 7] = [
            ("firstName", &self.first_name),
            ("lastName", &self.last_name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("address", &self.address),
            ("city", &self.city),
            ("postalCode", &self.postal_code),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(CheckoutError::MissingField(*field));
        }
        if !self.accept_terms { return Err(CheckoutError::TermsNotAccepted); }
        Ok(())
    }

    pub fn customer(&self) -> CustomerInfo {
        CustomerInfo {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            address: PostalAddress { street: self.address.trim().to_string(), city: self.city.trim().to_string(), postal_code: self.postal_code.trim().to_string() },
        }
    }

    /// Order payload from the live cart; totals are recomputed from its lines.
    pub fn assemble(&self, cart: &CartStore) -> Result<OrderDraft, CheckoutError> {
        let lines: Vec<OrderLine> = cart.items().iter().map(OrderLine::from).collect();
        OrderDraft::assemble(self.customer(), lines, self.delivery_method, self.payment_method, self.notes.trim().to_string())
            .map_err(|e| match e {
                OrderError::NoItems => CheckoutError::Cart(CartError::Empty),
                other => CheckoutError::Order(OrderServiceError::Order(other)),
            })
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckoutResult {
    Placed { order: Order },
    #[serde(rename_all = "camelCase")]
    RedirectToPayment { pay_id: String, redirect_url: String },
}

/// Result of the cart's one-step checkout.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickCheckout {
    pub total: Decimal,
    pub discount: Decimal,
    pub charged: Decimal,
    pub profile: UserProfile,
}

pub struct Checkout<'a> {
    pub orders: &'a OrderService,
    pub gateway: &'a dyn PaymentGateway,
}

impl<'a> Checkout<'a> {
    pub fn new(orders: &'a OrderService, gateway: &'a dyn PaymentGateway) -> Self { Self { orders, gateway } }

    /// Cash and transfer orders are saved now; card orders are parked and
    /// the shopper is sent to the gateway.
    #[instrument(skip_all, fields(payment = form.payment_method.as_str(), delivery = form.delivery_method.as_str()))]
    #[allow(clippy::too_many_arguments)]
    pub async fn submit<S: KeyValueStore, L: KeyValueStore>(
        &self,
        form: &CheckoutForm,
        user: Option<&UserProfile>,
        cart: &mut CartStore,
        session: &mut S,
        local: &mut L,
        language: Language,
        client_ip: Option<String>,
    ) -> Result<CheckoutResult, CheckoutError> {
        if cart.is_empty() { return Err(CartError::Empty.into()); }
        if user.is_none() { return Err(CartError::NotAuthenticated.into()); }
        form.validate()?;
        let draft = form.assemble(cart)?;

        if !form.payment_method.requires_gateway() {
            let order = self.orders.create(&draft, None).await?;
            if let Err(e) = remember_order(local, &order.id, None) {
                warn!(error = %e, "order history not updated");
            }
            cart.clear();
            info!(order_id = %order.id, "order placed");
            return Ok(CheckoutResult::Placed { order });
        }

        let order_ref = Uuid::now_v7().to_string();
        let request = PaymentRequest {
            order_ref: order_ref.clone(),
            amount: draft.totals.total,
            description: format!("Comanda {order_ref}"),
            language,
            client_name: format!("{} {}", draft.customer.first_name, draft.customer.last_name),
            email: draft.customer.email.clone(),
            phone: Some(draft.customer.phone.clone()),
            client_ip,
            items: draft.items.iter().map(|l| PaymentItem { id: l.product_id.clone(), name: l.name.clone(), price: l.price, quantity: l.quantity }).collect(),
        };
        let payment = self.gateway.initiate(&request).await?;
        PendingPaymentSession { order_data: draft, pay_id: payment.pay_id.clone(), order_ref }.save(session)?;
        info!(pay_id = %payment.pay_id, "redirecting to payment");
        Ok(CheckoutResult::RedirectToPayment { pay_id: payment.pay_id, redirect_url: payment.redirect_url })
    }
}

/// One-step cart checkout: applies the shopper's discount, adds the charged
/// amount to their spend, then empties the cart. The cart is left untouched if
/// the spend update fails.
#[instrument(skip_all)]
pub async fn quick_checkout<L: KeyValueStore>(cart: &mut CartStore, auth_session: &mut SessionStore, auth: &dyn AuthProvider, local: &mut L) -> Result<QuickCheckout, CheckoutError> {
    if cart.is_empty() { return Err(CartError::Empty.into()); }
    let user = auth_session.current().ok_or(CartError::NotAuthenticated)?;
    let total = cart.total_price();
    let discount = loyalty::discount_for(user, total, Utc::now());
    let charged = total - discount;
    let profile = auth_session.record_spend(auth, local, charged).await?.clone();
    cart.clear();
    Ok(QuickCheckout { total, discount, charged, profile })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::NewCartItem;
    use rust_decimal_macros::dec;

    fn form() -> CheckoutForm {
        CheckoutForm {
            first_name: "Ana".into(), last_name: "Popescu".into(), email: "ana@example.com".into(), phone: "+37360000000".into(),
            address: "Str. Test 1".into(), city: "Chișinău".into(), postal_code: "MD-2001".into(),
            delivery_method: DeliveryMethod::Express, payment_method: PaymentMethod::Cash, notes: String::new(), accept_terms: true,
        }
    }

    #[test]
    fn test_first_missing_field_wins() {
        let mut f = form();
        f.city = " ".into();
        f.phone = String::new();
        assert!(matches!(f.validate(), Err(CheckoutError::MissingField("phone"))));
        f.phone = "1".into();
        assert!(matches!(f.validate(), Err(CheckoutError::MissingField("city"))));
    }

    #[test]
    fn test_terms_checked_after_fields() {
        let mut f = form();
        f.accept_terms = false;
        assert!(matches!(f.validate(), Err(CheckoutError::TermsNotAccepted)));
        f.first_name.clear();
        assert!(matches!(f.validate(), Err(CheckoutError::MissingField("firstName"))));
    }

    #[test]
    fn test_assembled_totals_match_cart() {
        let mut cart = CartStore::new();
        for (id, price) in [("A", dec!(45)), ("A", dec!(45)), ("B", dec!(60))] {
            cart.add_item(NewCartItem { product_id: id.into(), variant_id: None, name: id.into(), unit_price: price, image_ref: String::new() }).unwrap();
        }
        let draft = form().assemble(&cart).unwrap();
        assert_eq!(draft.totals.subtotal, cart.total_price());
        assert_eq!(draft.totals.total, draft.totals.subtotal + draft.totals.delivery);
        assert_eq!(draft.totals.total, dec!(175));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(CheckoutError::Cart(CartError::NotAuthenticated).message(), Some(Message::SignInRequired));
        assert_eq!(CheckoutError::MissingField("email").message(), Some(Message::FieldRequired("email")));
    }
}
