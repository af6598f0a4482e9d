//! Domain events and their publisher
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::aggregates::CategoryKey;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    OrderPlaced { order_id: String, email: String, total: Decimal, payment_method: String },
    OrderConfirmed { order_id: String, pay_id: Option<String> },
    OrderStatusChanged { order_id: String, status: String },
    PaymentFailed { pay_id: String, reason: String },
    PaymentRefunded { pay_id: String, amount: Option<Decimal> },
    ProductCreated { category: CategoryKey, key: String },
    ProductUpdated { category: CategoryKey, key: String },
    ProductDeleted { category: CategoryKey, key: String },
    UserRegistered { user_id: String, email: String },
}

impl StoreEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderPlaced { .. } => "order.placed",
            Self::OrderConfirmed { .. } => "order.confirmed",
            Self::OrderStatusChanged { .. } => "order.status_changed",
            Self::PaymentFailed { .. } => "payment.failed",
            Self::PaymentRefunded { .. } => "payment.refunded",
            Self::ProductCreated { .. } => "product.created",
            Self::ProductUpdated { .. } => "product.updated",
            Self::ProductDeleted { .. } => "product.deleted",
            Self::UserRegistered { .. } => "user.registered",
        }
    }
}

/// Fire-and-forget event sink. Publishing never fails the business operation.
#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
    prefix: String,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>, prefix: impl Into<String>) -> Self {
        Self { nats, prefix: prefix.into() }
    }

    /// Log-only publisher.
    pub fn disabled() -> Self { Self::default() }

    pub fn is_connected(&self) -> bool { self.nats.is_some() }

    pub fn subject_for(&self, event: &StoreEvent) -> String { format!("{}.{}", self.prefix, event.name()) }

    pub async fn publish(&self, event: StoreEvent) {
        let Some(client) = &self.nats else {
            tracing::debug!(event = event.name(), ?event, "event (no broker)");
            return;
        };
        let subject = self.subject_for(&event);
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => return tracing::warn!(error = %e, event = event.name(), "event serialization failed"),
        };
        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            tracing::warn!(error = %e, %subject, "event publish failed");
        }
    }
}
