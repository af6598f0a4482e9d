//! Payment gateway boundary, the MAIB client and payment confirmation.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::domain::value_objects::Language;

pub mod confirmation;
pub mod maib;

pub use confirmation::{ConfirmationState, FailureReason, Outcome, PaymentConfirmation, RedirectTrust};
pub use maib::{MaibClient, MaibConfig};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway returned {status}: {message}")]
    Http { status: u16, message: String },
    #[error("callback carries no signature")]
    MissingSignature,
    #[error("callback signature mismatch")]
    InvalidSignature,
    #[error("unexpected gateway response: {0}")]
    Decode(String),
    #[error("payment gateway is not configured")]
    NotConfigured,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentItem {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
}

/// Everything the gateway needs to open a payment page.
#[derive(Clone, Debug)]
pub struct PaymentRequest {
    pub order_ref: String,
    pub amount: Decimal,
    pub description: String,
    pub language: Language,
    pub client_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub client_ip: Option<String>,
    pub items: Vec<PaymentItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub pay_id: String,
    pub redirect_url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Success,
    Failed,
    Cancelled,
    Pending,
    /// The gateway has no record of the payment yet.
    NotFound,
}

impl GatewayStatus {
    pub fn classify(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "SUCCESS" | "OK" | "APPROVED" => Self::Success,
            "FAILED" | "FAIL" | "DECLINED" => Self::Failed,
            "CANCELLED" | "CANCEL" => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    pub fn is_failure(self) -> bool { matches!(self, Self::Failed | Self::Cancelled) }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: GatewayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusReport {
    pub fn new(status: GatewayStatus) -> Self { Self { status, message: None } }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundReport {
    pub ok: bool,
    pub status: Option<String>,
    pub amount: Option<Decimal>,
}

/// Parameters the gateway appends to the return URL or posts to the callback.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackParams {
    #[serde(default, alias = "pay_id")]
    pub pay_id: Option<String>,
    #[serde(default, alias = "order_id")]
    pub order_id: Option<String>,
    #[serde(default, alias = "Status")]
    pub status: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CallbackParams {
    /// True when the redirect carries its own outcome rather than just a pay id.
    pub fn carries_outcome(&self) -> bool {
        [&self.pay_id, &self.order_id, &self.status].iter().all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }

    pub fn redirect_status(&self) -> Option<GatewayStatus> { self.status.as_deref().map(GatewayStatus::classify) }

    /// Every field except the signature, as the gateway signs them.
    pub fn signed_fields(&self) -> BTreeMap<String, String> {
        let mut fields: BTreeMap<String, String> = self.extra.iter().map(|(k, v)| (k.clone(), plain(v))).collect();
        let named = [("payId", &self.pay_id), ("orderId", &self.order_id), ("status", &self.status), ("transactionId", &self.transaction_id)];
        for (key, value) in named {
            if let Some(v) = value { fields.insert(key.to_string(), v.clone()); }
        }
        fields.remove("signature");
        fields
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentSession, GatewayError>;

    async fn check_status(&self, pay_id: &str, order_id: Option<&str>) -> Result<StatusReport, GatewayError>;

    /// Authenticates a callback and classifies its status. Unsigned or
    /// mis-signed payloads are errors, never a status.
    async fn process_callback(&self, params: &CallbackParams) -> Result<StatusReport, GatewayError>;

    async fn refund(&self, pay_id: &str, amount: Option<Decimal>) -> Result<RefundReport, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(GatewayStatus::classify("ok"), GatewayStatus::Success);
        assert_eq!(GatewayStatus::classify("APPROVED"), GatewayStatus::Success);
        assert_eq!(GatewayStatus::classify("declined"), GatewayStatus::Failed);
        assert_eq!(GatewayStatus::classify("CANCEL"), GatewayStatus::Cancelled);
        assert_eq!(GatewayStatus::classify("CREATED"), GatewayStatus::Pending);
    }

    #[test]
    fn test_signed_fields_skip_signature_and_keep_extras() {
        let params: CallbackParams = serde_json::from_value(serde_json::json!({
            "payId": "p1", "orderId": "o1", "status": "OK", "signature": "abc", "amount": 150.5, "note": null
        })).unwrap();
        let fields = params.signed_fields();
        assert!(!fields.contains_key("signature"));
        assert_eq!(fields["amount"], "150.5");
        assert_eq!(fields["note"], "");
        assert!(params.carries_outcome());
    }
}
