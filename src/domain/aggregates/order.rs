//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::aggregates::cart::CartItem;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: PostalAddress,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress { pub street: String, pub city: String, pub postal_code: String }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    pub name: String,
    pub quantity: u32,
    pub price: Decimal,
}

impl From<&CartItem> for OrderLine {
    fn from(item: &CartItem) -> Self {
        Self { product_id: item.product_id.clone(), variant_id: item.variant_id.clone(), name: item.name.clone(), quantity: item.quantity, price: item.unit_price }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod { #[default] Standard, Express, Pickup }

impl DeliveryMethod {
    /// Delivery fee in the base currency.
    pub fn price(self) -> Decimal {
        match self {
            Self::Standard => Decimal::from(15),
            Self::Express => Decimal::from(25),
            Self::Pickup => Decimal::ZERO,
        }
    }
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Express => "express",
            Self::Pickup => "pickup",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod { #[default] Card, Cash, Transfer }

impl PaymentMethod {
    /// Card payments go through the gateway; the rest are persisted immediately.
    pub fn requires_gateway(self) -> bool { matches!(self, Self::Card) }
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Cash => "cash",
            Self::Transfer => "transfer",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery { pub method: DeliveryMethod, pub price: Decimal }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment { pub method: PaymentMethod }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals { pub subtotal: Decimal, pub delivery: Decimal, pub total: Decimal }

impl OrderTotals {
    pub fn compute(lines: &[OrderLine], delivery: Decimal) -> Result<Self, OrderError> {
        let subtotal = lines
            .iter()
            .try_fold(Decimal::ZERO, |acc, l| l.price.checked_mul(Decimal::from(l.quantity)).and_then(|t| acc.checked_add(t)))
            .ok_or(OrderError::TotalOutOfRange)?;
        let total = subtotal.checked_add(delivery).ok_or(OrderError::TotalOutOfRange)?;
        Ok(Self { subtotal, delivery, total })
    }
    pub fn is_consistent(&self) -> bool { self.total == self.subtotal + self.delivery }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Confirmed, Processing, Shipped, Delivered, Cancelled }

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Confirmed => "confirmed", Self::Processing => "processing",
            Self::Shipped => "shipped", Self::Delivered => "delivered", Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    /// Linear progression with cancellation as a side branch from any open state.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (from, Cancelled) => !from.is_terminal(),
            (Pending, Confirmed) | (Confirmed, Processing) | (Processing, Shipped) | (Shipped, Delivered) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending), "confirmed" => Ok(Self::Confirmed), "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped), "delivered" => Ok(Self::Delivered), "cancelled" => Ok(Self::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

/// An order before persistence assigns it an id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub customer: CustomerInfo,
    pub items: Vec<OrderLine>,
    pub delivery: Delivery,
    pub payment: Payment,
    pub totals: OrderTotals,
    #[serde(default)]
    pub notes: String,
    pub status: OrderStatus,
}

impl OrderDraft {
    /// Builds a draft from live cart lines; totals are recomputed here, never copied.
    pub fn assemble(customer: CustomerInfo, items: Vec<OrderLine>, delivery: DeliveryMethod, payment: PaymentMethod, notes: String) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let delivery = Delivery { method: delivery, price: delivery.price() };
        let totals = OrderTotals::compute(&items, delivery.price)?;
        Ok(Self { customer, items, delivery, payment: Payment { method: payment }, totals, notes, status: OrderStatus::Pending })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    #[serde(flatten)]
    pub draft: OrderDraft,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn status(&self) -> OrderStatus { self.draft.status }

    pub fn transition(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.draft.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.draft.status, to: next });
        }
        self.draft.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("unknown order status: {0}")]
    UnknownStatus(String),
    #[error("order total is out of range")]
    TotalOutOfRange,
}
