//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Highest unit price a cart line accepts, in the base currency.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);
/// Highest quantity of one cart line.
pub const MAX_LINE_QUANTITY: u32 = 999;

/// Row identity inside a cart. Different variants of one product stay distinct rows.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineKey {
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
}

impl LineKey {
    pub fn product(product_id: impl Into<String>) -> Self { Self { product_id: product_id.into(), variant_id: None } }
    pub fn variant(product_id: impl Into<String>, variant_id: impl Into<String>) -> Self {
        Self { product_id: product_id.into(), variant_id: Some(variant_id.into()) }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub image_ref: String,
}

impl CartItem {
    pub fn key(&self) -> LineKey { LineKey { product_id: self.product_id.clone(), variant_id: self.variant_id.clone() } }
    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity) }
    fn matches(&self, key: &LineKey) -> bool { self.product_id == key.product_id && self.variant_id == key.variant_id }
}

/// What a caller hands to `add_item`; quantity is owned by the cart.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCartItem {
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    pub name: String,
    pub unit_price: Decimal,
    #[serde(default)]
    pub image_ref: String,
}

/// Ordered, in-memory cart owned by one client session.
#[derive(Clone, Debug, Serialize)]
pub struct CartStore {
    items: Vec<CartItem>,
    updated_at: DateTime<Utc>,
}

impl Default for CartStore {
    fn default() -> Self { Self::new() }
}

impl CartStore {
    pub fn new() -> Self { Self { items: vec![], updated_at: Utc::now() } }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Increments an existing row by one, otherwise appends a new row with quantity 1.
    pub fn add_item(&mut self, item: NewCartItem) -> Result<(), CartError> {
        if item.unit_price < Decimal::ZERO { return Err(CartError::NegativePrice); }
        if item.unit_price > MAX_UNIT_PRICE { return Err(CartError::PriceTooHigh); }
        let key = LineKey { product_id: item.product_id.clone(), variant_id: item.variant_id.clone() };
        if let Some(existing) = self.items.iter_mut().find(|i| i.matches(&key)) {
            if existing.quantity >= MAX_LINE_QUANTITY { return Err(CartError::QuantityTooHigh); }
            existing.quantity += 1;
        } else {
            self.items.push(CartItem {
                product_id: item.product_id, variant_id: item.variant_id, name: item.name,
                unit_price: item.unit_price, quantity: 1, image_ref: item.image_ref,
            });
        }
        self.touch();
        Ok(())
    }

    /// Deletes every row of the product, whatever its variant.
    pub fn remove_item(&mut self, product_id: &str) {
        self.items.retain(|i| i.product_id != product_id);
        self.touch();
    }

    pub fn remove_line(&mut self, key: &LineKey) {
        self.items.retain(|i| !i.matches(key));
        self.touch();
    }

    /// `quantity <= 0` removes the row.
    pub fn update_quantity(&mut self, key: &LineKey, quantity: i64) -> Result<(), CartError> {
        if quantity <= 0 {
            self.remove_line(key);
            return Ok(());
        }
        let quantity = u32::try_from(quantity).ok().filter(|q| *q <= MAX_LINE_QUANTITY).ok_or(CartError::QuantityTooHigh)?;
        if let Some(item) = self.items.iter_mut().find(|i| i.matches(key)) {
            item.quantity = quantity;
        }
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    pub fn total_items(&self) -> u64 { self.items.iter().map(|i| u64::from(i.quantity)).sum() }
    pub fn total_price(&self) -> Decimal { self.items.iter().map(CartItem::line_total).sum() }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    #[error("unit price must not be negative")]
    NegativePrice,
    #[error("unit price is above the accepted maximum")]
    PriceTooHigh,
    #[error("at most 999 pieces of one product per order")]
    QuantityTooHigh,
    #[error("cart is empty")]
    Empty,
    #[error("sign in to complete the order")]
    NotAuthenticated,
}
