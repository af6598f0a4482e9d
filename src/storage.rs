//! Client-side key-value storage.
//!
//! Models the two storage areas a shopper's device owns: a durable `local`
//! area (profile, order history) and a short-lived `session` area (pending
//! payment, idempotency markers, confirmation state).

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::aggregates::OrderDraft;

/// Named keys. Per-payment keys are built with the helper functions.
pub mod keys {
    pub const PROFILE: &str = "user_profile";
    pub const CATEGORIES: &str = "categories";
    pub const PENDING_ORDER: &str = "pendingOrder";
    pub const LAST_PAY_ID: &str = "lastPayId";
    pub const MY_ORDERS: &str = "my_orders_ids";
    pub const ORDER_PAY_IDS: &str = "order_payids";

    /// Idempotency marker: holds the id of the order created for this payment.
    pub fn order_created(pay_id: &str) -> String { format!("order_created_{pay_id}") }

    /// Persisted confirmation state token.
    pub fn payment_state(pay_id: &str) -> String { format!("payment_state_{pay_id}") }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("corrupt value under {key}: {source}")]
    Corrupt { key: String, source: serde_json::Error },
    #[error("could not encode value for {key}: {source}")]
    Encode { key: String, source: serde_json::Error },
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError>
    where
        Self: Sized,
    {
        self.get(key)
            .map(|raw| serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt { key: key.to_string(), source }))
            .transpose()
    }

    fn set_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StorageError>
    where
        Self: Sized,
    {
        let raw = serde_json::to_string(value).map_err(|source| StorageError::Encode { key: key.to_string(), source })?;
        self.set(key, raw);
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> { self.entries.get(key).cloned() }
    fn set(&mut self, key: &str, value: String) { self.entries.insert(key.to_string(), value); }
    fn remove(&mut self, key: &str) { self.entries.remove(key); }
}

/// Order payload parked between "payment initiated" and "payment confirmed".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPaymentSession {
    pub order_data: OrderDraft,
    pub pay_id: String,
    /// Correlation id sent to the gateway with the payment.
    pub order_ref: String,
}

impl PendingPaymentSession {
    pub fn load<S: KeyValueStore>(store: &S) -> Result<Option<Self>, StorageError> { store.get_json(keys::PENDING_ORDER) }

    pub fn save<S: KeyValueStore>(&self, store: &mut S) -> Result<(), StorageError> {
        store.set_json(keys::PENDING_ORDER, self)?;
        store.set(keys::LAST_PAY_ID, self.pay_id.clone());
        Ok(())
    }

    /// Drops the pending payload and the last pay id together.
    pub fn discard<S: KeyValueStore>(store: &mut S) {
        store.remove(keys::PENDING_ORDER);
        store.remove(keys::LAST_PAY_ID);
    }
}

/// Appends an order id to the device's order history, once.
pub fn remember_order<S: KeyValueStore>(local: &mut S, order_id: &str, pay_id: Option<&str>) -> Result<(), StorageError> {
    let mut ids: Vec<String> = local.get_json(keys::MY_ORDERS).unwrap_or_default().unwrap_or_default();
    if !ids.iter().any(|id| id == order_id) {
        ids.push(order_id.to_string());
        local.set_json(keys::MY_ORDERS, &ids)?;
    }
    if let Some(pay_id) = pay_id {
        let mut pay_ids: HashMap<String, String> = local.get_json(keys::ORDER_PAY_IDS).unwrap_or_default().unwrap_or_default();
        pay_ids.insert(order_id.to_string(), pay_id.to_string());
        local.set_json(keys::ORDER_PAY_IDS, &pay_ids)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip_and_corruption() {
        let mut s = MemoryStorage::new();
        s.set_json("k", &vec![1, 2]).unwrap();
        assert_eq!(s.get_json::<Vec<i32>>("k").unwrap(), Some(vec![1, 2]));
        s.set("k", "{not json".into());
        assert!(matches!(s.get_json::<Vec<i32>>("k"), Err(StorageError::Corrupt { .. })));
        assert_eq!(s.get_json::<Vec<i32>>("missing").unwrap(), None);
    }

    #[test]
    fn test_remember_order_deduplicates() {
        let mut local = MemoryStorage::new();
        remember_order(&mut local, "o1", Some("p1")).unwrap();
        remember_order(&mut local, "o1", Some("p1")).unwrap();
        let ids: Vec<String> = local.get_json(keys::MY_ORDERS).unwrap().unwrap();
        assert_eq!(ids, ["o1"]);
        let pay_ids: HashMap<String, String> = local.get_json(keys::ORDER_PAY_IDS).unwrap().unwrap();
        assert_eq!(pay_ids["o1"], "p1");
    }
}
