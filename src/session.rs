//! Per-client state: cart, signed-in user, device storage and preferences.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

use crate::domain::aggregates::{CartStore, CategoryKey};
use crate::domain::value_objects::{Currency, Language};
use crate::services::auth::SessionStore;
use crate::storage::{keys, KeyValueStore, MemoryStorage, StorageError};

/// Everything one shopper's device owns. Handlers lock it for the duration
/// of an operation, so operations on one session never interleave.
#[derive(Debug, Default)]
pub struct ClientSession {
    pub cart: CartStore,
    pub auth: SessionStore,
    pub local: MemoryStorage,
    pub session: MemoryStorage,
    pub currency: Currency,
    pub language: Language,
}

impl ClientSession {
    pub fn new() -> Self { Self::default() }

    /// Session over existing device storage; a stored profile signs the user back in.
    pub fn with_local(mut local: MemoryStorage) -> Self {
        let auth = SessionStore::restore(&mut local);
        Self { auth, local, ..Self::default() }
    }

    /// Mirrors the category list into device storage and returns it.
    pub fn cache_categories(&mut self) -> Result<Vec<CategoryKey>, StorageError> {
        let categories = CategoryKey::ALL.to_vec();
        self.local.set_json(keys::CATEGORIES, &categories)?;
        Ok(categories)
    }

    pub fn preferences(&self) -> Preferences { Preferences { currency: self.currency, language: self.language } }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Preferences {
    pub currency: Currency,
    pub language: Language,
}

pub type SharedSession = Arc<Mutex<ClientSession>>;

struct Live {
    session: SharedSession,
    touched: Instant,
}

/// Device storage of an evicted session, waiting for the device to return.
struct Parked {
    local: MemoryStorage,
    since: Instant,
}

#[derive(Default)]
struct Sessions {
    live: HashMap<String, Live>,
    parked: HashMap<String, Parked>,
}

/// Live client sessions by id. Idle sessions are evicted by [`sweep`]; their
/// device storage outlives them for a while, so a returning device is still
/// signed in.
///
/// [`sweep`]: SessionRegistry::sweep
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Sessions>,
}

impl SessionRegistry {
    pub fn new() -> Self { Self::default() }

    /// Existing session, revived from parked device storage if it was evicted.
    /// Never opens a fresh one.
    pub async fn get(&self, id: &str) -> Option<SharedSession> {
        let mut inner = self.inner.write().await;
        Self::touch_or_revive(&mut inner, id)
    }

    pub async fn get_or_create(&self, id: &str) -> SharedSession {
        let mut inner = self.inner.write().await;
        if let Some(existing) = Self::touch_or_revive(&mut inner, id) { return existing; }
        debug!(session = id, "client session opened");
        let session = Arc::new(Mutex::new(ClientSession::new()));
        inner.live.insert(id.to_string(), Live { session: session.clone(), touched: Instant::now() });
        session
    }

    fn touch_or_revive(inner: &mut Sessions, id: &str) -> Option<SharedSession> {
        let now = Instant::now();
        if let Some(live) = inner.live.get_mut(id) {
            live.touched = now;
            return Some(live.session.clone());
        }
        let parked = inner.parked.remove(id)?;
        debug!(session = id, "client session restored from device storage");
        let session = Arc::new(Mutex::new(ClientSession::with_local(parked.local)));
        inner.live.insert(id.to_string(), Live { session: session.clone(), touched: now });
        Some(session)
    }

    /// Evicts sessions idle for at least `idle` and drops device storage parked
    /// longer than `retention`. Sessions locked by a request are skipped.
    pub async fn sweep(&self, idle: Duration, retention: Duration) -> usize {
        let mut inner = self.inner.write().await;
        let Sessions { live, parked } = &mut *inner;
        let now = Instant::now();
        let idle_ids: Vec<String> = live.iter().filter(|(_, l)| now.duration_since(l.touched) >= idle).map(|(id, _)| id.clone()).collect();
        let mut evicted = 0;
        for id in idle_ids {
            let Some(entry) = live.get(&id) else { continue };
            let Ok(mut session) = entry.session.try_lock() else { continue };
            let local = std::mem::take(&mut session.local);
            drop(session);
            live.remove(&id);
            if !local.is_empty() { parked.insert(id, Parked { local, since: now }); }
            evicted += 1;
        }
        parked.retain(|_, p| now.duration_since(p.since) < retention);
        if evicted > 0 { debug!(evicted, live = live.len(), parked = parked.len(), "idle client sessions evicted"); }
        evicted
    }

    pub async fn len(&self) -> usize { self.inner.read().await.live.len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::UserProfile;

    #[tokio::test]
    async fn test_registry_returns_same_session() {
        let registry = SessionRegistry::new();
        let a = registry.get_or_create("s1").await;
        a.lock().await.currency = Currency::Eur;
        let b = registry.get_or_create("s1").await;
        assert_eq!(b.lock().await.currency, Currency::Eur);
        registry.get_or_create("s2").await;
        assert_eq!(registry.len().await, 2);
        assert!(registry.get("s3").await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_evicts_idle_sessions_and_keeps_device_storage() {
        let registry = SessionRegistry::new();
        let signed_in = registry.get_or_create("s1").await;
        signed_in.lock().await.local.set_json(keys::PROFILE, &UserProfile::new("u1", "Ana", "ana@example.com", "")).unwrap();
        registry.get_or_create("s2").await;

        assert_eq!(registry.sweep(Duration::from_secs(3600), Duration::from_secs(3600)).await, 0);
        assert_eq!(registry.sweep(Duration::ZERO, Duration::from_secs(3600)).await, 2);
        assert_eq!(registry.len().await, 0);

        // s1 comes back signed in; s2 left nothing behind.
        let revived = registry.get("s1").await.unwrap();
        assert!(revived.lock().await.auth.is_authenticated());
        assert!(registry.get("s2").await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_skips_busy_sessions_and_expires_parked_storage() {
        let registry = SessionRegistry::new();
        let busy = registry.get_or_create("busy").await;
        let guard = busy.lock().await;
        let idle = registry.get_or_create("idle").await;
        idle.lock().await.local.set(keys::MY_ORDERS, "[]".into());
        drop(idle);

        assert_eq!(registry.sweep(Duration::ZERO, Duration::ZERO).await, 1);
        assert_eq!(registry.len().await, 1);
        drop(guard);
        assert!(registry.get("idle").await.is_none());
    }

    #[test]
    fn test_stored_profile_restores_sign_in() {
        let mut local = MemoryStorage::new();
        local.set_json(keys::PROFILE, &UserProfile::new("u1", "Ana", "ana@example.com", "")).unwrap();
        let session = ClientSession::with_local(local);
        assert!(session.auth.is_authenticated());
        assert_eq!(session.language, Language::Ro);
    }

    #[test]
    fn test_categories_cached_locally() {
        let mut session = ClientSession::new();
        let categories = session.cache_categories().unwrap();
        assert_eq!(categories.len(), 14);
        let stored: Vec<CategoryKey> = session.local.get_json(keys::CATEGORIES).unwrap().unwrap();
        assert_eq!(stored, categories);
    }
}
