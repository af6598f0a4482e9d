//! Authentication and the per-client session store.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{collect_violations, FieldViolation, Registration, RegistrationBonus, UserProfile};
use crate::domain::events::{EventPublisher, StoreEvent};
use crate::persistence::{PersistenceError, Row, RowStore};
use crate::storage::{keys, KeyValueStore, StorageError};

pub const PROFILES_TABLE: &str = "user_profiles";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user already exists")]
    UserAlreadyExists,
    #[error("not signed in")]
    NotAuthenticated,
    #[error("administrator rights required")]
    Forbidden,
    #[error("invalid registration")]
    Invalid(Vec<FieldViolation>),
    #[error("password hashing error")]
    PasswordHash,
    #[error("stored profile is malformed: {0}")]
    Malformed(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Credential checking and profile storage.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, AuthError>;
    async fn sign_up(&self, registration: &Registration, bonus: Option<RegistrationBonus>) -> Result<UserProfile, AuthError>;
    /// Adds to the stored cumulative spend and returns the profile as stored.
    async fn add_spend(&self, user_id: &str, amount: Decimal) -> Result<UserProfile, AuthError>;
}

/// Registration bonus granted to new accounts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BonusPolicy {
    pub percent: u8,
    pub lifetime: Duration,
}

impl Default for BonusPolicy {
    fn default() -> Self { Self { percent: 15, lifetime: Duration::hours(2) } }
}

impl BonusPolicy {
    pub fn grant(&self) -> Option<RegistrationBonus> {
        (self.percent > 0).then(|| RegistrationBonus::starting_now(self.percent, self.lifetime))
    }
}

#[derive(Serialize, Deserialize)]
struct ProfileRow {
    id: String,
    name: String,
    email: String,
    phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password_hash: Option<String>,
    total_spent: Decimal,
    #[serde(default)]
    is_admin: bool,
    #[serde(default)]
    registration_bonus_percent: Option<u8>,
    #[serde(default)]
    registration_bonus_expires_at: Option<DateTime<Utc>>,
}

impl ProfileRow {
    fn into_profile(self) -> UserProfile {
        let mut profile = UserProfile::new(self.id, self.name, self.email, self.phone);
        profile.total_spent = self.total_spent;
        profile.is_admin = self.is_admin;
        profile.registration_bonus = match (self.registration_bonus_percent, self.registration_bonus_expires_at) {
            (Some(percentage), Some(expires_at)) => Some(RegistrationBonus { percentage, expires_at }),
            _ => None,
        };
        profile.refresh_tier();
        profile
    }
}

fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default().verify_password(password.as_bytes(), &parsed).map_err(|_| AuthError::InvalidCredentials)
}

/// Profiles and argon2 password hashes in the `user_profiles` table.
pub struct TableAuthProvider {
    store: Arc<dyn RowStore>,
    events: EventPublisher,
}

impl TableAuthProvider {
    pub fn new(store: Arc<dyn RowStore>, events: EventPublisher) -> Self { Self { store, events } }

    fn decode(row: Row) -> Result<ProfileRow, AuthError> {
        serde_json::from_value(Value::Object(row)).map_err(|e| AuthError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl AuthProvider for TableAuthProvider {
    #[instrument(skip(self, password))]
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        let row = self.store.find(PROFILES_TABLE, "email", &json!(normalize_email(email))).await?.ok_or(AuthError::InvalidCredentials)?;
        let row = Self::decode(row)?;
        verify_password(password, row.password_hash.as_deref().unwrap_or_default())?;
        Ok(row.into_profile())
    }

    #[instrument(skip_all, fields(email = %registration.email))]
    async fn sign_up(&self, registration: &Registration, bonus: Option<RegistrationBonus>) -> Result<UserProfile, AuthError> {
        let violations = collect_violations(registration.validate());
        if !violations.is_empty() { return Err(AuthError::Invalid(violations)); }
        let email = normalize_email(&registration.email);
        if self.store.find(PROFILES_TABLE, "email", &json!(email)).await?.is_some() {
            return Err(AuthError::UserAlreadyExists);
        }
        let row = ProfileRow {
            id: Uuid::new_v4().to_string(),
            name: registration.name.trim().to_string(),
            email,
            phone: registration.phone.trim().to_string(),
            password_hash: Some(hash_password(&registration.password)?),
            total_spent: Decimal::ZERO,
            is_admin: false,
            registration_bonus_percent: bonus.as_ref().map(|b| b.percentage),
            registration_bonus_expires_at: bonus.as_ref().map(|b| b.expires_at),
        };
        let Value::Object(map) = serde_json::to_value(&row).map_err(|e| AuthError::Malformed(e.to_string()))? else {
            return Err(AuthError::Malformed("profile row is not an object".into()));
        };
        let saved = match self.store.insert(PROFILES_TABLE, map).await {
            Ok(saved) => saved,
            Err(PersistenceError::Conflict { .. }) => return Err(AuthError::UserAlreadyExists),
            Err(e) => return Err(e.into()),
        };
        let profile = Self::decode(saved)?.into_profile();
        info!(user_id = %profile.id, "user registered");
        self.events.publish(StoreEvent::UserRegistered { user_id: profile.id.clone(), email: profile.email.clone() }).await;
        Ok(profile)
    }

    async fn add_spend(&self, user_id: &str, amount: Decimal) -> Result<UserProfile, AuthError> {
        let saved = self.store.increment(PROFILES_TABLE, "total_spent", amount, "id", &json!(user_id)).await?;
        Ok(Self::decode(saved)?.into_profile())
    }
}

/// The signed-in user of one client session, mirrored to local storage.
#[derive(Clone, Debug, Default)]
pub struct SessionStore {
    user: Option<UserProfile>,
}

impl SessionStore {
    /// Restores a previously persisted session. An unreadable record is dropped.
    pub fn restore<L: KeyValueStore>(local: &mut L) -> Self {
        match local.get_json::<UserProfile>(keys::PROFILE) {
            Ok(user) => Self { user: user.map(|mut u| { u.refresh_tier(); u }) },
            Err(e) => {
                warn!(error = %e, "dropping unreadable stored session");
                local.remove(keys::PROFILE);
                Self::default()
            }
        }
    }

    pub fn current(&self) -> Option<&UserProfile> { self.user.as_ref() }
    pub fn is_authenticated(&self) -> bool { self.user.is_some() }

    pub fn require_admin(&self) -> Result<&UserProfile, AuthError> {
        let user = self.user.as_ref().ok_or(AuthError::NotAuthenticated)?;
        if !user.is_admin { return Err(AuthError::Forbidden); }
        Ok(user)
    }

    pub async fn login<L: KeyValueStore>(&mut self, auth: &dyn AuthProvider, local: &mut L, email: &str, password: &str) -> Result<&UserProfile, AuthError> {
        let profile = auth.sign_in(email, password).await?;
        self.commit(local, profile)
    }

    pub async fn register<L: KeyValueStore>(&mut self, auth: &dyn AuthProvider, local: &mut L, registration: &Registration, bonus: BonusPolicy) -> Result<&UserProfile, AuthError> {
        let profile = auth.sign_up(registration, bonus.grant()).await?;
        self.commit(local, profile)
    }

    pub fn logout<L: KeyValueStore>(&mut self, local: &mut L) {
        self.user = None;
        local.remove(keys::PROFILE);
    }

    /// Adds a purchase to the cumulative spend. The increment happens in the
    /// provider, so other devices of the same user are not overwritten; the
    /// session then takes the stored profile.
    pub async fn record_spend<L: KeyValueStore>(&mut self, auth: &dyn AuthProvider, local: &mut L, amount: Decimal) -> Result<&UserProfile, AuthError> {
        let user = self.user.as_ref().ok_or(AuthError::NotAuthenticated)?;
        if amount <= Decimal::ZERO {
            let unchanged = user.clone();
            return self.commit(local, unchanged);
        }
        let stored = auth.add_spend(&user.id, amount).await?;
        self.commit(local, stored)
    }

    fn commit<L: KeyValueStore>(&mut self, local: &mut L, profile: UserProfile) -> Result<&UserProfile, AuthError> {
        local.set_json(keys::PROFILE, &profile)?;
        Ok(&*self.user.insert(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryRowStore;
    use crate::storage::MemoryStorage;
    use rust_decimal_macros::dec;

    fn provider() -> TableAuthProvider {
        TableAuthProvider::new(Arc::new(MemoryRowStore::new().with_unique(PROFILES_TABLE, "email")), EventPublisher::disabled())
    }

    fn registration(email: &str) -> Registration {
        Registration { name: "Ana Popescu".into(), email: email.into(), phone: "+37360000000".into(), password: "parola-sigura".into() }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let auth = provider();
        let mut local = MemoryStorage::new();
        let mut session = SessionStore::default();
        let user = session.register(&auth, &mut local, &registration("Ana@Example.com"), BonusPolicy::default()).await.unwrap();
        assert_eq!(user.email, "ana@example.com");
        assert_eq!(user.registration_bonus.as_ref().unwrap().percentage, 15);
        session.logout(&mut local);
        assert!(!session.is_authenticated());
        assert!(local.get(keys::PROFILE).is_none());

        session.login(&auth, &mut local, "ana@example.com", "parola-sigura").await.unwrap();
        assert!(SessionStore::restore(&mut local).is_authenticated());
        assert!(matches!(session.login(&auth, &mut local, "ana@example.com", "wrong-pass").await, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_duplicate_and_invalid_registration() {
        let auth = provider();
        auth.sign_up(&registration("a@x.md"), None).await.unwrap();
        assert!(matches!(auth.sign_up(&registration("a@x.md"), None).await, Err(AuthError::UserAlreadyExists)));
        let mut bad = registration("b@x.md");
        bad.password = "short".into();
        assert!(matches!(auth.sign_up(&bad, None).await, Err(AuthError::Invalid(v)) if v[0].field == "password"));
    }

    #[tokio::test]
    async fn test_record_spend_updates_tier_and_store() {
        let auth = provider();
        let mut local = MemoryStorage::new();
        let mut session = SessionStore::default();
        session.register(&auth, &mut local, &registration("c@x.md"), BonusPolicy::default()).await.unwrap();
        let user = session.record_spend(&auth, &mut local, dec!(5001)).await.unwrap();
        assert_eq!((user.loyalty_level, user.discount_percentage), (1, 5));
        let again = auth.sign_in("c@x.md", "parola-sigura").await.unwrap();
        assert_eq!(again.total_spent, dec!(5001));
    }

    #[tokio::test]
    async fn test_spend_from_two_devices_accumulates() {
        let auth = provider();
        let (mut phone_local, mut laptop_local) = (MemoryStorage::new(), MemoryStorage::new());
        let (mut phone, mut laptop) = (SessionStore::default(), SessionStore::default());
        phone.register(&auth, &mut phone_local, &registration("d@x.md"), BonusPolicy::default()).await.unwrap();
        laptop.login(&auth, &mut laptop_local, "d@x.md", "parola-sigura").await.unwrap();

        phone.record_spend(&auth, &mut phone_local, dec!(4000)).await.unwrap();
        let user = laptop.record_spend(&auth, &mut laptop_local, dec!(1001)).await.unwrap();

        assert_eq!(user.total_spent, dec!(5001));
        assert_eq!(user.loyalty_level, 1);
        assert_eq!(auth.sign_in("d@x.md", "parola-sigura").await.unwrap().total_spent, dec!(5001));
        let unchanged = laptop.record_spend(&auth, &mut laptop_local, dec!(-20)).await.unwrap();
        assert_eq!(unchanged.total_spent, dec!(5001));
    }

    #[tokio::test]
    async fn test_admin_guard() {
        let mut local = MemoryStorage::new();
        let session = SessionStore::restore(&mut local);
        assert!(matches!(session.require_admin(), Err(AuthError::NotAuthenticated)));
    }
}
