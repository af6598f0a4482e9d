//! Server configuration from environment variables.
//!
//! `DATABASE_URL` and `NATS_URL` are optional: without them the server keeps
//! rows in memory and only logs domain events. MAIB credentials may also be
//! left unset, in which case card payments are refused.

use chrono::Duration;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration as StdDuration;
use thiserror::Error;

use crate::payment::{MaibConfig, RedirectTrust};
use crate::services::auth::BonusPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub nats_subject_prefix: String,
    pub maib: MaibConfig,
    pub redirect_trust: RedirectTrust,
    pub registration_bonus: BonusPolicy,
    /// Client sessions untouched for this long are evicted.
    pub session_idle: StdDuration,
    /// How long an evicted session's device storage is kept for its return.
    pub device_retention: StdDuration,
    pub json_logs: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|key| std::env::var(key).ok()) }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or_default = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let maib = MaibConfig {
            api_url: or_default("MAIB_API_URL", "https://api.maibmerchants.md").trim_end_matches('/').to_string(),
            project_id: or_default("MAIB_PROJECT_ID", ""),
            project_secret: or_default("MAIB_PROJECT_SECRET", ""),
            signature_key: or_default("MAIB_SIGNATURE_KEY", ""),
            callback_url: var("MAIB_CALLBACK_URL"),
            ok_url: var("MAIB_OK_URL"),
            fail_url: var("MAIB_FAIL_URL"),
            currency: or_default("MAIB_CURRENCY", "MDL"),
        };
        let bonus_hours: i64 = parse("REGISTRATION_BONUS_HOURS", &or_default("REGISTRATION_BONUS_HOURS", "2"))?;
        let registration_bonus = BonusPolicy {
            percent: parse("REGISTRATION_BONUS_PERCENT", &or_default("REGISTRATION_BONUS_PERCENT", "15"))?,
            lifetime: Duration::try_hours(bonus_hours)
                .ok_or_else(|| ConfigError::InvalidEnvVar("REGISTRATION_BONUS_HOURS".into(), "out of range".into()))?,
        };
        if registration_bonus.percent > 100 {
            return Err(ConfigError::InvalidEnvVar("REGISTRATION_BONUS_PERCENT".into(), "must be at most 100".into()));
        }
        let idle_minutes: u64 = parse("SESSION_IDLE_MINUTES", &or_default("SESSION_IDLE_MINUTES", "30"))?;
        let retention_days: u64 = parse("DEVICE_RETENTION_DAYS", &or_default("DEVICE_RETENTION_DAYS", "30"))?;

        Ok(Self {
            host: parse("HOST", &or_default("HOST", "0.0.0.0"))?,
            port: parse("PORT", &or_default("PORT", "8083"))?,
            database_url: var("DATABASE_URL"),
            nats_url: var("NATS_URL"),
            nats_subject_prefix: or_default("NATS_SUBJECT_PREFIX", "storefront"),
            maib,
            redirect_trust: RedirectTrust::from_flag(flag("PAYMENT_TRUST_REDIRECT_STATUS", var("PAYMENT_TRUST_REDIRECT_STATUS"))?),
            registration_bonus,
            session_idle: StdDuration::from_secs(idle_minutes.saturating_mul(60)),
            device_retention: StdDuration::from_secs(retention_days.saturating_mul(86_400)),
            json_logs: var("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr { SocketAddr::new(self.host, self.port) }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn flag(key: &str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("false" | "0" | "no") => Ok(false),
        Some("true" | "1" | "yes") => Ok(true),
        Some(other) => Err(ConfigError::InvalidEnvVar(key.to_string(), format!("expected a boolean, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8083");
        assert!(config.database_url.is_none());
        assert_eq!(config.maib.currency, "MDL");
        assert!(!config.maib.is_configured());
        assert_eq!(config.redirect_trust, RedirectTrust::Strict);
        assert_eq!(config.registration_bonus, BonusPolicy::default());
        assert_eq!(config.nats_subject_prefix, "storefront");
        assert_eq!(config.session_idle, StdDuration::from_secs(1800));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PORT", "9000"),
            ("PAYMENT_TRUST_REDIRECT_STATUS", "TRUE"),
            ("MAIB_API_URL", "http://localhost:8080/"),
            ("MAIB_PROJECT_ID", "p"),
            ("MAIB_PROJECT_SECRET", "s"),
            ("REGISTRATION_BONUS_PERCENT", "0"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.redirect_trust, RedirectTrust::SandboxFallback);
        assert_eq!(config.maib.api_url, "http://localhost:8080");
        assert!(config.maib.is_configured());
        assert!(config.registration_bonus.grant().is_none());
        assert!(config.json_logs);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(load(&[("PORT", "eighty")]), Err(ConfigError::InvalidEnvVar(k, _)) if k == "PORT"));
        assert!(load(&[("PAYMENT_TRUST_REDIRECT_STATUS", "maybe")]).is_err());
        assert!(load(&[("REGISTRATION_BONUS_PERCENT", "150")]).is_err());
        assert!(load(&[("SESSION_IDLE_MINUTES", "-5")]).is_err());
    }

    #[test]
    fn test_bonus_hours_out_of_range() {
        let huge = i64::MAX.to_string();
        let err = load(&[("REGISTRATION_BONUS_HOURS", huge.as_str())]);
        assert!(matches!(err, Err(ConfigError::InvalidEnvVar(k, _)) if k == "REGISTRATION_BONUS_HOURS"));
        assert_eq!(load(&[("REGISTRATION_BONUS_HOURS", "48")]).unwrap().registration_bonus.lifetime, Duration::hours(48));
    }
}
