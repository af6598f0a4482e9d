//! Customer profile

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::loyalty;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub total_spent: Decimal,
    pub loyalty_level: u8,
    pub discount_percentage: u8,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub registration_bonus: Option<RegistrationBonus>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationBonus { pub percentage: u8, pub expires_at: DateTime<Utc> }

impl RegistrationBonus {
    pub fn starting_now(percentage: u8, lifetime: Duration) -> Self {
        Self { percentage, expires_at: Utc::now() + lifetime }
    }
}

impl UserProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            id: id.into(), name: name.into(), email: email.into(), phone: phone.into(),
            total_spent: Decimal::ZERO, loyalty_level: 0, discount_percentage: 0,
            is_admin: false, registration_bonus: None,
        }
    }

    /// Adds a completed purchase to the cumulative spend and re-derives the tier.
    pub fn record_spend(&mut self, amount: Decimal) {
        self.total_spent = self.total_spent.saturating_add(amount.max(Decimal::ZERO));
        self.refresh_tier();
    }

    /// Keeps `loyalty_level`/`discount_percentage` a pure function of `total_spent`.
    pub fn refresh_tier(&mut self) {
        let tier = loyalty::tier(self.total_spent);
        self.loyalty_level = tier.level;
        self.discount_percentage = tier.discount_percent;
    }
}

/// Sign-up form.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[validate(length(min = 2, message = "name must have at least 2 characters"))]
    pub name: String,
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "phone number is too short"))]
    pub phone: String,
    #[validate(length(min = 8, message = "password must have at least 8 characters"))]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_spend_updates_tier() {
        let mut p = UserProfile::new("1", "Ana", "ana@example.com", "+37360000000");
        p.record_spend(dec!(4999));
        assert_eq!((p.loyalty_level, p.discount_percentage), (0, 0));
        p.record_spend(dec!(2));
        assert_eq!((p.loyalty_level, p.discount_percentage), (1, 5));
    }

    #[test]
    fn test_negative_spend_is_ignored() {
        let mut p = UserProfile::new("1", "Ana", "ana@example.com", "+37360000000");
        p.record_spend(dec!(-50));
        assert_eq!(p.total_spent, dec!(0));
    }

    #[test]
    fn test_registration_validation() {
        let r = Registration { name: "A".into(), email: "nope".into(), phone: "+37360000000".into(), password: "longenough".into() };
        let errors = r.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("email"));
    }
}
