//! Loyalty tiers derived from cumulative customer spend.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::UserProfile;

/// (threshold, level, discount percent), ascending.
const TIERS: [(i64, u8, u8); 5] = [
    (5_001, 1, 5),
    (10_001, 2, 6),
    (20_001, 3, 7),
    (30_001, 4, 8),
    (50_001, 5, 10),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tier {
    pub level: u8,
    pub discount_percent: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextTier {
    pub level: u8,
    pub threshold: Decimal,
    pub discount_percent: u8,
    pub amount_needed: Decimal,
    /// Progress through the current band, 0..=100.
    pub progress_percent: Decimal,
}

fn clamp(total_spent: Decimal) -> Decimal { total_spent.max(Decimal::ZERO) }

/// Maps cumulative spend to a tier. Negative input counts as zero.
pub fn tier(total_spent: Decimal) -> Tier {
    let spent = clamp(total_spent);
    TIERS
        .iter()
        .rev()
        .find(|(threshold, _, _)| spent >= Decimal::from(*threshold))
        .map(|&(_, level, discount_percent)| Tier { level, discount_percent })
        .unwrap_or(Tier { level: 0, discount_percent: 0 })
}

/// The next tier above the current spend, or `None` at the top tier.
pub fn next_tier(total_spent: Decimal) -> Option<NextTier> {
    let spent = clamp(total_spent);
    let idx = TIERS.iter().position(|(threshold, _, _)| spent < Decimal::from(*threshold))?;
    let (threshold, level, discount_percent) = TIERS[idx];
    let threshold = Decimal::from(threshold);
    let floor = if idx == 0 {
        Decimal::ZERO
    } else {
        Decimal::from(TIERS[idx - 1].0)
    };
    let progress_percent = ((spent - floor) * Decimal::ONE_HUNDRED / (threshold - floor)).round_dp(2);
    Some(NextTier { level, threshold, discount_percent, amount_needed: threshold - spent, progress_percent })
}

/// Discount amount for `amount`: an unexpired registration bonus wins over the loyalty tier.
pub fn discount_for(profile: &UserProfile, amount: Decimal, now: DateTime<Utc>) -> Decimal {
    let percent = match &profile.registration_bonus {
        Some(bonus) if now < bonus.expires_at => bonus.percentage,
        _ => profile.discount_percentage,
    };
    (amount * Decimal::from(percent) / Decimal::ONE_HUNDRED).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::RegistrationBonus;
    use chrono::Duration;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_thresholds() {
        assert_eq!(tier(dec!(0)), Tier { level: 0, discount_percent: 0 });
        assert_eq!(tier(dec!(5000.99)).level, 0);
        assert_eq!(tier(dec!(5001)), Tier { level: 1, discount_percent: 5 });
        assert_eq!(tier(dec!(10001)).discount_percent, 6);
        assert_eq!(tier(dec!(20001)).discount_percent, 7);
        assert_eq!(tier(dec!(30001)).discount_percent, 8);
        assert_eq!(tier(dec!(50001)), Tier { level: 5, discount_percent: 10 });
        assert_eq!(tier(dec!(1000000)).discount_percent, 10);
    }

    #[test]
    fn test_negative_spend_clamps_to_zero() {
        assert_eq!(tier(dec!(-100)).level, 0);
        assert_eq!(next_tier(dec!(-100)).unwrap().amount_needed, dec!(5001));
    }

    proptest! {
        #[test]
        fn tier_never_drops_as_spend_grows(a in 0i64..10_000_000, b in 0i64..10_000_000) {
            let (low, high) = (Decimal::new(a.min(b), 2), Decimal::new(a.max(b), 2));
            let (t_low, t_high) = (tier(low), tier(high));
            prop_assert!([0u8, 5, 6, 7, 8, 10].contains(&t_low.discount_percent));
            prop_assert!(t_low.level <= t_high.level);
            prop_assert!(t_low.discount_percent <= t_high.discount_percent);
        }

        #[test]
        fn next_tier_gap_reaches_next_level(cents in 0i64..6_000_000) {
            let spent = Decimal::new(cents, 2);
            if let Some(next) = next_tier(spent) {
                prop_assert!(next.amount_needed > Decimal::ZERO);
                prop_assert_eq!(tier(spent + next.amount_needed).level, next.level);
            } else {
                prop_assert_eq!(tier(spent).level, 5);
            }
        }
    }

    #[test]
    fn test_next_tier_before_first_threshold() {
        let next = next_tier(dec!(4999)).unwrap();
        assert_eq!(next.level, 1);
        assert_eq!(next.discount_percent, 5);
        assert_eq!(next.amount_needed, dec!(2));
    }

    #[test]
    fn test_next_tier_progress_within_band() {
        let next = next_tier(dec!(7501)).unwrap();
        assert_eq!(next.level, 2);
        assert_eq!(next.progress_percent, dec!(50));
        assert!(next_tier(dec!(50001)).is_none());
    }

    #[test]
    fn test_registration_bonus_wins_until_expiry() {
        let now = Utc::now();
        let mut profile = UserProfile::new("u1", "Ana", "ana@example.com", "+37360000000");
        profile.record_spend(dec!(12000));
        profile.registration_bonus = Some(RegistrationBonus { percentage: 15, expires_at: now + Duration::hours(2) });
        assert_eq!(discount_for(&profile, dec!(100), now), dec!(15));
        assert_eq!(discount_for(&profile, dec!(100), now + Duration::hours(3)), dec!(6));
    }
}
