use super::booking::{Booking, ItemKind, ItemRef};
use super::money::Rate;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Clicks older than this no longer earn a commission.
pub const DEFAULT_ATTRIBUTION_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    #[default]
    Pending,
    Converted,
}

/// A visitor arriving through someone's referral link.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ReferralTracking {
    pub id: Uuid,
    pub referrer_id: String,
    pub referred_user_id: Option<String>,
    pub item: Option<ItemRef>,
    pub status: ReferralStatus,
    pub clicked_at: DateTime<Utc>,
    pub converted_at: Option<DateTime<Utc>>,
    pub booking_id: Option<Uuid>,
}

impl ReferralTracking {
    pub fn new(
        referrer_id: impl Into<String>,
        referred_user_id: Option<String>,
        item: Option<ItemRef>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            referrer_id: referrer_id.into(),
            referred_user_id,
            item,
            status: ReferralStatus::Pending,
            clicked_at: Utc::now(),
            converted_at: None,
            booking_id: None,
        }
    }

    pub fn is_within_window(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.clicked_at <= window
    }

    pub fn convert(&mut self, booking_id: Uuid) {
        self.status = ReferralStatus::Converted;
        self.booking_id = Some(booking_id);
        self.converted_at = Some(Utc::now());
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Commission {
    pub id: Uuid,
    pub referrer_id: String,
    pub booking_id: Uuid,
    pub referral_tracking_id: Uuid,
    pub booking_amount: Decimal,
    pub rate: Rate,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Commission {
    pub fn for_booking(tracking: &ReferralTracking, booking: &Booking, rate: Rate) -> Self {
        Self {
            id: Uuid::new_v4(),
            referrer_id: tracking.referrer_id.clone(),
            booking_id: booking.id,
            referral_tracking_id: tracking.id,
            booking_amount: booking.total_amount.value(),
            rate,
            amount: booking.total_amount.percent(rate),
            created_at: Utc::now(),
        }
    }
}

/// Commission percentages per item kind.
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionRates {
    rates: HashMap<ItemKind, Rate>,
    default_rate: Rate,
}

impl CommissionRates {
    pub fn new(default_rate: Rate) -> Self {
        Self {
            rates: HashMap::new(),
            default_rate,
        }
    }

    pub fn with_rate(mut self, kind: ItemKind, rate: Rate) -> Self {
        self.rates.insert(kind, rate);
        self
    }

    pub fn set_rate(&mut self, kind: ItemKind, rate: Rate) {
        self.rates.insert(kind, rate);
    }

    pub fn rate_for(&self, kind: ItemKind) -> Rate {
        self.rates.get(&kind).copied().unwrap_or(self.default_rate)
    }
}

impl Default for CommissionRates {
    fn default() -> Self {
        Self::new(Rate::from_static(dec!(5)))
            .with_rate(ItemKind::Trip, Rate::from_static(dec!(5)))
            .with_rate(ItemKind::Hotel, Rate::from_static(dec!(3)))
            .with_rate(ItemKind::Adventure, Rate::from_static(dec!(5)))
            .with_rate(ItemKind::Attraction, Rate::from_static(dec!(4)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::BookingStatus;
    use crate::domain::booking::fixtures::booking;

    #[test]
    fn test_default_rates() {
        let rates = CommissionRates::default();
        assert_eq!(rates.rate_for(ItemKind::Hotel).value(), dec!(3));
        assert_eq!(rates.rate_for(ItemKind::Attraction).value(), dec!(4));
    }

    #[test]
    fn test_fallback_to_default_rate() {
        let rates = CommissionRates::new(Rate::new(dec!(2.5)).unwrap())
            .with_rate(ItemKind::Trip, Rate::new(dec!(10)).unwrap());
        assert_eq!(rates.rate_for(ItemKind::Trip).value(), dec!(10));
        assert_eq!(rates.rate_for(ItemKind::Hotel).value(), dec!(2.5));
    }

    #[test]
    fn test_commission_amount() {
        let item = ItemRef::new(ItemKind::Trip, "amboseli-weekend");
        // 3 slots * 2500 = 7500
        let booking = booking(&item, "2026-12-01", 3, BookingStatus::Confirmed);
        let tracking = ReferralTracking::new("referrer-9", None, Some(item));
        let commission = Commission::for_booking(&tracking, &booking, Rate::new(dec!(5)).unwrap());
        assert_eq!(commission.amount, dec!(375.00));
        assert_eq!(commission.booking_amount, dec!(7500));
        assert_eq!(commission.referrer_id, "referrer-9");
    }

    #[test]
    fn test_attribution_window() {
        let mut tracking = ReferralTracking::new("referrer-9", None, None);
        let window = Duration::days(DEFAULT_ATTRIBUTION_WINDOW_DAYS);
        assert!(tracking.is_within_window(Utc::now(), window));

        tracking.clicked_at = Utc::now() - Duration::days(31);
        assert!(!tracking.is_within_window(Utc::now(), window));
    }

    #[test]
    fn test_convert() {
        let mut tracking = ReferralTracking::new("referrer-9", Some("guest-2".to_string()), None);
        let booking_id = Uuid::new_v4();
        tracking.convert(booking_id);
        assert_eq!(tracking.status, ReferralStatus::Converted);
        assert_eq!(tracking.booking_id, Some(booking_id));
        assert!(tracking.converted_at.is_some());
    }
}
