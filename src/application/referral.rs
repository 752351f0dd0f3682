use crate::domain::booking::{Booking, ItemRef, PaymentStatus};
use crate::domain::ports::{CommissionStoreBox, ReferralStoreBox};
use crate::domain::referral::{Commission, CommissionRates, ReferralStatus, ReferralTracking};
use crate::error::{BookingError, Result};
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Records referral clicks and turns them into commissions.
pub struct ReferralService {
    referrals: ReferralStoreBox,
    commissions: CommissionStoreBox,
    rates: CommissionRates,
    window: Duration,
    award_lock: Mutex<()>,
}

impl ReferralService {
    pub fn new(
        referrals: ReferralStoreBox,
        commissions: CommissionStoreBox,
        rates: CommissionRates,
        attribution_window_days: i64,
    ) -> Self {
        Self {
            referrals,
            commissions,
            rates,
            window: Duration::days(attribution_window_days),
            award_lock: Mutex::new(()),
        }
    }

    #[instrument(skip(self))]
    pub async fn track_click(
        &self,
        referrer_id: &str,
        referred_user_id: Option<String>,
        item: Option<ItemRef>,
    ) -> Result<ReferralTracking> {
        if referrer_id.trim().is_empty() {
            return Err(BookingError::ValidationError(
                "referrer_id is required".to_string(),
            ));
        }
        let tracking = ReferralTracking::new(referrer_id, referred_user_id, item);
        self.referrals.store(tracking.clone()).await?;
        debug!(tracking_id = %tracking.id, "referral click recorded");
        Ok(tracking)
    }

    /// Awards the commission for a paid booking, at most once per booking.
    ///
    /// Returns `None` when nothing is owed: no referral, unpaid booking,
    /// self-referral, stale click, or a commission that already exists.
    #[instrument(skip_all, fields(booking_id = %booking.id))]
    pub async fn award_commission(&self, booking: &Booking) -> Result<Option<Commission>> {
        let Some(tracking_id) = booking.referral_tracking_id else {
            return Ok(None);
        };
        if booking.payment_status == PaymentStatus::Pending {
            debug!("booking not paid yet, no commission");
            return Ok(None);
        }

        let _guard = self.award_lock.lock().await;
        if self.commissions.exists_for_booking(booking.id).await? {
            debug!("commission already recorded");
            return Ok(None);
        }
        let Some(mut tracking) = self.referrals.get(tracking_id).await? else {
            debug!(%tracking_id, "referral tracking not found");
            return Ok(None);
        };
        if booking.user_id.as_deref() == Some(tracking.referrer_id.as_str()) {
            debug!("self-referral, no commission");
            return Ok(None);
        }
        if tracking.status == ReferralStatus::Converted && tracking.booking_id != Some(booking.id)
        {
            debug!(%tracking_id, "referral already converted by another booking");
            return Ok(None);
        }
        if !tracking.is_within_window(Utc::now(), self.window) {
            debug!(%tracking_id, "referral click outside attribution window");
            return Ok(None);
        }

        let rate = self.rates.rate_for(booking.item.kind);
        let commission = Commission::for_booking(&tracking, booking, rate);
        self.commissions.insert(commission.clone()).await?;
        tracking.convert(booking.id);
        self.referrals.store(tracking).await?;

        info!(
            referrer_id = %commission.referrer_id,
            amount = %commission.amount,
            rate = %commission.rate.value(),
            "commission awarded"
        );
        Ok(Some(commission))
    }

    pub async fn commissions_for(&self, referrer_id: &str) -> Result<Vec<Commission>> {
        self.commissions.for_referrer(referrer_id).await
    }

    pub async fn tracking(&self, id: uuid::Uuid) -> Result<Option<ReferralTracking>> {
        self.referrals.get(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::fixtures::booking;
    use crate::domain::booking::{BookingStatus, ItemKind};
    use crate::domain::ports::ReferralStore;
    use crate::infrastructure::in_memory::{InMemoryCommissionStore, InMemoryReferralStore};
    use rust_decimal_macros::dec;

    fn service() -> (ReferralService, InMemoryReferralStore) {
        let referrals = InMemoryReferralStore::new();
        let service = ReferralService::new(
            Box::new(referrals.clone()),
            Box::new(InMemoryCommissionStore::new()),
            CommissionRates::default(),
            30,
        );
        (service, referrals)
    }

    fn paid_booking(kind: ItemKind, tracking: &ReferralTracking) -> Booking {
        let mut b = booking(
            &ItemRef::new(kind, "diani-beach"),
            "2026-12-01",
            2,
            BookingStatus::Confirmed,
        );
        b.referral_tracking_id = Some(tracking.id);
        b.mark_paid(Some("QKA1".to_string()));
        b
    }

    #[tokio::test]
    async fn test_commission_awarded_once() {
        let (service, _) = service();
        let tracking = service.track_click("agent-9", None, None).await.unwrap();
        let booking = paid_booking(ItemKind::Hotel, &tracking);

        let commission = service.award_commission(&booking).await.unwrap().unwrap();
        // 5000 at the 3% hotel rate.
        assert_eq!(commission.amount, dec!(150.00));
        assert_eq!(commission.referrer_id, "agent-9");

        assert!(service.award_commission(&booking).await.unwrap().is_none());
        assert_eq!(service.commissions_for("agent-9").await.unwrap().len(), 1);

        let tracking = service.tracking(tracking.id).await.unwrap().unwrap();
        assert_eq!(tracking.status, ReferralStatus::Converted);
        assert_eq!(tracking.booking_id, Some(booking.id));
    }

    #[tokio::test]
    async fn test_no_commission_for_self_referral() {
        let (service, _) = service();
        // Fixture bookings belong to "user-1".
        let tracking = service.track_click("user-1", None, None).await.unwrap();
        let booking = paid_booking(ItemKind::Trip, &tracking);
        assert!(service.award_commission(&booking).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_commission_outside_window() {
        let (service, referrals) = service();
        let mut tracking = ReferralTracking::new("agent-9", None, None);
        tracking.clicked_at = Utc::now() - Duration::days(31);
        referrals.store(tracking.clone()).await.unwrap();

        let booking = paid_booking(ItemKind::Trip, &tracking);
        assert!(service.award_commission(&booking).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_commission_for_unpaid_or_unreferred() {
        let (service, _) = service();
        let tracking = service.track_click("agent-9", None, None).await.unwrap();

        let mut unpaid = paid_booking(ItemKind::Trip, &tracking);
        unpaid.payment_status = PaymentStatus::Pending;
        assert!(service.award_commission(&unpaid).await.unwrap().is_none());

        let mut unreferred = paid_booking(ItemKind::Trip, &tracking);
        unreferred.referral_tracking_id = None;
        assert!(service.award_commission(&unreferred).await.unwrap().is_none());

        let mut missing = paid_booking(ItemKind::Trip, &tracking);
        missing.referral_tracking_id = Some(uuid::Uuid::new_v4());
        assert!(service.award_commission(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_track_click_requires_referrer() {
        let (service, _) = service();
        assert!(service.track_click("  ", None, None).await.is_err());
    }
}
