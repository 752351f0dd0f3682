use super::availability::FacilityReservation;
use super::booking::{Booking, Item, ItemRef};
use super::payment::{
    CallbackLogEntry, PendingPayment, StkPushAck, StkPushRequest, StkQueryStatus,
};
use super::referral::{Commission, ReferralTracking};
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait ItemCatalog: Send + Sync {
    async fn store(&self, item: Item) -> Result<()>;
    async fn get(&self, item: &ItemRef) -> Result<Option<Item>>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Inserts or replaces a booking by id.
    async fn store(&self, booking: Booking) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Booking>>;
    /// All bookings for an item, in any status.
    async fn for_item(&self, item: &ItemRef) -> Result<Vec<Booking>>;
    async fn for_item_on(&self, item: &ItemRef, date: NaiveDate) -> Result<Vec<Booking>> {
        let mut bookings = self.for_item(item).await?;
        bookings.retain(|b| b.visit_date == date);
        Ok(bookings)
    }
}

#[async_trait]
pub trait FacilityReservationStore: Send + Sync {
    async fn store(&self, reservation: FacilityReservation) -> Result<()>;
    async fn for_facility(&self, facility_id: &str) -> Result<Vec<FacilityReservation>>;
}

#[async_trait]
pub trait PendingPaymentStore: Send + Sync {
    async fn store(&self, payment: PendingPayment) -> Result<()>;
    async fn get(&self, checkout_request_id: &str) -> Result<Option<PendingPayment>>;
}

#[async_trait]
pub trait CallbackLog: Send + Sync {
    async fn append(&self, entry: CallbackLogEntry) -> Result<()>;
    async fn for_checkout(&self, checkout_request_id: &str) -> Result<Vec<CallbackLogEntry>>;
}

/// Lets the HTTP layer and the payment reconciler share one log.
#[async_trait]
impl<T: CallbackLog + ?Sized> CallbackLog for Arc<T> {
    async fn append(&self, entry: CallbackLogEntry) -> Result<()> {
        (**self).append(entry).await
    }

    async fn for_checkout(&self, checkout_request_id: &str) -> Result<Vec<CallbackLogEntry>> {
        (**self).for_checkout(checkout_request_id).await
    }
}

#[async_trait]
pub trait ReferralStore: Send + Sync {
    async fn store(&self, tracking: ReferralTracking) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<ReferralTracking>>;
}

#[async_trait]
pub trait CommissionStore: Send + Sync {
    async fn insert(&self, commission: Commission) -> Result<()>;
    async fn exists_for_booking(&self, booking_id: Uuid) -> Result<bool>;
    async fn for_referrer(&self, referrer_id: &str) -> Result<Vec<Commission>>;
}

/// The mobile-money provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn stk_push(&self, request: &StkPushRequest) -> Result<StkPushAck>;
    async fn stk_query(&self, checkout_request_id: &str) -> Result<StkQueryStatus>;
}

/// Transactional email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_booking_confirmation(&self, booking: &Booking, item: &Item) -> Result<()>;
}

pub type ItemCatalogBox = Box<dyn ItemCatalog>;
pub type BookingStoreBox = Box<dyn BookingStore>;
pub type FacilityReservationStoreBox = Box<dyn FacilityReservationStore>;
pub type PendingPaymentStoreBox = Box<dyn PendingPaymentStore>;
pub type CallbackLogBox = Box<dyn CallbackLog>;
pub type ReferralStoreBox = Box<dyn ReferralStore>;
pub type CommissionStoreBox = Box<dyn CommissionStore>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;
pub type MailerBox = Box<dyn Mailer>;
