use crate::domain::availability::FacilityReservation;
use crate::domain::booking::{Booking, Item, ItemRef};
use crate::domain::payment::{CallbackLogEntry, PendingPayment};
use crate::domain::ports::{
    BookingStore, CallbackLog, CommissionStore, FacilityReservationStore, ItemCatalog,
    PendingPaymentStore, ReferralStore,
};
use crate::domain::referral::{Commission, ReferralTracking};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory item catalog.
///
/// Uses `Arc<RwLock<HashMap<ItemRef, Item>>>` so clones share the same data.
#[derive(Default, Clone)]
pub struct InMemoryItemCatalog {
    items: Arc<RwLock<HashMap<ItemRef, Item>>>,
}

impl InMemoryItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog pre-filled with `items`.
    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let map = items
            .into_iter()
            .map(|item| (item.item.clone(), item))
            .collect();
        Self {
            items: Arc::new(RwLock::new(map)),
        }
    }
}

#[async_trait]
impl ItemCatalog for InMemoryItemCatalog {
    async fn store(&self, item: Item) -> Result<()> {
        let mut items = self.items.write().await;
        items.insert(item.item.clone(), item);
        Ok(())
    }

    async fn get(&self, item: &ItemRef) -> Result<Option<Item>> {
        let items = self.items.read().await;
        Ok(items.get(item).cloned())
    }
}

/// A thread-safe in-memory booking table.
#[derive(Default, Clone)]
pub struct InMemoryBookingStore {
    bookings: Arc<RwLock<HashMap<Uuid, Booking>>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn store(&self, booking: Booking) -> Result<()> {
        let mut bookings = self.bookings.write().await;
        bookings.insert(booking.id, booking);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>> {
        let bookings = self.bookings.read().await;
        Ok(bookings.get(&id).cloned())
    }

    async fn for_item(&self, item: &ItemRef) -> Result<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        let mut matching: Vec<Booking> = bookings
            .values()
            .filter(|b| &b.item == item)
            .cloned()
            .collect();
        matching.sort_by_key(|b| (b.visit_date, b.created_at));
        Ok(matching)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryFacilityReservationStore {
    reservations: Arc<RwLock<HashMap<Uuid, FacilityReservation>>>,
}

impl InMemoryFacilityReservationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FacilityReservationStore for InMemoryFacilityReservationStore {
    async fn store(&self, reservation: FacilityReservation) -> Result<()> {
        let mut reservations = self.reservations.write().await;
        reservations.insert(reservation.id, reservation);
        Ok(())
    }

    async fn for_facility(&self, facility_id: &str) -> Result<Vec<FacilityReservation>> {
        let reservations = self.reservations.read().await;
        Ok(reservations
            .values()
            .filter(|r| r.facility_id == facility_id)
            .cloned()
            .collect())
    }
}

/// Pending push payments keyed by checkout request id.
#[derive(Default, Clone)]
pub struct InMemoryPendingPaymentStore {
    payments: Arc<RwLock<HashMap<String, PendingPayment>>>,
}

impl InMemoryPendingPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingPaymentStore for InMemoryPendingPaymentStore {
    async fn store(&self, payment: PendingPayment) -> Result<()> {
        let mut payments = self.payments.write().await;
        payments.insert(payment.checkout_request_id.clone(), payment);
        Ok(())
    }

    async fn get(&self, checkout_request_id: &str) -> Result<Option<PendingPayment>> {
        let payments = self.payments.read().await;
        Ok(payments.get(checkout_request_id).cloned())
    }
}

/// Append-only webhook log.
#[derive(Default, Clone)]
pub struct InMemoryCallbackLog {
    entries: Arc<RwLock<Vec<CallbackLogEntry>>>,
}

impl InMemoryCallbackLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CallbackLog for InMemoryCallbackLog {
    async fn append(&self, entry: CallbackLogEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.push(entry);
        Ok(())
    }

    async fn for_checkout(&self, checkout_request_id: &str) -> Result<Vec<CallbackLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.checkout_request_id.as_deref() == Some(checkout_request_id))
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryReferralStore {
    trackings: Arc<RwLock<HashMap<Uuid, ReferralTracking>>>,
}

impl InMemoryReferralStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReferralStore for InMemoryReferralStore {
    async fn store(&self, tracking: ReferralTracking) -> Result<()> {
        let mut trackings = self.trackings.write().await;
        trackings.insert(tracking.id, tracking);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ReferralTracking>> {
        let trackings = self.trackings.read().await;
        Ok(trackings.get(&id).cloned())
    }
}

/// Commissions keyed by booking id, so a second insert for the same booking
/// replaces rather than duplicates.
#[derive(Default, Clone)]
pub struct InMemoryCommissionStore {
    commissions: Arc<RwLock<HashMap<Uuid, Commission>>>,
}

impl InMemoryCommissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommissionStore for InMemoryCommissionStore {
    async fn insert(&self, commission: Commission) -> Result<()> {
        let mut commissions = self.commissions.write().await;
        commissions.insert(commission.booking_id, commission);
        Ok(())
    }

    async fn exists_for_booking(&self, booking_id: Uuid) -> Result<bool> {
        let commissions = self.commissions.read().await;
        Ok(commissions.contains_key(&booking_id))
    }

    async fn for_referrer(&self, referrer_id: &str) -> Result<Vec<Commission>> {
        let commissions = self.commissions.read().await;
        Ok(commissions
            .values()
            .filter(|c| c.referrer_id == referrer_id)
            .cloned()
            .collect())
    }
}
