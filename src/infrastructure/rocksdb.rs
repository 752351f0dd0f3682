use crate::domain::availability::FacilityReservation;
use crate::domain::booking::{Booking, Item, ItemRef};
use crate::domain::payment::{CallbackLogEntry, PendingPayment};
use crate::domain::ports::{
    BookingStore, CallbackLog, CommissionStore, FacilityReservationStore, ItemCatalog,
    PendingPaymentStore, ReferralStore,
};
use crate::domain::referral::{Commission, ReferralTracking};
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

pub const CF_ITEMS: &str = "items";
pub const CF_BOOKINGS: &str = "bookings";
pub const CF_BOOKING_INDEX: &str = "booking_index";
pub const CF_FACILITY_RESERVATIONS: &str = "facility_reservations";
pub const CF_PENDING_PAYMENTS: &str = "pending_payments";
pub const CF_CALLBACK_LOG: &str = "mpesa_callback_log";
pub const CF_REFERRALS: &str = "referral_tracking";
pub const CF_COMMISSIONS: &str = "commissions";

const COLUMN_FAMILIES: [&str; 8] = [
    CF_ITEMS,
    CF_BOOKINGS,
    CF_BOOKING_INDEX,
    CF_FACILITY_RESERVATIONS,
    CF_PENDING_PAYMENTS,
    CF_CALLBACK_LOG,
    CF_REFERRALS,
    CF_COMMISSIONS,
];

/// A persistent store implementation using RocksDB.
///
/// Every table lives in its own column family and values are JSON. Bookings
/// are keyed by `item key / booking id` so a prefix scan returns one item's
/// bookings without touching the rest; `booking_index` maps ids to those keys.
///
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path` with all column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn put<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(&cf, key, bytes)?;
        Ok(())
    }

    fn fetch<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(&cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn contains(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(cf_name)?;
        Ok(self.db.get_pinned_cf(&cf, key)?.is_some())
    }

    /// Decodes every value whose key starts with `prefix`.
    fn scan<T: DeserializeOwned>(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        let iter = self.db.iterator_cf(
            &cf,
            IteratorMode::From(prefix, Direction::Forward),
        );
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            BookingError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }
}

fn booking_prefix(item: &ItemRef) -> Vec<u8> {
    format!("{}/", item.key()).into_bytes()
}

fn booking_key(booking: &Booking) -> Vec<u8> {
    let mut key = booking_prefix(&booking.item);
    key.extend_from_slice(booking.id.as_bytes());
    key
}

#[async_trait]
impl ItemCatalog for RocksDBStore {
    async fn store(&self, item: Item) -> Result<()> {
        self.put(CF_ITEMS, item.item.key().as_bytes(), &item)
    }

    async fn get(&self, item: &ItemRef) -> Result<Option<Item>> {
        self.fetch(CF_ITEMS, item.key().as_bytes())
    }
}

#[async_trait]
impl BookingStore for RocksDBStore {
    async fn store(&self, booking: Booking) -> Result<()> {
        let key = booking_key(&booking);
        self.put(CF_BOOKINGS, &key, &booking)?;
        self.put(CF_BOOKING_INDEX, booking.id.as_bytes(), &key)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>> {
        match self.fetch::<Vec<u8>>(CF_BOOKING_INDEX, id.as_bytes())? {
            Some(key) => self.fetch(CF_BOOKINGS, &key),
            None => Ok(None),
        }
    }

    async fn for_item(&self, item: &ItemRef) -> Result<Vec<Booking>> {
        // Ids may contain '/', so the prefix alone can match another item.
        let mut bookings: Vec<Booking> = self.scan(CF_BOOKINGS, &booking_prefix(item))?;
        bookings.retain(|b| b.item == *item);
        bookings.sort_by_key(|b| (b.visit_date, b.created_at));
        Ok(bookings)
    }
}

#[async_trait]
impl FacilityReservationStore for RocksDBStore {
    async fn store(&self, reservation: FacilityReservation) -> Result<()> {
        let mut key = format!("{}/", reservation.facility_id).into_bytes();
        key.extend_from_slice(reservation.id.as_bytes());
        self.put(CF_FACILITY_RESERVATIONS, &key, &reservation)
    }

    async fn for_facility(&self, facility_id: &str) -> Result<Vec<FacilityReservation>> {
        let mut reservations: Vec<FacilityReservation> = self.scan(
            CF_FACILITY_RESERVATIONS,
            format!("{facility_id}/").as_bytes(),
        )?;
        reservations.retain(|r| r.facility_id == facility_id);
        Ok(reservations)
    }
}

#[async_trait]
impl PendingPaymentStore for RocksDBStore {
    async fn store(&self, payment: PendingPayment) -> Result<()> {
        self.put(
            CF_PENDING_PAYMENTS,
            payment.checkout_request_id.as_bytes(),
            &payment,
        )
    }

    async fn get(&self, checkout_request_id: &str) -> Result<Option<PendingPayment>> {
        self.fetch(CF_PENDING_PAYMENTS, checkout_request_id.as_bytes())
    }
}

#[async_trait]
impl CallbackLog for RocksDBStore {
    async fn append(&self, entry: CallbackLogEntry) -> Result<()> {
        let checkout = entry.checkout_request_id.as_deref().unwrap_or("unmatched");
        let mut key = format!("{checkout}/{}/", entry.received_at.timestamp_micros()).into_bytes();
        key.extend_from_slice(entry.id.as_bytes());
        self.put(CF_CALLBACK_LOG, &key, &entry)
    }

    async fn for_checkout(&self, checkout_request_id: &str) -> Result<Vec<CallbackLogEntry>> {
        self.scan(CF_CALLBACK_LOG, format!("{checkout_request_id}/").as_bytes())
    }
}

#[async_trait]
impl ReferralStore for RocksDBStore {
    async fn store(&self, tracking: ReferralTracking) -> Result<()> {
        self.put(CF_REFERRALS, tracking.id.as_bytes(), &tracking)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ReferralTracking>> {
        self.fetch(CF_REFERRALS, id.as_bytes())
    }
}

#[async_trait]
impl CommissionStore for RocksDBStore {
    async fn insert(&self, commission: Commission) -> Result<()> {
        self.put(CF_COMMISSIONS, commission.booking_id.as_bytes(), &commission)
    }

    async fn exists_for_booking(&self, booking_id: Uuid) -> Result<bool> {
        self.contains(CF_COMMISSIONS, booking_id.as_bytes())
    }

    async fn for_referrer(&self, referrer_id: &str) -> Result<Vec<Commission>> {
        let all: Vec<Commission> = self.scan(CF_COMMISSIONS, &[])?;
        Ok(all
            .into_iter()
            .filter(|c| c.referrer_id == referrer_id)
            .collect())
    }
}
