use crate::domain::availability::{
    DateAvailability, DateRange, FacilityReservation, availability_on, ensure_capacity,
    find_conflict,
};
use crate::domain::booking::{Booking, BookingRequest, Item, ItemRef};
use crate::domain::ports::{BookingStoreBox, FacilityReservationStoreBox, ItemCatalogBox};
use crate::error::{BookingError, Result};
use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Longest window `availability` will compute in one call.
pub const MAX_AVAILABILITY_DAYS: u32 = 366;

/// A settled payment to be turned into a booking.
#[derive(Debug, Clone)]
pub struct PaidBooking {
    /// Assigned by the caller so a retried settlement finds the same booking.
    pub id: Uuid,
    pub request: BookingRequest,
    pub receipt: Option<String>,
    pub underpaid: bool,
}

/// Owns the item catalog, bookings and facility reservations, and enforces
/// the capacity and overlap rules on every write.
///
/// Check-then-insert sequences run under a single write lock so two
/// concurrent requests cannot both take the last slot.
pub struct BookingService {
    catalog: ItemCatalogBox,
    bookings: BookingStoreBox,
    reservations: FacilityReservationStoreBox,
    write_lock: Mutex<()>,
}

impl BookingService {
    pub fn new(
        catalog: ItemCatalogBox,
        bookings: BookingStoreBox,
        reservations: FacilityReservationStoreBox,
    ) -> Self {
        Self {
            catalog,
            bookings,
            reservations,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn add_item(&self, item: Item) -> Result<()> {
        self.catalog.store(item).await
    }

    pub async fn item(&self, item: &ItemRef) -> Result<Item> {
        self.catalog
            .get(item)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("item {item}")))
    }

    pub async fn booking(&self, id: Uuid) -> Result<Booking> {
        self.bookings
            .get(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {id}")))
    }

    /// Per-day availability for `days` consecutive dates starting at `from`.
    pub async fn availability(
        &self,
        item: &ItemRef,
        from: NaiveDate,
        days: u32,
    ) -> Result<Vec<DateAvailability>> {
        if days == 0 || days > MAX_AVAILABILITY_DAYS {
            return Err(BookingError::ValidationError(format!(
                "days must be between 1 and {MAX_AVAILABILITY_DAYS}"
            )));
        }
        let capacity = self.item(item).await?.capacity;
        let bookings = self.bookings.for_item(item).await?;
        Ok(from
            .iter_days()
            .take(days as usize)
            .map(|date| availability_on(capacity, &bookings, date))
            .collect())
    }

    /// Validates `request` and checks that its slots still fit.
    pub async fn check_capacity(&self, request: &BookingRequest) -> Result<DateAvailability> {
        request.validate()?;
        let capacity = self.item(&request.item).await?.capacity;
        let bookings = self
            .bookings
            .for_item_on(&request.item, request.visit_date)
            .await?;
        ensure_capacity(capacity, &bookings, request.visit_date, request.slots)
    }

    /// Stores a new pending booking once the capacity check passes.
    #[instrument(skip_all, fields(item = %request.item, date = %request.visit_date, slots = request.slots))]
    pub async fn create_booking(&self, request: BookingRequest) -> Result<Booking> {
        let _guard = self.write_lock.lock().await;
        self.check_capacity(&request).await?;
        let booking = Booking::from_request(request);
        self.bookings.store(booking.clone()).await?;
        info!(booking_id = %booking.id, "booking created");
        Ok(booking)
    }

    /// Stores the booking behind a settled payment.
    ///
    /// The money has already moved, so this never fails on capacity: a
    /// booking that no longer fits, or that was underpaid, is stored as
    /// rejected (still paid) for refund follow-up, and only fitting bookings
    /// are confirmed. Recording the same `paid.id` twice returns the stored
    /// booking.
    #[instrument(skip_all, fields(booking_id = %paid.id, item = %paid.request.item, date = %paid.request.visit_date))]
    pub async fn record_paid_booking(&self, paid: PaidBooking) -> Result<Booking> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.bookings.get(paid.id).await? {
            return Ok(existing);
        }

        let fits = if paid.underpaid {
            warn!("paid amount below booking price, rejecting for refund");
            false
        } else {
            match self.check_capacity(&paid.request).await {
                Ok(_) => true,
                Err(e @ BookingError::CapacityExceeded { .. }) => {
                    warn!(error = %e, "paid booking no longer fits, rejecting for refund");
                    false
                }
                Err(e) => return Err(e),
            }
        };

        let mut booking = Booking::from_request(paid.request);
        booking.id = paid.id;
        if fits {
            booking.confirm()?;
        } else {
            booking.reject()?;
        }
        booking.mark_paid(paid.receipt);
        self.bookings.store(booking.clone()).await?;
        info!(status = ?booking.status, "paid booking recorded");
        Ok(booking)
    }

    pub async fn cancel_booking(&self, id: Uuid) -> Result<Booking> {
        let _guard = self.write_lock.lock().await;
        let mut booking = self.booking(id).await?;
        booking.cancel()?;
        self.bookings.store(booking.clone()).await?;
        info!(booking_id = %id, "booking cancelled");
        Ok(booking)
    }

    /// Holds `facility_id` for `booking_id` over `range`, failing on any
    /// overlap with an active reservation of the same facility.
    #[instrument(skip(self))]
    pub async fn reserve_facility(
        &self,
        facility_id: &str,
        booking_id: Uuid,
        range: DateRange,
    ) -> Result<FacilityReservation> {
        let _guard = self.write_lock.lock().await;
        let candidate = FacilityReservation::new(facility_id, booking_id, range);
        let existing = self.reservations.for_facility(facility_id).await?;
        if let Some(conflict) = find_conflict(&existing, &candidate) {
            return Err(BookingError::ReservationConflict {
                facility_id: facility_id.to_string(),
                start: conflict.range.start(),
                end: conflict.range.end(),
            });
        }
        self.reservations.store(candidate.clone()).await?;
        Ok(candidate)
    }

    pub async fn release_facility(
        &self,
        facility_id: &str,
        reservation_id: Uuid,
    ) -> Result<FacilityReservation> {
        let _guard = self.write_lock.lock().await;
        let mut reservation = self
            .reservations
            .for_facility(facility_id)
            .await?
            .into_iter()
            .find(|r| r.id == reservation_id)
            .ok_or_else(|| BookingError::NotFound(format!("reservation {reservation_id}")))?;
        reservation.active = false;
        self.reservations.store(reservation.clone()).await?;
        Ok(reservation)
    }
}
