//! Capacity math and date-range conflict checks.
//!
//! Everything here is pure: callers load bookings and reservations from the
//! stores and pass them in.

use super::booking::Booking;
use crate::error::BookingError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Above this booked/capacity ratio a date is reported as partially booked.
pub const PARTIALLY_BOOKED_RATIO: f64 = 0.7;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    Available,
    PartiallyBooked,
    FullyBooked,
}

impl AvailabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityStatus::Available => "available",
            AvailabilityStatus::PartiallyBooked => "partially_booked",
            AvailabilityStatus::FullyBooked => "fully_booked",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct DateAvailability {
    pub date: NaiveDate,
    pub capacity: u32,
    pub booked: u32,
    pub available: u32,
    pub status: AvailabilityStatus,
}

impl DateAvailability {
    pub fn new(date: NaiveDate, capacity: u32, booked: u32) -> Self {
        let available = capacity.saturating_sub(booked);
        let status = if available == 0 {
            AvailabilityStatus::FullyBooked
        } else if f64::from(booked) / f64::from(capacity) > PARTIALLY_BOOKED_RATIO {
            AvailabilityStatus::PartiallyBooked
        } else {
            AvailabilityStatus::Available
        };
        Self {
            date,
            capacity,
            booked,
            available,
            status,
        }
    }
}

/// Anything that holds slots on a visit date.
pub trait SlotClaim {
    fn visit_date(&self) -> NaiveDate;
    fn slots(&self) -> u32;
    /// Inactive claims (cancelled, rejected) do not consume capacity.
    fn is_active(&self) -> bool;
}

impl SlotClaim for Booking {
    fn visit_date(&self) -> NaiveDate {
        self.visit_date
    }

    fn slots(&self) -> u32 {
        self.slots_booked
    }

    fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Sums active slots per visit date.
pub fn booked_slots<'a, I, C>(claims: I) -> BTreeMap<NaiveDate, u32>
where
    I: IntoIterator<Item = &'a C>,
    C: SlotClaim + 'a,
{
    let mut totals = BTreeMap::new();
    for claim in claims.into_iter().filter(|c| c.is_active()) {
        let entry = totals.entry(claim.visit_date()).or_insert(0u32);
        *entry = entry.saturating_add(claim.slots());
    }
    totals
}

/// Availability for every date that has at least one active claim.
pub fn compute_availability<'a, I, C>(capacity: u32, claims: I) -> BTreeMap<NaiveDate, DateAvailability>
where
    I: IntoIterator<Item = &'a C>,
    C: SlotClaim + 'a,
{
    booked_slots(claims)
        .into_iter()
        .map(|(date, booked)| (date, DateAvailability::new(date, capacity, booked)))
        .collect()
}

/// Availability for a single date; dates without claims report full capacity.
pub fn availability_on<'a, I, C>(capacity: u32, claims: I, date: NaiveDate) -> DateAvailability
where
    I: IntoIterator<Item = &'a C>,
    C: SlotClaim + 'a,
{
    let booked = booked_slots(claims.into_iter().filter(|c| c.visit_date() == date))
        .get(&date)
        .copied()
        .unwrap_or(0);
    DateAvailability::new(date, capacity, booked)
}

/// Fails when `requested` slots do not fit on `date`.
pub fn ensure_capacity<'a, I, C>(
    capacity: u32,
    claims: I,
    date: NaiveDate,
    requested: u32,
) -> Result<DateAvailability, BookingError>
where
    I: IntoIterator<Item = &'a C>,
    C: SlotClaim + 'a,
{
    if requested == 0 {
        return Err(BookingError::ValidationError(
            "At least one slot must be requested".to_string(),
        ));
    }
    let current = availability_on(capacity, claims, date);
    if requested > current.available {
        return Err(BookingError::CapacityExceeded {
            date,
            requested,
            available: current.available,
        });
    }
    Ok(current)
}

/// An inclusive range of calendar days.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = BookingError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, BookingError> {
        if end < start {
            return Err(BookingError::ValidationError(format!(
                "Date range ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn single_day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }
}

/// A booking's hold on a specific facility (room, campsite, hall) over a date range.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct FacilityReservation {
    pub id: Uuid,
    pub facility_id: String,
    pub booking_id: Uuid,
    pub range: DateRange,
    pub active: bool,
}

impl FacilityReservation {
    pub fn new(facility_id: impl Into<String>, booking_id: Uuid, range: DateRange) -> Self {
        Self {
            id: Uuid::new_v4(),
            facility_id: facility_id.into(),
            booking_id,
            range,
            active: true,
        }
    }
}

/// First active reservation on the same facility that overlaps `candidate`.
pub fn find_conflict<'a, I>(
    existing: I,
    candidate: &FacilityReservation,
) -> Option<&'a FacilityReservation>
where
    I: IntoIterator<Item = &'a FacilityReservation>,
{
    existing.into_iter().find(|r| {
        r.active
            && r.id != candidate.id
            && r.facility_id == candidate.facility_id
            && r.range.overlaps(&candidate.range)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::fixtures::booking;
    use crate::domain::booking::{BookingStatus, ItemKind, ItemRef};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn item() -> ItemRef {
        ItemRef::new(ItemKind::Adventure, "hells-gate-cycling")
    }

    #[test]
    fn test_status_thresholds() {
        let date = d("2026-11-01");
        assert_eq!(
            DateAvailability::new(date, 10, 0).status,
            AvailabilityStatus::Available
        );
        // Exactly 70% is still available
        assert_eq!(
            DateAvailability::new(date, 10, 7).status,
            AvailabilityStatus::Available
        );
        assert_eq!(
            DateAvailability::new(date, 10, 8).status,
            AvailabilityStatus::PartiallyBooked
        );
        assert_eq!(
            DateAvailability::new(date, 10, 10).status,
            AvailabilityStatus::FullyBooked
        );
    }

    #[test]
    fn test_overbooked_date_clamps_to_zero() {
        let a = DateAvailability::new(d("2026-11-01"), 5, 9);
        assert_eq!(a.available, 0);
        assert_eq!(a.status, AvailabilityStatus::FullyBooked);
    }

    #[test]
    fn test_zero_capacity_is_fully_booked() {
        let a = DateAvailability::new(d("2026-11-01"), 0, 0);
        assert_eq!(a.available, 0);
        assert_eq!(a.status, AvailabilityStatus::FullyBooked);
    }

    #[test]
    fn test_compute_availability_skips_inactive_bookings() {
        let item = item();
        let bookings = vec![
            booking(&item, "2026-11-01", 3, BookingStatus::Confirmed),
            booking(&item, "2026-11-01", 4, BookingStatus::Pending),
            booking(&item, "2026-11-01", 5, BookingStatus::Cancelled),
            booking(&item, "2026-11-02", 2, BookingStatus::Rejected),
            booking(&item, "2026-11-03", 10, BookingStatus::Confirmed),
        ];

        let availability = compute_availability(10, &bookings);
        assert_eq!(availability.len(), 2);

        let first = &availability[&d("2026-11-01")];
        assert_eq!(first.booked, 7);
        assert_eq!(first.available, 3);
        assert_eq!(first.status, AvailabilityStatus::Available);

        assert!(!availability.contains_key(&d("2026-11-02")));
        assert_eq!(
            availability[&d("2026-11-03")].status,
            AvailabilityStatus::FullyBooked
        );
    }

    #[test]
    fn test_availability_on_empty_date() {
        let a = availability_on(12, std::iter::empty::<&Booking>(), d("2026-11-05"));
        assert_eq!(a.available, 12);
        assert_eq!(a.booked, 0);
    }

    #[test]
    fn test_ensure_capacity() {
        let item = item();
        let bookings = vec![booking(&item, "2026-11-01", 8, BookingStatus::Confirmed)];

        assert!(ensure_capacity(10, &bookings, d("2026-11-01"), 2).is_ok());
        let err = ensure_capacity(10, &bookings, d("2026-11-01"), 3).unwrap_err();
        assert!(matches!(
            err,
            BookingError::CapacityExceeded {
                requested: 3,
                available: 2,
                ..
            }
        ));
        assert!(matches!(
            ensure_capacity(10, &bookings, d("2026-11-01"), 0),
            Err(BookingError::ValidationError(_))
        ));
    }

    #[test]
    fn test_date_range_validation() {
        assert!(DateRange::new(d("2026-11-02"), d("2026-11-01")).is_err());
        let r = DateRange::new(d("2026-11-01"), d("2026-11-03")).unwrap();
        assert_eq!(r.days().count(), 3);
        assert_eq!(DateRange::single_day(d("2026-11-01")).days().count(), 1);
    }

    #[test]
    fn test_overlap_is_inclusive() {
        let a = DateRange::new(d("2026-11-01"), d("2026-11-05")).unwrap();
        let touching = DateRange::new(d("2026-11-05"), d("2026-11-08")).unwrap();
        let after = DateRange::new(d("2026-11-06"), d("2026-11-08")).unwrap();
        let inside = DateRange::new(d("2026-11-02"), d("2026-11-03")).unwrap();
        let before = DateRange::new(d("2026-10-25"), d("2026-10-31")).unwrap();

        assert!(a.overlaps(&touching));
        assert!(touching.overlaps(&a));
        assert!(a.overlaps(&inside));
        assert!(inside.overlaps(&a));
        assert!(!a.overlaps(&after));
        assert!(!a.overlaps(&before));
        assert!(!before.overlaps(&a));
    }

    #[test]
    fn test_overlap_matches_day_intersection() {
        let base = d("2026-11-01");
        let ranges: Vec<DateRange> = (0..6)
            .flat_map(|s| (s..6).map(move |e| (s, e)))
            .map(|(s, e)| {
                DateRange::new(
                    base + chrono::Days::new(s),
                    base + chrono::Days::new(e),
                )
                .unwrap()
            })
            .collect();

        for a in &ranges {
            for b in &ranges {
                let shares_a_day = a.days().any(|day| b.days().any(|other| other == day));
                assert_eq!(a.overlaps(b), shares_a_day, "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn test_find_conflict_ignores_other_facilities_and_inactive() {
        let range = DateRange::new(d("2026-12-20"), d("2026-12-24")).unwrap();
        let mut cancelled = FacilityReservation::new("room-12", Uuid::new_v4(), range);
        cancelled.active = false;
        let other_room = FacilityReservation::new("room-14", Uuid::new_v4(), range);
        let existing = vec![cancelled, other_room];

        let candidate = FacilityReservation::new(
            "room-12",
            Uuid::new_v4(),
            DateRange::new(d("2026-12-22"), d("2026-12-26")).unwrap(),
        );
        assert!(find_conflict(&existing, &candidate).is_none());

        let live = FacilityReservation::new("room-12", Uuid::new_v4(), range);
        let existing = vec![live.clone()];
        assert_eq!(find_conflict(&existing, &candidate), Some(&live));
    }
}
