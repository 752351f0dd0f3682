use crate::domain::availability::SlotClaim;
use crate::domain::booking::BookingStatus;
use crate::error::{BookingError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;

/// One line of a bookings export: `visit_date,slots_booked[,status]`.
///
/// A missing or empty status counts as pending, which holds capacity.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
pub struct BookingRow {
    pub visit_date: NaiveDate,
    pub slots_booked: u32,
    #[serde(default)]
    pub status: Option<BookingStatus>,
}

impl SlotClaim for BookingRow {
    fn visit_date(&self) -> NaiveDate {
        self.visit_date
    }

    fn slots(&self) -> u32 {
        self.slots_booked
    }

    fn is_active(&self) -> bool {
        self.status.unwrap_or_default().is_active()
    }
}

/// Reads booking rows from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// so exports with or without the status column both parse.
pub struct BookingReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> BookingReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows; a malformed line yields an error and the
    /// iterator carries on with the next one.
    pub fn rows(self) -> impl Iterator<Item = Result<BookingRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BookingError::from))
    }
}
