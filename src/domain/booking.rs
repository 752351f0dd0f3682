use super::money::Amount;
use crate::error::BookingError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Trip,
    Hotel,
    Adventure,
    Attraction,
}

impl ItemKind {
    pub const ALL: [ItemKind; 4] = [
        ItemKind::Trip,
        ItemKind::Hotel,
        ItemKind::Adventure,
        ItemKind::Attraction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Trip => "trip",
            ItemKind::Hotel => "hotel",
            ItemKind::Adventure => "adventure",
            ItemKind::Attraction => "attraction",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trip" | "event" => Ok(ItemKind::Trip),
            "hotel" => Ok(ItemKind::Hotel),
            "adventure" | "adventure_place" => Ok(ItemKind::Adventure),
            "attraction" => Ok(ItemKind::Attraction),
            other => Err(BookingError::ValidationError(format!(
                "Unknown item kind: {other}"
            ))),
        }
    }
}

/// Identifies a bookable listing.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct ItemRef {
    pub kind: ItemKind,
    pub id: String,
}

impl ItemRef {
    pub fn new(kind: ItemKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Stable key used by the storage backends.
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// A listing with a fixed number of slots per visit date.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Item {
    #[serde(flatten)]
    pub item: ItemRef,
    pub name: String,
    pub capacity: u32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
    Rejected,
}

impl BookingStatus {
    /// Cancelled and rejected bookings release their slots.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Completed,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct GuestContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// What a guest submits before paying. Becomes a [`Booking`] once the
/// payment is reconciled.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct BookingRequest {
    pub item: ItemRef,
    pub visit_date: NaiveDate,
    pub slots: u32,
    pub total_amount: Amount,
    pub guest: GuestContact,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub referral_tracking_id: Option<Uuid>,
}

impl BookingRequest {
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.slots == 0 {
            return Err(BookingError::ValidationError(
                "At least one slot must be booked".to_string(),
            ));
        }
        if self.guest.name.trim().is_empty() {
            return Err(BookingError::ValidationError(
                "Guest name is required".to_string(),
            ));
        }
        if !self.guest.email.contains('@') {
            return Err(BookingError::ValidationError(format!(
                "Invalid guest email: {}",
                self.guest.email
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Booking {
    pub id: Uuid,
    pub item: ItemRef,
    pub visit_date: NaiveDate,
    pub slots_booked: u32,
    pub total_amount: Amount,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub guest: GuestContact,
    pub user_id: Option<String>,
    pub referral_tracking_id: Option<Uuid>,
    pub mpesa_receipt: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn from_request(request: BookingRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            item: request.item,
            visit_date: request.visit_date,
            slots_booked: request.slots,
            total_amount: request.total_amount,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            guest: request.guest,
            user_id: request.user_id,
            referral_tracking_id: request.referral_tracking_id,
            mpesa_receipt: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn confirm(&mut self) -> Result<(), BookingError> {
        match self.status {
            BookingStatus::Pending => {
                self.status = BookingStatus::Confirmed;
                Ok(())
            }
            BookingStatus::Confirmed => Ok(()),
            other => Err(self.transition_error(other, "confirm")),
        }
    }

    pub fn cancel(&mut self) -> Result<(), BookingError> {
        match self.status {
            BookingStatus::Pending | BookingStatus::Confirmed => {
                self.status = BookingStatus::Cancelled;
                Ok(())
            }
            other => Err(self.transition_error(other, "cancel")),
        }
    }

    pub fn reject(&mut self) -> Result<(), BookingError> {
        match self.status {
            BookingStatus::Pending => {
                self.status = BookingStatus::Rejected;
                Ok(())
            }
            other => Err(self.transition_error(other, "reject")),
        }
    }

    /// Records a successful payment. Repeated calls are no-ops.
    pub fn mark_paid(&mut self, receipt: Option<String>) {
        if self.payment_status == PaymentStatus::Pending {
            self.payment_status = PaymentStatus::Paid;
        }
        if self.mpesa_receipt.is_none() {
            self.mpesa_receipt = receipt;
        }
    }

    /// Marks a paid booking as fulfilled.
    pub fn complete(&mut self) -> Result<(), BookingError> {
        match self.payment_status {
            PaymentStatus::Paid | PaymentStatus::Completed => {
                self.payment_status = PaymentStatus::Completed;
                Ok(())
            }
            PaymentStatus::Pending => Err(BookingError::InvalidTransition(format!(
                "booking {} cannot complete before it is paid",
                self.id
            ))),
        }
    }

    fn transition_error(&self, from: BookingStatus, action: &str) -> BookingError {
        BookingError::InvalidTransition(format!(
            "booking {} cannot {action} from {from:?}",
            self.id
        ))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use rust_decimal_macros::dec;

    pub fn request(item: &ItemRef, date: &str, slots: u32) -> BookingRequest {
        BookingRequest {
            item: item.clone(),
            visit_date: date.parse().unwrap(),
            slots,
            total_amount: Amount::new(dec!(2500) * rust_decimal::Decimal::from(slots)).unwrap(),
            guest: GuestContact {
                name: "Wanjiku Kamau".to_string(),
                email: "wanjiku@example.com".to_string(),
                phone: "0712345678".to_string(),
            },
            user_id: Some("user-1".to_string()),
            referral_tracking_id: None,
        }
    }

    pub fn booking(item: &ItemRef, date: &str, slots: u32, status: BookingStatus) -> Booking {
        let mut booking = Booking::from_request(request(item, date, slots));
        booking.status = status;
        booking
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn item() -> ItemRef {
        ItemRef::new(ItemKind::Trip, "maasai-mara-3d")
    }

    #[test]
    fn test_item_kind_parsing() {
        assert_eq!("Hotel".parse::<ItemKind>().unwrap(), ItemKind::Hotel);
        assert_eq!("event".parse::<ItemKind>().unwrap(), ItemKind::Trip);
        assert_eq!(
            "adventure_place".parse::<ItemKind>().unwrap(),
            ItemKind::Adventure
        );
        assert!("castle".parse::<ItemKind>().is_err());
    }

    #[test]
    fn test_request_validation() {
        let mut req = request(&item(), "2026-12-01", 2);
        assert!(req.validate().is_ok());

        req.slots = 0;
        assert!(matches!(
            req.validate(),
            Err(BookingError::ValidationError(_))
        ));

        let mut req = request(&item(), "2026-12-01", 2);
        req.guest.email = "not-an-email".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_status_lifecycle() {
        let mut booking = booking(&item(), "2026-12-01", 2, BookingStatus::Pending);
        booking.confirm().unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert!(booking.reject().is_err());
        booking.cancel().unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert!(!booking.is_active());

        // Terminal
        assert!(matches!(
            booking.confirm(),
            Err(BookingError::InvalidTransition(_))
        ));
        assert!(booking.cancel().is_err());
    }

    #[test]
    fn test_reject_only_from_pending() {
        let mut booking = booking(&item(), "2026-12-01", 1, BookingStatus::Pending);
        booking.reject().unwrap();
        assert_eq!(booking.status, BookingStatus::Rejected);
        assert!(booking.confirm().is_err());
    }

    #[test]
    fn test_mark_paid_is_idempotent() {
        let mut booking = booking(&item(), "2026-12-01", 1, BookingStatus::Pending);
        booking.mark_paid(Some("QHX12ABC".to_string()));
        booking.mark_paid(Some("OTHER".to_string()));
        assert_eq!(booking.payment_status, PaymentStatus::Paid);
        assert_eq!(booking.mpesa_receipt.as_deref(), Some("QHX12ABC"));

        booking.complete().unwrap();
        booking.mark_paid(None);
        assert_eq!(booking.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn test_complete_requires_payment() {
        let mut booking = booking(&item(), "2026-12-01", 1, BookingStatus::Pending);
        assert!(booking.complete().is_err());
    }
}
