#![allow(dead_code)]

use rand::Rng;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use tripdesk::application::booking::BookingService;
use tripdesk::application::payment::PaymentReconciler;
use tripdesk::application::presence::PresenceTracker;
use tripdesk::application::referral::ReferralService;
use rust_decimal::Decimal;
use tripdesk::domain::booking::{BookingRequest, GuestContact, Item, ItemKind, ItemRef};
use tripdesk::domain::money::Amount;
use tripdesk::domain::referral::CommissionRates;
use tripdesk::infrastructure::fake::{RecordingMailer, ScriptedGateway};
use tripdesk::infrastructure::in_memory::{
    InMemoryBookingStore, InMemoryCallbackLog, InMemoryCommissionStore,
    InMemoryFacilityReservationStore, InMemoryItemCatalog, InMemoryPendingPaymentStore,
    InMemoryReferralStore,
};
use tripdesk::interfaces::http::AppState;

const STATUSES: [&str; 5] = ["confirmed", "pending", "cancelled", "rejected", ""];

/// Writes `rows` random bookings spread over `days` dates starting 2026-12-01.
pub fn generate_bookings_csv(path: &Path, rows: usize, days: u32) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(["visit_date", "slots_booked", "status"])?;

    let start: chrono::NaiveDate = "2026-12-01".parse().map_err(Error::other)?;
    let mut rng = rand::thread_rng();
    for _ in 0..rows {
        let date = start + chrono::Duration::days(rng.gen_range(0..days) as i64);
        let slots = rng.gen_range(1..=6u32);
        let status = STATUSES[rng.gen_range(0..STATUSES.len())];
        wtr.write_record([date.to_string(), slots.to_string(), status.to_string()])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn safari() -> ItemRef {
    ItemRef::new(ItemKind::Trip, "mara-3d")
}

pub fn guest() -> GuestContact {
    GuestContact {
        name: "Achieng Otieno".to_string(),
        email: "achieng@example.com".to_string(),
        phone: "0722000111".to_string(),
    }
}

/// A `safari()` request priced at 2500 per slot.
pub fn booking_request(date: &str, slots: u32) -> BookingRequest {
    BookingRequest {
        item: safari(),
        visit_date: date.parse().unwrap(),
        slots,
        total_amount: Amount::new(Decimal::from(2500 * slots)).unwrap(),
        guest: guest(),
        user_id: None,
        referral_tracking_id: None,
    }
}

pub struct TestApp {
    pub state: AppState,
    pub gateway: ScriptedGateway,
    pub mailer: RecordingMailer,
    pub bookings: InMemoryBookingStore,
    pub callback_log: InMemoryCallbackLog,
}

/// Wires every service over in-memory stores and a scripted gateway, with
/// a single `safari()` item of the given capacity.
pub fn test_app(capacity: u32) -> TestApp {
    let gateway = ScriptedGateway::new();
    let mailer = RecordingMailer::new();
    let bookings = InMemoryBookingStore::new();
    let callback_log = InMemoryCallbackLog::new();

    let booking_service = Arc::new(BookingService::new(
        Box::new(InMemoryItemCatalog::with_items([Item {
            item: safari(),
            name: "Maasai Mara three-day safari".to_string(),
            capacity,
        }])),
        Box::new(bookings.clone()),
        Box::new(InMemoryFacilityReservationStore::new()),
    ));
    let referrals = Arc::new(ReferralService::new(
        Box::new(InMemoryReferralStore::new()),
        Box::new(InMemoryCommissionStore::new()),
        CommissionRates::default(),
        30,
    ));
    let payments = Arc::new(PaymentReconciler::new(
        booking_service.clone(),
        referrals.clone(),
        Box::new(InMemoryPendingPaymentStore::new()),
        Box::new(callback_log.clone()),
        Box::new(gateway.clone()),
        Box::new(mailer.clone()),
    ));

    TestApp {
        state: AppState {
            bookings: booking_service,
            payments: Some(payments),
            callback_log: Arc::new(callback_log.clone()),
            referrals,
            presence: Arc::new(PresenceTracker::new(60)),
        },
        gateway,
        mailer,
        bookings,
        callback_log,
    }
}
