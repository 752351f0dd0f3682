use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tripdesk::application::booking::BookingService;
use tripdesk::application::payment::PaymentReconciler;
use tripdesk::application::presence::PresenceTracker;
use tripdesk::application::referral::ReferralService;
use tripdesk::config::{self, Config};
use tripdesk::domain::availability::compute_availability;
use tripdesk::domain::booking::Item;
use tripdesk::domain::ports::{
    BookingStoreBox, CallbackLog, CallbackLogBox, CommissionStoreBox, FacilityReservationStoreBox,
    ItemCatalogBox, MailerBox, PendingPaymentStoreBox, ReferralStoreBox,
};
use tripdesk::infrastructure::email::{HttpMailer, LogMailer};
use tripdesk::infrastructure::in_memory::{
    InMemoryBookingStore, InMemoryCallbackLog, InMemoryCommissionStore,
    InMemoryFacilityReservationStore, InMemoryItemCatalog, InMemoryPendingPaymentStore,
    InMemoryReferralStore,
};
use tripdesk::infrastructure::mpesa::DarajaClient;
#[cfg(feature = "storage-rocksdb")]
use tripdesk::infrastructure::rocksdb::RocksDBStore;
use tripdesk::interfaces::csv::availability_writer::AvailabilityWriter;
use tripdesk::interfaces::csv::booking_reader::{BookingReader, BookingRow};
use tripdesk::interfaces::http::{AppState, router};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Prints per-date availability for a bookings CSV.
    Availability {
        /// Input bookings CSV file (`visit_date,slots_booked[,status]`)
        input: PathBuf,

        /// Total slots per date
        #[arg(long)]
        capacity: u32,
    },
    /// Runs the HTTP service.
    Serve {
        /// Address to listen on; overrides TRIPDESK_BIND
        #[arg(long)]
        bind: Option<String>,

        /// JSON file with the bookable items (`[{kind, id, name, capacity}]`)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

fn init_tracing() -> Result<()> {
    let log_json = config::log_json(|key| std::env::var(key).ok()).into_diagnostic()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if log_json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Command::Availability { input, capacity } => availability_report(input, capacity),
        Command::Serve {
            bind,
            catalog,
            db_path,
        } => serve(bind, catalog, db_path).await,
    }
}

fn availability_report(input: PathBuf, capacity: u32) -> Result<()> {
    let file = File::open(input).into_diagnostic()?;
    let reader = BookingReader::new(file);
    let mut rows: Vec<BookingRow> = Vec::new();
    for row in reader.rows() {
        match row {
            Ok(row) => rows.push(row),
            Err(e) => warn!(error = %e, "skipping unreadable booking row"),
        }
    }

    let report = compute_availability(capacity, &rows);
    let stdout = io::stdout();
    let mut writer = AvailabilityWriter::new(stdout.lock());
    writer.write_all(report.into_values()).into_diagnostic()?;
    Ok(())
}

struct Stores {
    catalog: ItemCatalogBox,
    bookings: BookingStoreBox,
    reservations: FacilityReservationStoreBox,
    payments: PendingPaymentStoreBox,
    callback_log: CallbackLogBox,
    referrals: ReferralStoreBox,
    commissions: CommissionStoreBox,
}

impl Stores {
    fn in_memory() -> Self {
        Self {
            catalog: Box::new(InMemoryItemCatalog::new()),
            bookings: Box::new(InMemoryBookingStore::new()),
            reservations: Box::new(InMemoryFacilityReservationStore::new()),
            payments: Box::new(InMemoryPendingPaymentStore::new()),
            callback_log: Box::new(InMemoryCallbackLog::new()),
            referrals: Box::new(InMemoryReferralStore::new()),
            commissions: Box::new(InMemoryCommissionStore::new()),
        }
    }

    #[cfg(feature = "storage-rocksdb")]
    fn rocksdb(path: PathBuf) -> Result<Self> {
        let store = RocksDBStore::open(path).into_diagnostic()?;
        Ok(Self {
            catalog: Box::new(store.clone()),
            bookings: Box::new(store.clone()),
            reservations: Box::new(store.clone()),
            payments: Box::new(store.clone()),
            callback_log: Box::new(store.clone()),
            referrals: Box::new(store.clone()),
            commissions: Box::new(store),
        })
    }

    fn open(db_path: Option<PathBuf>) -> Result<Self> {
        match db_path {
            #[cfg(feature = "storage-rocksdb")]
            Some(path) => {
                info!(path = %path.display(), "using RocksDB storage");
                Self::rocksdb(path)
            }
            #[cfg(not(feature = "storage-rocksdb"))]
            Some(_) => {
                warn!(
                    "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
                );
                Ok(Self::in_memory())
            }
            None => Ok(Self::in_memory()),
        }
    }
}

async fn serve(
    bind: Option<String>,
    catalog: Option<PathBuf>,
    db_path: Option<PathBuf>,
) -> Result<()> {
    let config = Config::from_env().into_diagnostic()?;
    let stores = Stores::open(db_path)?;

    let bookings = Arc::new(BookingService::new(
        stores.catalog,
        stores.bookings,
        stores.reservations,
    ));
    if let Some(path) = catalog {
        let items: Vec<Item> =
            serde_json::from_reader(File::open(&path).into_diagnostic()?).into_diagnostic()?;
        info!(count = items.len(), path = %path.display(), "loading item catalog");
        for item in items {
            bookings.add_item(item).await.into_diagnostic()?;
        }
    }

    let referrals = Arc::new(ReferralService::new(
        stores.referrals,
        stores.commissions,
        config.commission_rates.clone(),
        config.attribution_window_days,
    ));

    let callback_log: Arc<dyn CallbackLog> = Arc::from(stores.callback_log);
    let payments = match config.mpesa.clone() {
        Some(mpesa) => {
            info!(base_url = %mpesa.base_url, shortcode = %mpesa.shortcode, "M-Pesa payments enabled");
            let mailer: MailerBox = match config.email.clone() {
                Some(email) => Box::new(HttpMailer::new(email).into_diagnostic()?),
                None => Box::new(LogMailer),
            };
            Some(Arc::new(PaymentReconciler::new(
                bookings.clone(),
                referrals.clone(),
                stores.payments,
                Box::new(callback_log.clone()),
                Box::new(DarajaClient::new(mpesa).into_diagnostic()?),
                mailer,
            )))
        }
        None => None,
    };

    let state = AppState {
        bookings,
        payments,
        callback_log,
        referrals,
        presence: Arc::new(PresenceTracker::new(config.presence_ttl_secs)),
    };

    let bind = bind.unwrap_or(config.bind);
    let listener = TcpListener::bind(&bind).await.into_diagnostic()?;
    info!(address = %bind, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .into_diagnostic()?;
    Ok(())
}
