use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not enough capacity on {date}: requested {requested}, available {available}")]
    CapacityExceeded {
        date: NaiveDate,
        requested: u32,
        available: u32,
    },
    #[error("Facility {facility_id} is already reserved between {start} and {end}")]
    ReservationConflict {
        facility_id: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),
    #[error("Payment provider is rate limiting requests")]
    RateLimited { retry_after: Option<u64> },
    #[error("Payment provider error: {0}")]
    ProviderError(String),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl BookingError {
    /// Rate limiting is a retry signal, not a payment outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::RateLimited { .. })
    }
}

pub type Result<T> = std::result::Result<T, BookingError>;
