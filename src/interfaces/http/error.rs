use crate::error::BookingError;
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

/// Errors returned by the HTTP handlers as `{"success": false, "error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    Booking(BookingError),
    BadRequest(String),
    PaymentsDisabled,
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        ApiError::Booking(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

pub fn status_for(e: &BookingError) -> StatusCode {
    match e {
        BookingError::ValidationError(_) | BookingError::CsvError(_) => StatusCode::BAD_REQUEST,
        BookingError::NotFound(_) => StatusCode::NOT_FOUND,
        BookingError::CapacityExceeded { .. }
        | BookingError::ReservationConflict { .. }
        | BookingError::InvalidTransition(_) => StatusCode::CONFLICT,
        BookingError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        BookingError::ProviderError(_) | BookingError::HttpError(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, retry_after) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, None),
            ApiError::PaymentsDisabled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "M-Pesa payments are not configured".to_string(),
                None,
            ),
            ApiError::Booking(e) => {
                let status = status_for(&e);
                let retry_after = match &e {
                    BookingError::RateLimited { retry_after } => *retry_after,
                    _ => None,
                };
                let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(error = %e, "request failed");
                    "Internal server error".to_string()
                } else {
                    e.to_string()
                };
                (status, message, retry_after)
            }
        };

        let mut body = json!({"success": false, "error": message});
        if status == StatusCode::TOO_MANY_REQUESTS {
            body["retryable"] = json!(true);
            body["retry_after"] = json!(retry_after);
        }
        let mut resp = (status, Json(body)).into_response();
        if let Some(secs) = retry_after
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            resp.headers_mut().insert(RETRY_AFTER, value);
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&BookingError::ValidationError("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&BookingError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&BookingError::CapacityExceeded {
                date: "2026-11-01".parse().unwrap(),
                requested: 2,
                available: 1,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&BookingError::ProviderError("x".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&BookingError::ConfigError("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let resp =
            ApiError::from(BookingError::RateLimited { retry_after: Some(12) }).into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get(RETRY_AFTER).unwrap(), "12");
    }

    #[test]
    fn test_internal_errors_are_generic() {
        let resp = ApiError::from(BookingError::InternalError(Box::new(std::io::Error::other(
            "disk on fire",
        ))))
        .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
