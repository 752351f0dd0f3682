//! JSON HTTP service.

pub mod error;
pub mod handlers;

use crate::application::booking::BookingService;
use crate::application::payment::PaymentReconciler;
use crate::application::presence::PresenceTracker;
use crate::application::referral::ReferralService;
use crate::domain::ports::CallbackLog;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;

/// Shared handles for every handler. `payments` is `None` when the
/// M-Pesa credentials are not configured; webhook deliveries are still
/// written to `callback_log` then.
#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingService>,
    pub payments: Option<Arc<PaymentReconciler>>,
    pub callback_log: Arc<dyn CallbackLog>,
    pub referrals: Arc<ReferralService>,
    pub presence: Arc<PresenceTracker>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/mpesa/stk-push", post(handlers::stk_push))
        .route("/api/mpesa/query", post(handlers::stk_query))
        .route("/api/mpesa/callback", post(handlers::mpesa_callback))
        .route(
            "/api/items/{kind}/{id}/availability",
            get(handlers::availability),
        )
        .route("/api/items/{kind}/{id}/viewers", get(handlers::viewers))
        .route("/api/bookings/{id}", get(handlers::booking))
        .route("/api/referrals/track", post(handlers::track_referral))
        .route("/api/presence", post(handlers::presence))
        .with_state(state)
}
