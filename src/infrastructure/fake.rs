//! Scripted test doubles for the payment gateway and mailer ports.
//!
//! Only compiled for unit tests and with the `test-util` feature.

use crate::domain::booking::{Booking, Item};
use crate::domain::payment::{StkPushAck, StkPushRequest, StkQueryStatus};
use crate::domain::ports::{Mailer, PaymentGateway};
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// A payment gateway that replays queued query outcomes.
///
/// Pushes are always accepted with sequential checkout ids
/// (`ws_CO_FAKE_1`, `ws_CO_FAKE_2`, ...) unless a push error is queued.
/// When the query queue is empty the payment stays `Processing`.
#[derive(Default, Clone)]
pub struct ScriptedGateway {
    counter: Arc<AtomicU64>,
    pushes: Arc<Mutex<Vec<StkPushRequest>>>,
    push_errors: Arc<Mutex<VecDeque<BookingError>>>,
    queries: Arc<Mutex<VecDeque<Result<StkQueryStatus>>>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_next_push(&self, error: BookingError) {
        self.push_errors.lock().await.push_back(error);
    }

    pub async fn queue_query(&self, outcome: Result<StkQueryStatus>) {
        self.queries.lock().await.push_back(outcome);
    }

    /// Every push request received so far.
    pub async fn pushes(&self) -> Vec<StkPushRequest> {
        self.pushes.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn stk_push(&self, request: &StkPushRequest) -> Result<StkPushAck> {
        if let Some(error) = self.push_errors.lock().await.pop_front() {
            return Err(error);
        }
        self.pushes.lock().await.push(request.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(StkPushAck {
            merchant_request_id: format!("MR_FAKE_{n}"),
            checkout_request_id: format!("ws_CO_FAKE_{n}"),
            customer_message: "Success. Request accepted for processing".to_string(),
        })
    }

    async fn stk_query(&self, _checkout_request_id: &str) -> Result<StkQueryStatus> {
        self.queries
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(StkQueryStatus::Processing))
    }
}

/// Records confirmations, optionally failing every send.
#[derive(Default, Clone)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<Booking>>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<Booking> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_booking_confirmation(&self, booking: &Booking, _item: &Item) -> Result<()> {
        if self.fail {
            return Err(BookingError::ProviderError("mailbox unavailable".to_string()));
        }
        self.sent.lock().await.push(booking.clone());
        Ok(())
    }
}
