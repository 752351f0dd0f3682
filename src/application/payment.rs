use super::booking::{BookingService, PaidBooking};
use super::referral::ReferralService;
use crate::domain::booking::{Booking, BookingRequest, BookingStatus};
use crate::domain::money::Amount;
use crate::domain::payment::{
    CallbackLogEntry, PaymentState, PaymentVerdict, PendingPayment, StkCallback, StkPushRequest,
    StkQueryStatus, normalize_phone,
};
use crate::domain::ports::{
    CallbackLogBox, MailerBox, PaymentGatewayBox, PendingPaymentStoreBox,
};
use crate::error::{BookingError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// A customer's request to pay for a booking from their phone.
#[derive(Debug, Deserialize, Clone)]
pub struct PaymentRequest {
    pub phone: String,
    pub amount: Amount,
    #[serde(default)]
    pub account_reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub booking: BookingRequest,
}

/// A pending payment plus the provider's message for the customer.
#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub payment: PendingPayment,
    pub customer_message: String,
}

/// Drives a push payment from initiation to a settled booking.
///
/// Verdicts arrive from the webhook or from polling, possibly both, in any
/// order. Settlement runs under a lock and re-reads the pending payment so
/// each payment produces at most one booking.
pub struct PaymentReconciler {
    bookings: Arc<BookingService>,
    referrals: Arc<ReferralService>,
    payments: PendingPaymentStoreBox,
    callback_log: CallbackLogBox,
    gateway: PaymentGatewayBox,
    mailer: MailerBox,
    settle_lock: Mutex<()>,
}

impl PaymentReconciler {
    pub fn new(
        bookings: Arc<BookingService>,
        referrals: Arc<ReferralService>,
        payments: PendingPaymentStoreBox,
        callback_log: CallbackLogBox,
        gateway: PaymentGatewayBox,
        mailer: MailerBox,
    ) -> Self {
        Self {
            bookings,
            referrals,
            payments,
            callback_log,
            gateway,
            mailer,
            settle_lock: Mutex::new(()),
        }
    }

    /// Sends the STK push and records the pending payment.
    ///
    /// The booking is validated against capacity before the provider is
    /// contacted; nothing is stored when the push is refused.
    #[instrument(skip_all, fields(item = %request.booking.item, date = %request.booking.visit_date))]
    pub async fn initiate(&self, request: PaymentRequest) -> Result<InitiatedPayment> {
        let phone = normalize_phone(&request.phone)?;
        if request.amount != request.booking.total_amount {
            return Err(BookingError::ValidationError(format!(
                "Payment amount {} does not match booking total {}",
                request.amount, request.booking.total_amount
            )));
        }
        self.bookings.check_capacity(&request.booking).await?;

        let push = StkPushRequest {
            phone: phone.clone(),
            amount: request.amount,
            account_reference: request
                .account_reference
                .unwrap_or_else(|| request.booking.item.id.clone()),
            description: request
                .description
                .unwrap_or_else(|| format!("{} booking", request.booking.item.kind)),
        };
        let ack = self.gateway.stk_push(&push).await?;

        let pending = PendingPayment::new(&ack, phone, request.amount, request.booking);
        self.payments.store(pending.clone()).await?;
        info!(checkout_request_id = %pending.checkout_request_id, "payment initiated");
        Ok(InitiatedPayment {
            payment: pending,
            customer_message: ack.customer_message,
        })
    }

    /// Handles a webhook delivery. The raw payload is logged before anything
    /// else; malformed or unknown callbacks are logged and ignored.
    #[instrument(skip_all)]
    pub async fn handle_callback(&self, payload: Value) -> Result<Option<PendingPayment>> {
        self.callback_log
            .append(CallbackLogEntry::new(payload.clone()))
            .await?;

        let callback = match StkCallback::parse(&payload) {
            Ok(callback) => callback,
            Err(e) => {
                warn!(error = %e, "ignoring malformed M-Pesa callback");
                return Ok(None);
            }
        };
        let Some(pending) = self.payments.get(&callback.checkout_request_id).await? else {
            warn!(
                checkout_request_id = %callback.checkout_request_id,
                "callback for unknown checkout request"
            );
            return Ok(None);
        };
        let paid = callback.paid_amount();
        if let Some(paid) = paid
            && paid != pending.amount.value()
        {
            warn!(
                checkout_request_id = %pending.checkout_request_id,
                expected = %pending.amount,
                %paid,
                "callback amount differs from requested amount"
            );
        }

        self.settle(&callback.checkout_request_id, callback.verdict(), paid)
            .await
            .map(Some)
    }

    /// Asks the provider for the payment's status and settles it if final.
    ///
    /// Settled payments are returned without contacting the provider. A rate
    /// limited query surfaces as `RateLimited` and leaves the payment as is.
    #[instrument(skip(self))]
    pub async fn poll(&self, checkout_request_id: &str) -> Result<PendingPayment> {
        let pending = self.pending(checkout_request_id).await?;
        if pending.needs_reconciliation() {
            return self.resume(checkout_request_id).await;
        }
        if pending.state.is_terminal() {
            return Ok(pending);
        }

        match self.gateway.stk_query(checkout_request_id).await {
            Ok(StkQueryStatus::Processing) => {
                debug!("payment still processing");
                Ok(pending)
            }
            Ok(StkQueryStatus::Settled(verdict)) => {
                self.settle(checkout_request_id, verdict, None).await
            }
            Err(e @ BookingError::RateLimited { .. }) => {
                warn!(error = %e, "status query rate limited, payment left pending");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn pending(&self, checkout_request_id: &str) -> Result<PendingPayment> {
        self.payments
            .get(checkout_request_id)
            .await?
            .ok_or_else(|| {
                BookingError::NotFound(format!("checkout request {checkout_request_id}"))
            })
    }

    /// Applies a verdict and, for a successful payment, records the booking
    /// and commission.
    ///
    /// The payment is stored with its booking id before any booking is
    /// written, and both follow-ups are idempotent, so a delivery that finds
    /// a successful but unreconciled payment finishes the job instead of
    /// skipping it.
    async fn settle(
        &self,
        checkout_request_id: &str,
        verdict: PaymentVerdict,
        paid_amount: Option<Decimal>,
    ) -> Result<PendingPayment> {
        let _guard = self.settle_lock.lock().await;
        let mut pending = self.pending(checkout_request_id).await?;
        if !pending.apply(&verdict) {
            if pending.needs_reconciliation() {
                info!(checkout_request_id, "resuming reconciliation of settled payment");
                return self.reconcile(pending).await;
            }
            debug!(state = ?pending.state, "payment already settled");
            return Ok(pending);
        }

        if pending.state == PaymentState::Failed {
            self.payments.store(pending.clone()).await?;
            info!(
                checkout_request_id,
                result_code = ?pending.result_code,
                result_desc = pending.result_desc.as_deref().unwrap_or(""),
                "payment failed"
            );
            return Ok(pending);
        }

        pending.paid_amount = paid_amount;
        pending.booking_id = Some(Uuid::new_v4());
        self.payments.store(pending.clone()).await?;
        self.reconcile(pending).await
    }

    /// Finishes a successful payment settled by a delivery that failed
    /// part way.
    async fn resume(&self, checkout_request_id: &str) -> Result<PendingPayment> {
        let _guard = self.settle_lock.lock().await;
        let pending = self.pending(checkout_request_id).await?;
        if !pending.needs_reconciliation() {
            return Ok(pending);
        }
        self.reconcile(pending).await
    }

    /// Records the booking and commission for a successful payment. Must be
    /// called under `settle_lock`.
    async fn reconcile(&self, mut pending: PendingPayment) -> Result<PendingPayment> {
        let booking_id = *pending.booking_id.get_or_insert_with(Uuid::new_v4);
        let booking = self
            .bookings
            .record_paid_booking(PaidBooking {
                id: booking_id,
                request: pending.booking.clone(),
                receipt: pending.mpesa_receipt.clone(),
                underpaid: pending.is_underpaid(),
            })
            .await?;
        let confirmed = booking.status == BookingStatus::Confirmed;
        if confirmed {
            self.referrals.award_commission(&booking).await?;
        }

        pending.reconciled = true;
        self.payments.store(pending.clone()).await?;
        info!(
            checkout_request_id = %pending.checkout_request_id,
            booking_id = %booking.id,
            status = ?booking.status,
            receipt = pending.mpesa_receipt.as_deref().unwrap_or("-"),
            "payment succeeded"
        );
        if confirmed {
            self.send_confirmation(&booking).await;
        }
        Ok(pending)
    }

    async fn send_confirmation(&self, booking: &Booking) {
        let item = match self.bookings.item(&booking.item).await {
            Ok(item) => item,
            Err(e) => {
                warn!(error = %e, booking_id = %booking.id, "cannot load item for confirmation email");
                return;
            }
        };
        if let Err(e) = self.mailer.send_booking_confirmation(booking, &item).await {
            warn!(error = %e, booking_id = %booking.id, "confirmation email failed");
        }
    }
}
