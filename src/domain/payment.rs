use super::booking::BookingRequest;
use super::money::Amount;
use crate::error::BookingError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Result code Daraja uses for a completed payment.
pub const RESULT_CODE_SUCCESS: i64 = 0;
/// Daraja error code returned by STK query while the customer has not answered yet.
pub const ERROR_CODE_STILL_PROCESSING: &str = "500.001.1001";

/// Normalises a Kenyan mobile number to the `2547XXXXXXXX` / `2541XXXXXXXX`
/// form Daraja expects.
pub fn normalize_phone(raw: &str) -> Result<String, BookingError> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let digits = digits.strip_prefix('+').unwrap_or(&digits);

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid_phone(raw));
    }

    let local = if let Some(rest) = digits.strip_prefix("254") {
        rest
    } else if let Some(rest) = digits.strip_prefix('0') {
        rest
    } else {
        digits
    };

    if local.len() == 9 && (local.starts_with('7') || local.starts_with('1')) {
        Ok(format!("254{local}"))
    } else {
        Err(invalid_phone(raw))
    }
}

fn invalid_phone(raw: &str) -> BookingError {
    BookingError::ValidationError(format!("Invalid M-Pesa phone number: {raw}"))
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    #[default]
    Initiated,
    Success,
    Failed,
}

impl PaymentState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentState::Initiated)
    }
}

/// A push payment waiting for the customer to answer the prompt on their phone.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct PendingPayment {
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub phone: String,
    pub amount: Amount,
    pub booking: BookingRequest,
    pub state: PaymentState,
    pub result_code: Option<i64>,
    pub result_desc: Option<String>,
    pub mpesa_receipt: Option<String>,
    /// Amount the provider reported as paid, when the webhook carried one.
    #[serde(default)]
    pub paid_amount: Option<Decimal>,
    pub booking_id: Option<Uuid>,
    /// Set once the booking and commission for a successful payment exist.
    #[serde(default)]
    pub reconciled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingPayment {
    pub fn new(ack: &StkPushAck, phone: String, amount: Amount, booking: BookingRequest) -> Self {
        let now = Utc::now();
        Self {
            checkout_request_id: ack.checkout_request_id.clone(),
            merchant_request_id: ack.merchant_request_id.clone(),
            phone,
            amount,
            booking,
            state: PaymentState::Initiated,
            result_code: None,
            result_desc: None,
            mpesa_receipt: None,
            paid_amount: None,
            booking_id: None,
            reconciled: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// A successful payment whose booking has not been recorded yet.
    pub fn needs_reconciliation(&self) -> bool {
        self.state == PaymentState::Success && !self.reconciled
    }

    /// True when the provider reported less than the whole-shilling amount
    /// that was pushed.
    pub fn is_underpaid(&self) -> bool {
        self.paid_amount
            .is_some_and(|paid| paid < Decimal::from(self.amount.whole_shillings()))
    }

    /// Applies a provider verdict. Returns `false` when the payment had already
    /// settled and the verdict was ignored.
    pub fn apply(&mut self, verdict: &PaymentVerdict) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        match verdict {
            PaymentVerdict::Paid {
                receipt,
                result_desc,
            } => {
                self.state = PaymentState::Success;
                self.result_code = Some(RESULT_CODE_SUCCESS);
                self.result_desc = Some(result_desc.clone());
                self.mpesa_receipt = receipt.clone();
            }
            PaymentVerdict::Declined {
                result_code,
                result_desc,
            } => {
                self.state = PaymentState::Failed;
                self.result_code = Some(*result_code);
                self.result_desc = Some(result_desc.clone());
            }
        }
        self.updated_at = Utc::now();
        true
    }
}

/// The final answer for a payment, from either the webhook or a status query.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PaymentVerdict {
    Paid {
        receipt: Option<String>,
        result_desc: String,
    },
    Declined {
        result_code: i64,
        result_desc: String,
    },
}

impl PaymentVerdict {
    pub fn from_result(result_code: i64, result_desc: String, receipt: Option<String>) -> Self {
        if result_code == RESULT_CODE_SUCCESS {
            PaymentVerdict::Paid {
                receipt,
                result_desc,
            }
        } else {
            PaymentVerdict::Declined {
                result_code,
                result_desc,
            }
        }
    }
}

/// Provider acknowledgement of an STK push.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct StkPushAck {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub customer_message: String,
}

/// What we ask the provider to push to the customer's phone.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StkPushRequest {
    pub phone: String,
    pub amount: Amount,
    pub account_reference: String,
    pub description: String,
}

/// Outcome of an STK status query.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum StkQueryStatus {
    /// The customer has not answered the prompt yet.
    Processing,
    Settled(PaymentVerdict),
}

/// Webhook body: `{"Body": {"stkCallback": {...}}}`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: StkCallbackBody,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_desc: String,
    #[serde(default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

impl StkCallback {
    pub fn parse(raw: &Value) -> Result<Self, BookingError> {
        let envelope: StkCallbackEnvelope = serde_json::from_value(raw.clone())?;
        Ok(envelope.body.stk_callback)
    }

    fn metadata(&self, name: &str) -> Option<&Value> {
        self.callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)?
            .value
            .as_ref()
    }

    pub fn receipt(&self) -> Option<String> {
        self.metadata("MpesaReceiptNumber")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    pub fn paid_amount(&self) -> Option<Decimal> {
        match self.metadata("Amount")? {
            Value::Number(n) => n.to_string().parse().ok(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn verdict(&self) -> PaymentVerdict {
        PaymentVerdict::from_result(self.result_code, self.result_desc.clone(), self.receipt())
    }
}

/// A raw webhook delivery, kept verbatim for audit and replay.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CallbackLogEntry {
    pub id: Uuid,
    pub checkout_request_id: Option<String>,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl CallbackLogEntry {
    pub fn new(payload: Value) -> Self {
        let checkout_request_id = payload
            .pointer("/Body/stkCallback/CheckoutRequestID")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Self {
            id: Uuid::new_v4(),
            checkout_request_id,
            payload,
            received_at: Utc::now(),
        }
    }
}
