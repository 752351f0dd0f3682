//! M-Pesa Daraja client for Lipa Na M-Pesa Online (STK push).

use crate::config::MpesaConfig;
use crate::domain::payment::{
    ERROR_CODE_STILL_PROCESSING, PaymentVerdict, StkPushAck, StkPushRequest, StkQueryStatus,
};
use crate::domain::ports::PaymentGateway;
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";
/// Daraja rejects account references longer than this.
const MAX_ACCOUNT_REFERENCE_LEN: usize = 12;
const MAX_DESCRIPTION_LEN: usize = 13;
/// Refresh the token a little before Daraja expires it.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const EAT_OFFSET_SECS: i64 = 3 * 3600;

/// `YYYYMMDDHHmmss` in East Africa Time, as Daraja expects.
pub fn daraja_timestamp(now: DateTime<Utc>) -> String {
    (now.naive_utc() + TimeDelta::seconds(EAT_OFFSET_SECS))
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// `base64(shortcode + passkey + timestamp)`.
pub fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{shortcode}{passkey}{timestamp}"))
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct DarajaClient {
    http: reqwest::Client,
    config: MpesaConfig,
    token: Mutex<Option<CachedToken>>,
}

impl DarajaClient {
    pub fn new(config: MpesaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now()
        {
            return Ok(token.value.clone());
        }

        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url
        );
        let response = self
            .http
            .get(url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await?;
        let body: TokenResponse = ensure_success(response).await?.json().await?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        debug!(expires_in = body.expires_in, "fetched Daraja access token");
        *cached = Some(CachedToken {
            value: body.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(body.access_token)
    }

    fn credentials(&self) -> (String, String) {
        let timestamp = daraja_timestamp(Utc::now());
        let password = stk_password(&self.config.shortcode, &self.config.passkey, &timestamp);
        (password, timestamp)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}{path}", self.config.base_url))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl PaymentGateway for DarajaClient {
    #[instrument(skip_all, fields(phone = %request.phone, amount = %request.amount))]
    async fn stk_push(&self, request: &StkPushRequest) -> Result<StkPushAck> {
        let (password, timestamp) = self.credentials();
        let body = StkPushBody {
            business_short_code: &self.config.shortcode,
            password: &password,
            timestamp: &timestamp,
            transaction_type: TRANSACTION_TYPE,
            amount: request.amount.whole_shillings(),
            party_a: &request.phone,
            party_b: &self.config.shortcode,
            phone_number: &request.phone,
            call_back_url: &self.config.callback_url,
            account_reference: truncate(&request.account_reference, MAX_ACCOUNT_REFERENCE_LEN),
            transaction_desc: truncate(&request.description, MAX_DESCRIPTION_LEN),
        };

        let response = self.post("/mpesa/stkpush/v1/processrequest", &body).await?;
        let ack: StkPushResponse = ensure_success(response).await?.json().await?;
        if ack.response_code != "0" {
            warn!(code = %ack.response_code, "STK push not accepted");
            return Err(BookingError::ProviderError(format!(
                "STK push rejected ({}): {}",
                ack.response_code, ack.response_description
            )));
        }
        info!(checkout_request_id = %ack.checkout_request_id, "STK push accepted");
        Ok(StkPushAck {
            merchant_request_id: ack.merchant_request_id,
            checkout_request_id: ack.checkout_request_id,
            customer_message: ack.customer_message,
        })
    }

    #[instrument(skip(self))]
    async fn stk_query(&self, checkout_request_id: &str) -> Result<StkQueryStatus> {
        let (password, timestamp) = self.credentials();
        let body = StkQueryBody {
            business_short_code: &self.config.shortcode,
            password: &password,
            timestamp: &timestamp,
            checkout_request_id,
        };

        let response = self.post("/mpesa/stkpushquery/v1/query", &body).await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(rate_limited(&response));
        }
        let text = response.text().await?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<DarajaError>(&text)
                && error.error_code == ERROR_CODE_STILL_PROCESSING
            {
                debug!("customer has not answered the prompt yet");
                return Ok(StkQueryStatus::Processing);
            }
            return Err(provider_error(status, &text));
        }

        let result: StkQueryResponse = serde_json::from_str(&text)?;
        Ok(StkQueryStatus::Settled(PaymentVerdict::from_result(
            result.result_code,
            result.result_desc,
            None,
        )))
    }
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn rate_limited(response: &Response) -> BookingError {
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok());
    warn!(?retry_after, "Daraja rate limited the request");
    BookingError::RateLimited { retry_after }
}

fn provider_error(status: StatusCode, body: &str) -> BookingError {
    let message = serde_json::from_str::<DarajaError>(body)
        .map(|e| format!("{} ({})", e.error_message, e.error_code))
        .unwrap_or_else(|_| body.chars().take(200).collect());
    BookingError::ProviderError(format!("HTTP {status}: {message}"))
}

/// Maps 429 to `RateLimited` and other non-2xx statuses to `ProviderError`.
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(rate_limited(&response));
    }
    let text = response.text().await.unwrap_or_default();
    Err(provider_error(status, &text))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(deserialize_with = "number_from_any")]
    expires_in: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushBody<'a> {
    business_short_code: &'a str,
    password: &'a str,
    timestamp: &'a str,
    transaction_type: &'a str,
    amount: u64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    call_back_url: &'a str,
    account_reference: String,
    transaction_desc: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    response_code: String,
    #[serde(default)]
    response_description: String,
    #[serde(default)]
    customer_message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkQueryBody<'a> {
    business_short_code: &'a str,
    password: &'a str,
    timestamp: &'a str,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkQueryResponse {
    #[serde(deserialize_with = "number_from_any")]
    result_code: i64,
    #[serde(default)]
    result_desc: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DarajaError {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    error_message: String,
}

/// Daraja sends some numeric fields as strings ("3599", "1032").
fn number_from_any<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s.trim().parse().map_err(D::Error::custom),
        serde_json::Value::Number(n) => n.to_string().parse().map_err(D::Error::custom),
        other => Err(D::Error::custom(format!("expected number, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_is_east_africa_time() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 22, 15, 9).unwrap();
        assert_eq!(daraja_timestamp(now), "20260302011509");
    }

    #[test]
    fn test_password_matches_daraja_sandbox_example() {
        let password = stk_password(
            "174379",
            "bfb279f9aa9bdbcf158e97dd71a467cd2e0c893059b10f78e6b72ada1ed2c919",
            "20160216165627",
        );
        assert_eq!(
            password,
            "MTc0Mzc5YmZiMjc5ZjlhYTliZGJjZjE1OGU5N2RkNzFhNDY3Y2QyZTBjODkzMDU5YjEwZjc4ZTZiNzJhZGExZWQyYzkxOTIwMTYwMjE2MTY1NjI3"
        );
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("SAFARI-BOOKING-2026", 12), "SAFARI-BOOKI");
        assert_eq!(truncate("short", 12), "short");
    }

    #[test]
    fn test_numeric_fields_accept_strings() {
        let query: StkQueryResponse =
            serde_json::from_str(r#"{"ResultCode":"1032","ResultDesc":"Request cancelled by user"}"#)
                .unwrap();
        assert_eq!(query.result_code, 1032);

        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":"3599"}"#).unwrap();
        assert_eq!(token.expires_in, 3599);
    }
}
