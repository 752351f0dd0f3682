use super::AppState;
use super::error::ApiError;
use crate::application::payment::{PaymentReconciler, PaymentRequest};
use crate::domain::booking::{ItemKind, ItemRef};
use crate::domain::payment::{CallbackLogEntry, PendingPayment};
use crate::domain::presence::Heartbeat;
use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const DEFAULT_AVAILABILITY_DAYS: u32 = 30;

type ApiResult = Result<Json<Value>, ApiError>;

fn payments(state: &AppState) -> Result<&Arc<PaymentReconciler>, ApiError> {
    state.payments.as_ref().ok_or(ApiError::PaymentsDisabled)
}

fn item_ref(kind: &str, id: String) -> Result<ItemRef, ApiError> {
    let kind: ItemKind = kind.parse()?;
    Ok(ItemRef::new(kind, id))
}

fn payment_status(payment: &PendingPayment) -> Value {
    json!({
        "success": true,
        "checkout_request_id": payment.checkout_request_id,
        "status": payment.state,
        "result_code": payment.result_code,
        "result_desc": payment.result_desc,
        "mpesa_receipt": payment.mpesa_receipt,
        "booking_id": payment.booking_id,
    })
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub async fn stk_push(
    State(state): State<AppState>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let initiated = payments(&state)?.initiate(request).await?;
    Ok(Json(json!({
        "success": true,
        "checkout_request_id": initiated.payment.checkout_request_id,
        "merchant_request_id": initiated.payment.merchant_request_id,
        "customer_message": initiated.customer_message,
    })))
}

#[derive(Deserialize)]
pub struct QueryRequest {
    #[serde(alias = "checkoutRequestId", alias = "CheckoutRequestID")]
    pub checkout_request_id: String,
}

pub async fn stk_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let payment = payments(&state)?.poll(&request.checkout_request_id).await?;
    Ok(Json(payment_status(&payment)))
}

/// The provider retries anything that is not acknowledged, so this always
/// answers with the acceptance body once the payload has been recorded.
pub async fn mpesa_callback(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let payload = serde_json::from_slice(&body).unwrap_or_else(|e| {
        warn!(error = %e, "callback body is not JSON, logging it as text");
        Value::String(String::from_utf8_lossy(&body).into_owned())
    });
    info!(payload = %payload, "M-Pesa callback received");

    match payments(&state) {
        Ok(reconciler) => {
            if let Err(e) = reconciler.handle_callback(payload).await {
                error!(error = %e, "failed to reconcile M-Pesa callback");
            }
        }
        Err(_) => {
            warn!("callback received while payments are disabled");
            if let Err(e) = state.callback_log.append(CallbackLogEntry::new(payload)).await {
                error!(error = %e, "failed to log M-Pesa callback");
            }
        }
    }
    Json(json!({"ResultCode": 0, "ResultDesc": "Accepted"}))
}

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub from: Option<NaiveDate>,
    pub days: Option<u32>,
}

pub async fn availability(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    query: Result<Query<AvailabilityQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let item = item_ref(&kind, id)?;
    let from = query.from.unwrap_or_else(|| Utc::now().date_naive());
    let days = query.days.unwrap_or(DEFAULT_AVAILABILITY_DAYS);
    let availability = state.bookings.availability(&item, from, days).await?;
    Ok(Json(json!({
        "success": true,
        "item": item,
        "availability": availability,
    })))
}

#[derive(Deserialize)]
pub struct TrackReferral {
    pub referrer_id: String,
    #[serde(default)]
    pub referred_user_id: Option<String>,
    #[serde(default)]
    pub item: Option<ItemRef>,
}

pub async fn track_referral(
    State(state): State<AppState>,
    payload: Result<Json<TrackReferral>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let tracking = state
        .referrals
        .track_click(&request.referrer_id, request.referred_user_id, request.item)
        .await?;
    Ok(Json(json!({"success": true, "tracking_id": tracking.id})))
}

#[derive(Deserialize)]
pub struct PresencePing {
    pub item: ItemRef,
    pub viewer_id: String,
    #[serde(default)]
    pub seen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub leaving: bool,
}

pub async fn presence(
    State(state): State<AppState>,
    payload: Result<Json<PresencePing>, JsonRejection>,
) -> ApiResult {
    let Json(ping) = payload?;
    if ping.viewer_id.trim().is_empty() {
        return Err(ApiError::BadRequest("viewer_id is required".to_string()));
    }
    let viewers = state
        .presence
        .heartbeat(Heartbeat {
            item: ping.item,
            viewer_id: ping.viewer_id,
            seen_at: ping.seen_at.unwrap_or_else(Utc::now),
            leaving: ping.leaving,
        })
        .await;
    Ok(Json(json!({"success": true, "viewers": viewers})))
}

pub async fn viewers(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult {
    let item = item_ref(&kind, id)?;
    let viewers = state.presence.viewers(&item).await;
    Ok(Json(json!({"success": true, "item": item, "viewers": viewers})))
}

pub async fn booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let booking = state.bookings.booking(id).await?;
    Ok(Json(json!({"success": true, "booking": booking})))
}
