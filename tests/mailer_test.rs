mod common;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tripdesk::config::EmailConfig;
use tripdesk::domain::booking::{Booking, Item};
use tripdesk::domain::ports::Mailer;
use tripdesk::error::BookingError;
use tripdesk::infrastructure::email::HttpMailer;

type Inbox = Arc<Mutex<Vec<Value>>>;

async fn emails(State(inbox): State<Inbox>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer re_test") {
        return (StatusCode::UNAUTHORIZED, "missing key").into_response();
    }
    inbox.lock().await.push(body);
    Json(json!({"id": "email-1"})).into_response()
}

async fn start_fake() -> (Inbox, String) {
    let inbox = Inbox::default();
    let app = Router::new()
        .route("/emails", post(emails))
        .with_state(inbox.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (inbox, format!("http://{addr}"))
}

fn mailer(base_url: String, api_key: &str) -> HttpMailer {
    HttpMailer::new(EmailConfig {
        base_url,
        api_key: api_key.to_string(),
        from: "Tripdesk <bookings@tripdesk.example>".to_string(),
    })
    .unwrap()
}

fn confirmed() -> (Booking, Item) {
    let mut booking = Booking::from_request(common::booking_request("2026-12-24", 2));
    booking.confirm().unwrap();
    booking.mark_paid(Some("QLM4XY12ZT".to_string()));
    let item = Item {
        item: common::safari(),
        name: "Maasai Mara three-day safari".to_string(),
        capacity: 12,
    };
    (booking, item)
}

#[tokio::test]
async fn test_confirmation_email_request() {
    let (inbox, base) = start_fake().await;
    let (booking, item) = confirmed();

    mailer(base, "re_test")
        .send_booking_confirmation(&booking, &item)
        .await
        .unwrap();

    let sent = inbox.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["from"], "Tripdesk <bookings@tripdesk.example>");
    assert_eq!(sent[0]["to"], json!(["achieng@example.com"]));
    assert_eq!(
        sent[0]["subject"],
        "Booking confirmed: Maasai Mara three-day safari"
    );
    let html = sent[0]["html"].as_str().unwrap();
    assert!(html.contains("Achieng Otieno"));
    assert!(html.contains("QLM4XY12ZT"));
    assert!(html.contains("Thursday, 24 December 2026"));
}

#[tokio::test]
async fn test_rejected_key_is_provider_error() {
    let (inbox, base) = start_fake().await;
    let (booking, item) = confirmed();

    let err = mailer(base, "wrong")
        .send_booking_confirmation(&booking, &item)
        .await
        .unwrap_err();
    match err {
        BookingError::ProviderError(msg) => assert!(msg.contains("401")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(inbox.lock().await.is_empty());
}
