use crate::config::EmailConfig;
use crate::domain::booking::{Booking, Item};
use crate::domain::ports::Mailer;
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument};

/// Sends confirmation emails through a Resend-style HTTP API.
pub struct HttpMailer {
    http: reqwest::Client,
    config: EmailConfig,
}

impl HttpMailer {
    pub fn new(config: EmailConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, config })
    }
}

#[derive(Serialize)]
struct EmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: String,
    html: String,
}

pub fn confirmation_subject(item: &Item) -> String {
    format!("Booking confirmed: {}", item.name)
}

/// Escapes text for use inside HTML element content and attributes.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn confirmation_html(booking: &Booking, item: &Item) -> String {
    let receipt = escape_html(booking.mpesa_receipt.as_deref().unwrap_or("-"));
    format!(
        "<h1>Booking confirmed</h1>\
         <p>Hi {name},</p>\
         <p>Your booking for <strong>{item}</strong> on {date} is confirmed.</p>\
         <ul>\
         <li>Reference: {id}</li>\
         <li>Slots: {slots}</li>\
         <li>Total paid: {total}</li>\
         <li>M-Pesa receipt: {receipt}</li>\
         </ul>",
        name = escape_html(&booking.guest.name),
        item = escape_html(&item.name),
        date = booking.visit_date.format("%A, %d %B %Y"),
        id = booking.id,
        slots = booking.slots_booked,
        total = booking.total_amount,
    )
}

#[async_trait]
impl Mailer for HttpMailer {
    #[instrument(skip_all, fields(booking_id = %booking.id))]
    async fn send_booking_confirmation(&self, booking: &Booking, item: &Item) -> Result<()> {
        let body = EmailBody {
            from: &self.config.from,
            to: [&booking.guest.email],
            subject: confirmation_subject(item),
            html: confirmation_html(booking, item),
        };
        let response = self
            .http
            .post(format!("{}/emails", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BookingError::ProviderError(format!(
                "email API returned {status}: {text}"
            )));
        }
        info!("confirmation email sent");
        Ok(())
    }
}

/// Writes confirmations to the log instead of sending them.
#[derive(Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_booking_confirmation(&self, booking: &Booking, item: &Item) -> Result<()> {
        info!(
            booking_id = %booking.id,
            to = %booking.guest.email,
            subject = %confirmation_subject(item),
            "email delivery disabled, confirmation not sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::fixtures::booking;
    use crate::domain::booking::{BookingStatus, ItemKind, ItemRef};

    #[test]
    fn test_confirmation_html_mentions_booking() {
        let item_ref = ItemRef::new(ItemKind::Attraction, "giraffe-centre");
        let mut booking = booking(&item_ref, "2026-11-07", 3, BookingStatus::Confirmed);
        booking.mark_paid(Some("QKT12ABCDE".to_string()));
        let item = Item {
            item: item_ref,
            name: "Giraffe Centre".to_string(),
            capacity: 50,
        };

        let html = confirmation_html(&booking, &item);
        assert!(html.contains("Wanjiku Kamau"));
        assert!(html.contains("Giraffe Centre"));
        assert!(html.contains("Saturday, 07 November 2026"));
        assert!(html.contains("QKT12ABCDE"));
        assert_eq!(confirmation_subject(&item), "Booking confirmed: Giraffe Centre");
    }

    #[test]
    fn test_confirmation_html_escapes_guest_input() {
        let item_ref = ItemRef::new(ItemKind::Hotel, "serena");
        let mut booking = booking(&item_ref, "2026-11-07", 1, BookingStatus::Confirmed);
        booking.guest.name = "<script>alert('x')</script> & co".to_string();
        let item = Item {
            item: item_ref,
            name: "Serena \"Mountain\" Lodge".to_string(),
            capacity: 20,
        };

        let html = confirmation_html(&booking, &item);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; co"));
        assert!(html.contains("Serena &quot;Mountain&quot; Lodge"));
    }

    #[tokio::test]
    async fn test_log_mailer_never_fails() {
        let item_ref = ItemRef::new(ItemKind::Trip, "naivasha-day");
        let booking = booking(&item_ref, "2026-11-07", 1, BookingStatus::Confirmed);
        let item = Item {
            item: item_ref,
            name: "Naivasha day trip".to_string(),
            capacity: 10,
        };
        assert!(LogMailer.send_booking_confirmation(&booking, &item).await.is_ok());
    }
}
