//! Runtime configuration read from environment variables.
//!
//! Values are looked up through a closure so tests can supply a map instead
//! of mutating the process environment.

use crate::domain::booking::ItemKind;
use crate::domain::money::Rate;
use crate::domain::presence::DEFAULT_PRESENCE_TTL_SECS;
use crate::domain::referral::{CommissionRates, DEFAULT_ATTRIBUTION_WINDOW_DAYS};
use crate::error::{BookingError, Result};
use std::fmt::Display;
use std::str::FromStr;
use tracing::{info, warn};

pub const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
pub const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";
pub const DEFAULT_EMAIL_BASE_URL: &str = "https://api.resend.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl FromStr for MpesaEnvironment {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(MpesaEnvironment::Sandbox),
            "production" | "live" => Ok(MpesaEnvironment::Production),
            other => Err(BookingError::ConfigError(format!(
                "Unknown M-Pesa environment: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpesaConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    pub base_url: String,
    pub api_key: String,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: String,
    /// `None` when the M-Pesa credentials are not set; payment routes then
    /// refuse to start.
    pub mpesa: Option<MpesaConfig>,
    /// `None` means confirmation emails are only logged.
    pub email: Option<EmailConfig>,
    pub commission_rates: CommissionRates,
    pub attribution_window_days: i64,
    pub presence_ttl_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = try_load(&lookup, "TRIPDESK_BIND", "0.0.0.0:8080")?;

        let mpesa = load_mpesa(&lookup)?;
        let email = load_email(&lookup);

        let mut commission_rates = CommissionRates::new(try_load(
            &lookup,
            "COMMISSION_RATE_DEFAULT",
            "5",
        )?);
        let defaults = CommissionRates::default();
        for kind in ItemKind::ALL {
            let key = format!("COMMISSION_RATE_{}", kind.as_str().to_ascii_uppercase());
            let rate = match lookup(&key) {
                Some(raw) => parse_rate(&key, &raw)?,
                None => defaults.rate_for(kind),
            };
            commission_rates.set_rate(kind, rate);
        }

        Ok(Self {
            bind,
            mpesa,
            email,
            commission_rates,
            attribution_window_days: try_load(
                &lookup,
                "REFERRAL_ATTRIBUTION_DAYS",
                &DEFAULT_ATTRIBUTION_WINDOW_DAYS.to_string(),
            )?,
            presence_ttl_secs: try_load(
                &lookup,
                "PRESENCE_TTL_SECS",
                &DEFAULT_PRESENCE_TTL_SECS.to_string(),
            )?,
        })
    }
}

fn load_mpesa<F>(lookup: &F) -> Result<Option<MpesaConfig>>
where
    F: Fn(&str) -> Option<String>,
{
    let required = [
        "MPESA_CONSUMER_KEY",
        "MPESA_CONSUMER_SECRET",
        "MPESA_SHORTCODE",
        "MPESA_PASSKEY",
        "MPESA_CALLBACK_URL",
    ];
    let values: Vec<Option<String>> = required.iter().map(|key| lookup(key)).collect();
    if values.iter().all(Option::is_none) {
        warn!("M-Pesa credentials not set, payment routes are disabled");
        return Ok(None);
    }
    let missing: Vec<&str> = required
        .iter()
        .zip(&values)
        .filter(|(_, v)| v.is_none())
        .map(|(k, _)| *k)
        .collect();
    if !missing.is_empty() {
        return Err(BookingError::ConfigError(format!(
            "Incomplete M-Pesa configuration, missing: {}",
            missing.join(", ")
        )));
    }
    let mut values = values.into_iter().flatten();
    let mut next = || values.next().unwrap_or_default();
    let (consumer_key, consumer_secret, shortcode, passkey, callback_url) =
        (next(), next(), next(), next(), next());

    let environment: MpesaEnvironment = try_load(lookup, "MPESA_ENVIRONMENT", "sandbox")?;
    let base_url = lookup("MPESA_BASE_URL").unwrap_or_else(|| {
        match environment {
            MpesaEnvironment::Sandbox => SANDBOX_BASE_URL,
            MpesaEnvironment::Production => PRODUCTION_BASE_URL,
        }
        .to_string()
    });

    Ok(Some(MpesaConfig {
        base_url: base_url.trim_end_matches('/').to_string(),
        consumer_key,
        consumer_secret,
        shortcode,
        passkey,
        callback_url,
    }))
}

fn load_email<F>(lookup: &F) -> Option<EmailConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(api_key) = lookup("EMAIL_API_KEY") else {
        info!("EMAIL_API_KEY not set, confirmation emails will only be logged");
        return None;
    };
    Some(EmailConfig {
        base_url: lookup("EMAIL_BASE_URL")
            .unwrap_or_else(|| DEFAULT_EMAIL_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string(),
        api_key,
        from: lookup("EMAIL_FROM").unwrap_or_else(|| "bookings@tripdesk.co.ke".to_string()),
    })
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.trim()
        .parse()
        .map_err(|e| BookingError::ConfigError(format!("Invalid {key} value {raw:?}: {e}")))
}

/// Whether log lines should be JSON. Read on its own, ahead of [`Config`],
/// so the subscriber exists before config defaults are logged.
pub fn log_json<F>(lookup: F) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup("TRIPDESK_LOG_JSON") {
        Some(raw) => parse_flag("TRIPDESK_LOG_JSON", &raw),
        None => Ok(false),
    }
}

pub fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(BookingError::ConfigError(format!(
            "Invalid {key} value {raw:?}: expected a boolean"
        ))),
    }
}

fn parse_rate(key: &str, raw: &str) -> Result<Rate> {
    raw.parse()
        .map_err(|e| BookingError::ConfigError(format!("Invalid {key} value {raw:?}: {e}")))
}
