//! Stripe webhook signature verification and event decoding.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const CHECKOUT_ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";
pub const CHECKOUT_EXPIRED: &str = "checkout.session.expired";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,
    #[error("signature header malformed")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Stale,
    #[error("no signature matches the payload")]
    Mismatch,
}

/// Verifies a `t=<unix>,v1=<hex>[,v1=<hex>...]` header against the raw body.
pub fn verify_signature(
    header: Option<&str>,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), SignatureError> {
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(SignatureError::Missing)?;

    let mut timestamp: Option<&str> = None;
    let mut candidates: Vec<&str> = Vec::new();
    for part in header.split(',') {
        if let Some((key, value)) = part.trim().split_once('=') {
            match key {
                "t" => timestamp = Some(value),
                "v1" => candidates.push(value),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    let ts: i64 = timestamp.parse().map_err(|_| SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - ts).unsigned_abs() > tolerance_secs {
        return Err(SignatureError::Stale);
    }

    let expected = compute_signature(timestamp, payload, secret);
    if candidates.iter().any(|sig| constant_time_eq(&expected, sig)) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Produces a valid signature header for `payload` at `timestamp`.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let ts = timestamp.to_string();
    format!("t={},v1={}", ts, compute_signature(&ts, payload, secret))
}

fn compute_signature(timestamp: &str, payload: &[u8], secret: &str) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.is_empty() || a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// The subset of a Stripe checkout session the reconciler reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSessionObject {
    /// Whether the customer has actually been charged (or owes nothing).
    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid") | Some("no_payment_required")
        )
    }

    /// Payment intent id when present, else the session id.
    pub fn payment_reference(&self) -> String {
        self.payment_intent
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.id.clone())
    }
}

/// A webhook event reduced to what reconciliation acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    Completed(CheckoutSessionObject),
    /// Completed checkout whose payment is still settling; a later
    /// async-payment event carries the outcome.
    AwaitingPayment(CheckoutSessionObject),
    Expired(CheckoutSessionObject),
    Unhandled,
}

impl StripeEvent {
    pub fn classify(&self) -> Result<PaymentEvent, serde_json::Error> {
        let session = || serde_json::from_value::<CheckoutSessionObject>(self.data.object.clone());
        Ok(match self.event_type.as_str() {
            CHECKOUT_COMPLETED => {
                let session = session()?;
                if session.is_paid() {
                    PaymentEvent::Completed(session)
                } else {
                    PaymentEvent::AwaitingPayment(session)
                }
            }
            CHECKOUT_ASYNC_PAYMENT_SUCCEEDED => PaymentEvent::Completed(session()?),
            CHECKOUT_EXPIRED => PaymentEvent::Expired(session()?),
            _ => PaymentEvent::Unhandled,
        })
    }
}
