//! Payment processor boundary: hosted checkout session creation and signed
//! webhook event decoding.

pub mod stripe;
pub mod webhook;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use stripe::{StripeGateway, StripeSettings};

#[derive(Debug, Error)]
pub enum PaymentError {
    /// Declined or otherwise user-actionable card problem.
    #[error("{0}")]
    Card(String),

    #[error("payment processor returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("payment processor request failed: {0}")]
    Transport(String),

    #[error("payment processor response could not be decoded: {0}")]
    Decode(String),

    #[error("invalid checkout request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PaymentError::Decode(err.to_string())
        } else {
            PaymentError::Transport(err.to_string())
        }
    }
}

/// What the customer is charged for.
#[derive(Debug, Clone, PartialEq)]
pub enum LineItem {
    /// A price object already configured at the processor.
    Price { price_id: String },
    /// Ad-hoc amount in major units, e.g. `45.50`.
    Inline {
        amount: Decimal,
        currency: String,
        description: String,
    },
}

/// Currencies Stripe charges in whole units.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "bif", "clp", "djf", "gnf", "jpy", "kmf", "krw", "mga", "pyg", "rwf", "ugx", "vnd", "vuv",
    "xaf", "xof", "xpf",
];
const THREE_DECIMAL_CURRENCIES: &[&str] = &["bhd", "jod", "kwd", "omr", "tnd"];

/// Decimal places of the currency's minor unit; 2 for anything not listed.
pub fn minor_unit_exponent(currency: &str) -> u32 {
    let currency = currency.trim().to_ascii_lowercase();
    if ZERO_DECIMAL_CURRENCIES.contains(&currency.as_str()) {
        0
    } else if THREE_DECIMAL_CURRENCIES.contains(&currency.as_str()) {
        3
    } else {
        2
    }
}

/// Major-unit amount in the currency's minor units, rounded half-away-from-zero.
pub fn to_minor_units(amount: Decimal, currency: &str) -> Option<i64> {
    let scale = Decimal::from(10_i64.pow(minor_unit_exponent(currency)));
    amount
        .checked_mul(scale)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Processor amount (minor units) back in major units.
pub fn from_minor_units(minor: i64, currency: &str) -> Decimal {
    Decimal::new(minor, minor_unit_exponent(currency))
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSessionRequest {
    pub booking_id: String,
    pub customer_email: String,
    pub line_item: LineItem,
    pub return_url: String,
    /// Reconciliation context copied verbatim into the session metadata.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError>;
}
