use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::to_properties;
use crate::crm::{CrmError, CrmRecord, Properties};

/// CRM field names on booking records.
pub mod fields {
    pub const BOOKING_ID: &str = "bookingId";
    pub const STUDENT_CONTACT_ID: &str = "studentContactId";
    pub const OFFERING_ID: &str = "offeringId";
}

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RANDOM_SUFFIX_LEN: usize = 5;

/// Human-facing booking reference, `BK-<base36 millis>-<base36 random>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(String);

impl BookingId {
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let mut rng = rand::thread_rng();
        let suffix: String = (0..RANDOM_SUFFIX_LEN)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();
        Self(format!("BK-{}-{}", to_base36(millis), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for `BK-` followed by two non-empty uppercase base36 segments.
    pub fn is_well_formed(value: &str) -> bool {
        let mut parts = value.split('-');
        let segment_ok = |s: Option<&str>| {
            s.map(|s| {
                !s.is_empty()
                    && s.bytes()
                        .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
            })
            .unwrap_or(false)
        };
        parts.next() == Some("BK")
            && segment_ok(parts.next())
            && segment_ok(parts.next())
            && parts.next().is_none()
    }
}

impl From<String> for BookingId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Expired,
    Failed,
}

impl PaymentStatus {
    /// Returns the new status when `self -> next` is a defined transition.
    ///
    /// `paid` is final. A confirmed payment moves any unpaid booking to `paid`,
    /// including one whose earlier checkout session expired; expiry only applies
    /// to `pending`.
    pub fn transition(self, next: PaymentStatus) -> Option<PaymentStatus> {
        match (self, next) {
            (Self::Pending | Self::Expired | Self::Failed, Self::Paid)
            | (Self::Pending, Self::Expired) => Some(next),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Expired => "expired",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(skip)]
    pub record_id: String,
    pub booking_id: BookingId,
    pub parent_contact_id: String,
    pub student_contact_id: String,
    pub offering_id: String,
    pub payment_status: PaymentStatus,
    pub price_paid: Decimal,
    #[serde(default)]
    pub webhook_processed: bool,
    #[serde(default)]
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl Booking {
    pub fn from_record(record: CrmRecord) -> Result<Self, CrmError> {
        let mut booking: Booking =
            serde_json::from_value(serde_json::Value::Object(record.properties))
                .map_err(|e| CrmError::Decode(format!("booking {}: {}", record.id, e)))?;
        booking.record_id = record.id;
        Ok(booking)
    }

    /// Paid with the downstream notification already delivered.
    pub fn is_fully_reconciled(&self) -> bool {
        self.payment_status == PaymentStatus::Paid && self.webhook_processed
    }
}

/// Fields written when a booking is first created. Status always starts `pending`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub booking_id: BookingId,
    pub parent_contact_id: String,
    pub student_contact_id: String,
    pub offering_id: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub price_paid: Decimal,
}

impl NewBooking {
    pub fn into_properties(self) -> Result<Properties, CrmError> {
        let mut properties = to_properties(&self)?;
        properties.insert(
            "paymentStatus".into(),
            PaymentStatus::Pending.as_str().into(),
        );
        properties.insert("webhookProcessed".into(), false.into());
        Ok(properties)
    }
}

/// Partial update; only `Some` fields are sent to the CRM.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_processed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl BookingUpdate {
    pub fn status(status: PaymentStatus) -> Self {
        Self {
            payment_status: Some(status),
            ..Default::default()
        }
    }

    pub fn processed() -> Self {
        Self {
            webhook_processed: Some(true),
            ..Default::default()
        }
    }

    pub fn with_payment_reference(mut self, reference: Option<String>) -> Self {
        self.payment_reference = reference.filter(|r| !r.is_empty());
        self
    }

    pub fn with_currency(mut self, currency: Option<String>) -> Self {
        self.currency = currency.filter(|c| !c.is_empty());
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn into_properties(self) -> Result<Properties, CrmError> {
        to_properties(&self)
    }
}
