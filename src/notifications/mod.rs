//! Downstream "booking paid" notification.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

pub const BOOKING_PAID_EVENT: &str = "booking.paid";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Transport(String),
    #[error("notification endpoint returned status {0}")]
    Rejected(u16),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingNotification {
    pub event: String,
    pub booking_id: String,
    pub offering: OfferingSummary,
    pub parent: ParentSummary,
    pub student: StudentSummary,
    pub payment: PaymentSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferingSummary {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub year_group: String,
    pub date: String,
    pub time: String,
    pub session_link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParentSummary {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentSummary {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub reference: String,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub amount_paid: Option<Decimal>,
    pub currency: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &BookingNotification) -> Result<(), NotifyError>;
}

/// Posts notifications to a single configured URL. Without a URL every
/// dispatch succeeds without sending anything.
#[derive(Clone)]
pub struct HttpNotifier {
    client: Client,
    url: Option<String>,
}

impl HttpNotifier {
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.filter(|u| !u.trim().is_empty()),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    #[instrument(skip(self, notification), fields(booking_id = %notification.booking_id))]
    async fn notify(&self, notification: &BookingNotification) -> Result<(), NotifyError> {
        let Some(url) = self.url.as_deref() else {
            debug!("no notification endpoint configured; skipping dispatch");
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .json(notification)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "notification request failed");
                NotifyError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, "notification endpoint rejected payload");
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        info!("booking notification delivered");
        Ok(())
    }
}
