//! Payment webhook reconciliation.
//!
//! Completion is applied in three individually idempotent steps: mark the
//! booking paid, notify downstream, then set the processed flag. A failed
//! notification fails the request so the processor redelivers the event; the
//! redelivery skips the first step and retries the other two.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use super::booking_store::{BookingStore, Transition};
use super::checkout::CheckoutMetadata;
use crate::crm::CrmClient;
use crate::errors::ServiceError;
use crate::models::booking::{BookingUpdate, PaymentStatus};
use crate::notifications::{
    BookingNotification, Notifier, OfferingSummary, ParentSummary, PaymentSummary,
    StudentSummary, BOOKING_PAID_EVENT,
};
use crate::payments::from_minor_units;
use crate::payments::webhook::{
    verify_signature, CheckoutSessionObject, PaymentEvent, StripeEvent,
};

/// What a webhook delivery ended up doing. Every variant is acknowledged with
/// a success response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Booking is paid and the downstream notification went out.
    Reconciled,
    /// Booking was already paid and notified.
    AlreadyReconciled,
    /// Booking moved from pending to expired.
    Expired,
    /// Expiry arrived for a booking that is no longer pending.
    ExpiryIgnored,
    /// Checkout finished but the payment is still settling.
    AwaitingPayment,
    MissingBookingId,
    BookingNotFound,
    /// Event type this service does not act on.
    Ignored,
}

pub struct ReconciliationService {
    bookings: BookingStore,
    notifier: Arc<dyn Notifier>,
    webhook_secret: String,
    tolerance_secs: u64,
}

impl ReconciliationService {
    pub fn new(
        crm: Arc<dyn CrmClient>,
        notifier: Arc<dyn Notifier>,
        webhook_secret: String,
        tolerance_secs: u64,
    ) -> Self {
        Self {
            bookings: BookingStore::new(crm),
            notifier,
            webhook_secret,
            tolerance_secs,
        }
    }

    /// Verifies the signature against the raw body, then reconciles the event.
    pub async fn handle_webhook(
        &self,
        signature: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookOutcome, ServiceError> {
        let now = chrono::Utc::now().timestamp();
        verify_signature(
            signature,
            payload,
            &self.webhook_secret,
            self.tolerance_secs,
            now,
        )
        .map_err(|e| {
            warn!(error = %e, "webhook signature rejected");
            ServiceError::from(e)
        })?;

        let event: StripeEvent = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::ValidationError(format!("invalid event payload: {}", e)))?;
        self.process_event(&event).await
    }

    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn process_event(&self, event: &StripeEvent) -> Result<WebhookOutcome, ServiceError> {
        let classified = event.classify().map_err(|e| {
            ServiceError::ValidationError(format!("invalid checkout session object: {}", e))
        })?;

        match classified {
            PaymentEvent::Completed(session) => self.complete(&session).await,
            PaymentEvent::Expired(session) => self.expire(&session).await,
            PaymentEvent::AwaitingPayment(session) => {
                info!(session_id = %session.id, "checkout completed with payment still pending");
                Ok(WebhookOutcome::AwaitingPayment)
            }
            PaymentEvent::Unhandled => {
                warn!("ignoring unhandled webhook event type");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn complete(&self, session: &CheckoutSessionObject) -> Result<WebhookOutcome, ServiceError> {
        let metadata = match CheckoutMetadata::from_event_metadata(&session.metadata) {
            Ok(metadata) => metadata,
            Err(_) => {
                warn!(session_id = %session.id, "completion event carries no bookingId");
                return Ok(WebhookOutcome::MissingBookingId);
            }
        };
        let booking_id = metadata.booking_id.as_str();

        let Some(booking) = self
            .bookings
            .find_by_booking_id(booking_id)
            .await
            .map_err(|e| processing_failed("booking lookup", e))?
        else {
            warn!(booking_id, "completion event for unknown booking");
            return Ok(WebhookOutcome::BookingNotFound);
        };

        if booking.is_fully_reconciled() {
            info!(booking_id, "completion already reconciled");
            return Ok(WebhookOutcome::AlreadyReconciled);
        }

        let reference = session.payment_reference();
        if booking.payment_status != PaymentStatus::Paid {
            let extra = BookingUpdate::default()
                .with_payment_reference(Some(reference.clone()))
                .with_currency(session.currency.clone());
            match self
                .bookings
                .transition(&booking, PaymentStatus::Paid, extra)
                .await
                .map_err(|e| processing_failed("payment status update", e))?
            {
                Transition::Applied(_) => {
                    info!(booking_id, from = %booking.payment_status, "booking marked paid")
                }
                Transition::Skipped { current } => {
                    info!(booking_id, status = %current, "payment status already settled")
                }
            }
        }

        let notification = build_notification(&metadata, session, reference);
        self.notifier.notify(&notification).await.map_err(|e| {
            error!(booking_id, error = %e, "downstream notification failed; awaiting redelivery");
            ServiceError::WebhookProcessingFailed(e.to_string())
        })?;

        self.bookings
            .update(&booking, BookingUpdate::processed())
            .await
            .map_err(|e| processing_failed("processed flag update", e))?;
        info!(booking_id, "booking reconciled");
        Ok(WebhookOutcome::Reconciled)
    }

    async fn expire(&self, session: &CheckoutSessionObject) -> Result<WebhookOutcome, ServiceError> {
        let Ok(metadata) = CheckoutMetadata::from_event_metadata(&session.metadata) else {
            warn!(session_id = %session.id, "expiry event carries no bookingId");
            return Ok(WebhookOutcome::MissingBookingId);
        };
        let booking_id = metadata.booking_id.as_str();

        let Some(booking) = self
            .bookings
            .find_by_booking_id(booking_id)
            .await
            .map_err(|e| processing_failed("booking lookup", e))?
        else {
            warn!(booking_id, "expiry event for unknown booking");
            return Ok(WebhookOutcome::BookingNotFound);
        };

        match self
            .bookings
            .transition(&booking, PaymentStatus::Expired, BookingUpdate::default())
            .await
            .map_err(|e| processing_failed("payment status update", e))?
        {
            Transition::Applied(_) => Ok(WebhookOutcome::Expired),
            Transition::Skipped { .. } => Ok(WebhookOutcome::ExpiryIgnored),
        }
    }
}

fn processing_failed(step: &str, err: crate::crm::CrmError) -> ServiceError {
    error!(step, error = %err, "webhook processing failed");
    ServiceError::WebhookProcessingFailed(format!("{}: {}", step, err))
}

/// Builds the downstream payload entirely from the event; nothing is re-read from the CRM.
pub fn build_notification(
    metadata: &CheckoutMetadata,
    session: &CheckoutSessionObject,
    reference: String,
) -> BookingNotification {
    let amount_paid = session
        .amount_total
        .map(|minor| {
            from_minor_units(minor, session.currency.as_deref().unwrap_or_default())
        })
        .or_else(|| metadata.price_amount());

    BookingNotification {
        event: BOOKING_PAID_EVENT.to_string(),
        booking_id: metadata.booking_id.clone(),
        offering: OfferingSummary {
            id: metadata.offering_id.clone(),
            name: metadata.offering_name.clone(),
            subject: metadata.subject.clone(),
            year_group: metadata.year_group.clone(),
            date: metadata.workshop_date.clone(),
            time: metadata.workshop_time.clone(),
            session_link: metadata.session_link.clone(),
        },
        parent: ParentSummary {
            name: metadata.parent_name.clone(),
            email: metadata.parent_email.clone(),
            phone: metadata.parent_phone.clone(),
        },
        student: StudentSummary {
            name: metadata.student_name.clone(),
            email: metadata.student_email.clone(),
        },
        payment: PaymentSummary {
            reference,
            amount_paid,
            currency: session.currency.clone(),
        },
    }
}
