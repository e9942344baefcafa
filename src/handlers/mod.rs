pub mod bookings;
pub mod checkout;
pub mod common;
pub mod health;
pub mod offerings;
pub mod payment_webhooks;

use anyhow::Context;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::crm::CrmClient;
use crate::notifications::Notifier;
use crate::payments::PaymentGateway;
use crate::services::{
    bookings::BookingService, checkout::CheckoutSessionService, offerings::OfferingService,
    reconciliation::ReconciliationService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub bookings: Arc<BookingService>,
    pub offerings: Arc<OfferingService>,
    pub checkout: Arc<CheckoutSessionService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl AppServices {
    /// Wires every service over the given collaborators.
    pub fn new(
        config: &AppConfig,
        crm: Arc<dyn CrmClient>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let checkout_page = config
            .checkout_page()
            .context("checkout_page_url is not a valid URL")?;

        Ok(Self {
            bookings: Arc::new(BookingService::new(crm.clone(), checkout_page)),
            offerings: Arc::new(OfferingService::new(crm.clone())),
            checkout: Arc::new(CheckoutSessionService::new(
                gateway,
                config.stripe_publishable_key.clone(),
                config.checkout_return_url.clone(),
                config.currency.to_ascii_lowercase(),
            )),
            reconciliation: Arc::new(ReconciliationService::new(
                crm,
                notifier,
                config.stripe_webhook_secret.clone(),
                config.webhook_tolerance_secs,
            )),
        })
    }
}
