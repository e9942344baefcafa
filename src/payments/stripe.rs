use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, instrument};

use super::{
    to_minor_units, CheckoutSession, CheckoutSessionRequest, LineItem, PaymentError,
    PaymentGateway,
};

pub const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub api_base: String,
    pub timeout: Duration,
}

/// Stripe-backed [`PaymentGateway`] creating embedded checkout sessions.
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    secret_key: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(settings: StripeSettings) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| PaymentError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            secret_key: settings.secret_key,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Flattens a session request into Stripe's bracketed form encoding.
    fn session_form(request: &CheckoutSessionRequest) -> Result<Vec<(String, String)>, PaymentError> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("ui_mode".into(), "embedded".into()),
            ("return_url".into(), request.return_url.clone()),
            ("customer_email".into(), request.customer_email.clone()),
            ("client_reference_id".into(), request.booking_id.clone()),
            ("line_items[0][quantity]".into(), "1".into()),
        ];

        match &request.line_item {
            LineItem::Price { price_id } => {
                form.push(("line_items[0][price]".into(), price_id.clone()));
            }
            LineItem::Inline {
                amount,
                currency,
                description,
            } => {
                let unit_amount = to_minor_units(*amount, currency).ok_or_else(|| {
                    PaymentError::InvalidRequest(format!("amount {} out of range", amount))
                })?;
                form.push((
                    "line_items[0][price_data][currency]".into(),
                    currency.to_ascii_lowercase(),
                ));
                form.push((
                    "line_items[0][price_data][unit_amount]".into(),
                    unit_amount.to_string(),
                ));
                form.push((
                    "line_items[0][price_data][product_data][name]".into(),
                    description.clone(),
                ));
            }
        }

        for (key, value) in &request.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }
        Ok(form)
    }

    fn classify_error(status: u16, body: &str) -> PaymentError {
        match serde_json::from_str::<StripeErrorEnvelope>(body) {
            Ok(envelope) if envelope.error.error_type == "card_error" => PaymentError::Card(
                envelope
                    .error
                    .message
                    .unwrap_or_else(|| "Your card was declined".to_string()),
            ),
            Ok(envelope) => PaymentError::Api {
                status,
                message: envelope
                    .error
                    .message
                    .unwrap_or(envelope.error.error_type),
            },
            Err(_) => PaymentError::Api {
                status,
                message: body.to_string(),
            },
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(booking_id = %request.booking_id))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let form = Self::session_form(request)?;
        let url = format!("{}/checkout/sessions", self.api_base);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Stripe API request failed");
                PaymentError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "Stripe rejected checkout session");
            return Err(Self::classify_error(status.as_u16(), &body));
        }

        let session: CheckoutSession = response.json().await?;
        debug!(session_id = %session.id, "Stripe checkout session created");
        Ok(session)
    }
}
