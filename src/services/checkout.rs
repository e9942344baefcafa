//! Checkout handoff: the metadata that travels with a payment, the redirect URL
//! for the booking flow, and embedded session creation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, instrument};
use url::Url;
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;
use crate::payments::{CheckoutSessionRequest, LineItem, PaymentGateway};
use crate::validation::validate_not_blank;

/// Stripe caps metadata values at 500 characters.
pub const METADATA_VALUE_LIMIT: usize = 500;

/// Reconciliation context carried through the payment processor so a
/// completed payment can be announced without going back to the CRM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutMetadata {
    pub booking_id: String,
    pub parent_name: String,
    pub parent_email: String,
    pub parent_phone: String,
    pub student_name: String,
    pub student_email: String,
    pub offering_id: String,
    pub offering_name: String,
    pub subject: String,
    pub workshop_date: String,
    pub workshop_time: String,
    pub year_group: String,
    pub session_link: String,
    /// Offering price in major units as recorded on the booking
    pub price: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("checkout metadata has no bookingId")]
pub struct MissingBookingId;

impl CheckoutMetadata {
    /// Key/value pairs in a stable order.
    pub fn pairs(&self) -> [(&'static str, &str); 14] {
        [
            ("bookingId", self.booking_id.as_str()),
            ("parentName", self.parent_name.as_str()),
            ("parentEmail", self.parent_email.as_str()),
            ("parentPhone", self.parent_phone.as_str()),
            ("studentName", self.student_name.as_str()),
            ("studentEmail", self.student_email.as_str()),
            ("offeringId", self.offering_id.as_str()),
            ("offeringName", self.offering_name.as_str()),
            ("subject", self.subject.as_str()),
            ("workshopDate", self.workshop_date.as_str()),
            ("workshopTime", self.workshop_time.as_str()),
            ("yearGroup", self.year_group.as_str()),
            ("sessionLink", self.session_link.as_str()),
            ("price", self.price.as_str()),
        ]
    }

    /// Metadata map for the payment session, truncating over-long values.
    pub fn to_session_metadata(&self) -> BTreeMap<String, String> {
        self.pairs()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.chars().take(METADATA_VALUE_LIMIT).collect()))
            .collect()
    }

    /// Decodes metadata echoed back on a webhook event.
    pub fn from_event_metadata(map: &HashMap<String, String>) -> Result<Self, MissingBookingId> {
        let get = |key: &str| map.get(key).cloned().unwrap_or_default();
        let metadata = Self {
            booking_id: get("bookingId").trim().to_string(),
            parent_name: get("parentName"),
            parent_email: get("parentEmail"),
            parent_phone: get("parentPhone"),
            student_name: get("studentName"),
            student_email: get("studentEmail"),
            offering_id: get("offeringId"),
            offering_name: get("offeringName"),
            subject: get("subject"),
            workshop_date: get("workshopDate"),
            workshop_time: get("workshopTime"),
            year_group: get("yearGroup"),
            session_link: get("sessionLink"),
            price: get("price"),
        };
        if metadata.booking_id.is_empty() {
            return Err(MissingBookingId);
        }
        Ok(metadata)
    }

    pub fn price_amount(&self) -> Option<Decimal> {
        self.price.trim().parse().ok()
    }
}

/// `checkout_page_url` with every metadata entry appended as a query parameter.
pub fn build_checkout_url(checkout_page: &Url, metadata: &CheckoutMetadata) -> String {
    let mut url = checkout_page.clone();
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in metadata.pairs() {
            query.append_pair(key, value);
        }
    }
    url.to_string()
}

/// Body of `POST /checkout/session`.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutSessionRequest {
    #[validate(email)]
    pub customer_email: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    /// Pre-configured processor price; mutually exclusive with `amount`
    #[serde(default)]
    pub price_id: Option<String>,
    /// Inline amount in major units; requires `description`
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub metadata: CheckoutMetadata,
}

impl CreateCheckoutSessionRequest {
    fn line_item(&self, currency: &str) -> Result<LineItem, ServiceError> {
        let price_id = self
            .price_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        match (price_id, self.amount) {
            (Some(_), Some(_)) => Err(ServiceError::ValidationError(
                "provide either priceId or amount, not both".to_string(),
            )),
            (Some(price_id), None) => Ok(LineItem::Price {
                price_id: price_id.to_string(),
            }),
            (None, Some(amount)) => {
                if amount <= Decimal::ZERO {
                    return Err(ServiceError::ValidationError(
                        "amount: must be greater than zero".to_string(),
                    ));
                }
                let description = self
                    .description
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| {
                        ServiceError::ValidationError(
                            "description: required with amount".to_string(),
                        )
                    })?;
                Ok(LineItem::Inline {
                    amount,
                    currency: currency.to_string(),
                    description: description.to_string(),
                })
            }
            (None, None) => Err(ServiceError::ValidationError(
                "either priceId or amount is required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionResponse {
    pub client_secret: String,
    pub publishable_key: String,
    pub session_id: String,
}

pub struct CheckoutSessionService {
    gateway: Arc<dyn PaymentGateway>,
    publishable_key: String,
    return_url: String,
    currency: String,
}

impl CheckoutSessionService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        publishable_key: String,
        return_url: String,
        currency: String,
    ) -> Self {
        Self {
            gateway,
            publishable_key,
            return_url,
            currency,
        }
    }

    #[instrument(skip(self, request), fields(booking_id = %request.metadata.booking_id))]
    pub async fn create_session(
        &self,
        request: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSessionResponse, ServiceError> {
        request.validate()?;
        validate_not_blank(&request.metadata.booking_id).map_err(|_| {
            ServiceError::ValidationError("bookingId: must not be blank".to_string())
        })?;
        let line_item = request.line_item(&self.currency)?;

        let session_request = CheckoutSessionRequest {
            booking_id: request.metadata.booking_id.clone(),
            customer_email: request.customer_email.clone(),
            line_item,
            return_url: self.return_url.clone(),
            metadata: request.metadata.to_session_metadata(),
        };

        let session = self
            .gateway
            .create_checkout_session(&session_request)
            .await?;
        let client_secret = session.client_secret.ok_or_else(|| {
            ServiceError::SessionCreateFailed("session returned without client secret".to_string())
        })?;

        info!(session_id = %session.id, "checkout session created");
        Ok(CheckoutSessionResponse {
            client_secret,
            publishable_key: self.publishable_key.clone(),
            session_id: session.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::{CheckoutSession, PaymentError};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    fn metadata() -> CheckoutMetadata {
        CheckoutMetadata {
            booking_id: "BK-1-A".into(),
            parent_name: "Chidi Okafor".into(),
            parent_email: "chidi@example.com".into(),
            parent_phone: "+447700900123".into(),
            student_name: "Ada Okafor".into(),
            student_email: "ada@example.com".into(),
            offering_id: "off_1".into(),
            offering_name: "GCSE Maths & Stats".into(),
            subject: "Maths".into(),
            workshop_date: "2025-04-12".into(),
            workshop_time: "10:00-13:00".into(),
            year_group: "gcse".into(),
            session_link: "https://meet.example.com/abc".into(),
            price: "45.50".into(),
        }
    }

    #[test]
    fn checkout_url_carries_every_field() {
        let base = Url::parse("https://pay.example.com/checkout").unwrap();
        let url = Url::parse(&build_checkout_url(&base, &metadata())).unwrap();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(query.len(), 14);
        assert_eq!(query["bookingId"], "BK-1-A");
        assert_eq!(query["offeringName"], "GCSE Maths & Stats");
        assert_eq!(query["parentPhone"], "+447700900123");
        assert_eq!(query["price"], "45.50");
    }

    #[test]
    fn metadata_survives_the_session_round_trip() {
        let original = metadata();
        let echoed: HashMap<String, String> = original.to_session_metadata().into_iter().collect();
        let decoded = CheckoutMetadata::from_event_metadata(&echoed).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.price_amount(), Some(dec!(45.50)));
    }

    #[test]
    fn booking_id_is_mandatory_on_decode() {
        let mut echoed: HashMap<String, String> = HashMap::new();
        echoed.insert("parentName".into(), "x".into());
        assert_eq!(
            CheckoutMetadata::from_event_metadata(&echoed),
            Err(MissingBookingId)
        );
    }

    #[test]
    fn long_values_are_truncated_for_the_processor() {
        let mut meta = metadata();
        meta.offering_name = "x".repeat(700);
        let session = meta.to_session_metadata();
        assert_eq!(session["offeringName"].len(), METADATA_VALUE_LIMIT);
    }

    #[derive(Default)]
    struct RecordingGateway {
        requests: Mutex<Vec<CheckoutSessionRequest>>,
        decline: bool,
    }

    #[async_trait]
    impl PaymentGateway for RecordingGateway {
        async fn create_checkout_session(
            &self,
            request: &CheckoutSessionRequest,
        ) -> Result<CheckoutSession, PaymentError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.decline {
                return Err(PaymentError::Card("Your card was declined".into()));
            }
            Ok(CheckoutSession {
                id: "cs_test_1".into(),
                client_secret: Some("cs_test_1_secret".into()),
                url: None,
            })
        }
    }

    fn request(price_id: Option<&str>, amount: Option<Decimal>) -> CreateCheckoutSessionRequest {
        CreateCheckoutSessionRequest {
            customer_email: "chidi@example.com".into(),
            customer_name: Some("Chidi Okafor".into()),
            price_id: price_id.map(str::to_string),
            amount,
            description: Some("GCSE Maths".into()),
            metadata: metadata(),
        }
    }

    fn service(gateway: Arc<RecordingGateway>) -> CheckoutSessionService {
        CheckoutSessionService::new(
            gateway,
            "pk_test_1".into(),
            "https://example.com/return?session_id={CHECKOUT_SESSION_ID}".into(),
            "gbp".into(),
        )
    }

    #[tokio::test]
    async fn creates_session_with_metadata_and_return_url() {
        let gateway = Arc::new(RecordingGateway::default());
        let response = service(gateway.clone())
            .create_session(request(Some("price_1"), None))
            .await
            .unwrap();

        assert_eq!(response.client_secret, "cs_test_1_secret");
        assert_eq!(response.publishable_key, "pk_test_1");

        let sent = gateway.requests.lock().unwrap().pop().unwrap();
        assert_eq!(sent.booking_id, "BK-1-A");
        assert_eq!(sent.metadata["studentEmail"], "ada@example.com");
        assert!(sent.return_url.contains("{CHECKOUT_SESSION_ID}"));
        assert_matches!(sent.line_item, LineItem::Price { price_id } if price_id == "price_1");
    }

    #[tokio::test]
    async fn inline_amount_uses_configured_currency() {
        let gateway = Arc::new(RecordingGateway::default());
        service(gateway.clone())
            .create_session(request(None, Some(dec!(45.50))))
            .await
            .unwrap();
        let sent = gateway.requests.lock().unwrap().pop().unwrap();
        assert_matches!(sent.line_item, LineItem::Inline { currency, .. } if currency == "gbp");
    }

    #[tokio::test]
    async fn line_item_must_be_unambiguous() {
        let gateway = Arc::new(RecordingGateway::default());
        let svc = service(gateway.clone());
        for (price_id, amount) in [
            (Some("price_1"), Some(dec!(10))),
            (None, None),
            (None, Some(dec!(0))),
        ] {
            let err = svc.create_session(request(price_id, amount)).await.unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR");
        }
        assert!(gateway.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn card_decline_is_user_actionable() {
        let gateway = Arc::new(RecordingGateway {
            decline: true,
            ..Default::default()
        });
        let err = service(gateway)
            .create_session(request(Some("price_1"), None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CARD_ERROR");
    }
}
