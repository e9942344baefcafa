#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{Duration as ChronoDuration, Local, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use workshop_booking_api::{
    build_router,
    config::AppConfig,
    crm::InMemoryCrm,
    models::{Availability, Booking, Offering, YearGroup},
    notifications::{BookingNotification, Notifier, NotifyError},
    payments::{
        webhook::{sign_payload, SIGNATURE_HEADER},
        CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentGateway,
    },
    AppState,
};

pub const WEBHOOK_SECRET: &str = "whsec_integration";
pub const PUBLISHABLE_KEY: &str = "pk_test_integration";
pub const CHECKOUT_PAGE: &str = "https://book.example.com/checkout";

/// Payment gateway that records every request and answers from a script.
#[derive(Default)]
pub struct ScriptedGateway {
    pub requests: Mutex<Vec<CheckoutSessionRequest>>,
    card_error: Mutex<Option<String>>,
}

impl ScriptedGateway {
    pub fn decline_with(&self, message: &str) {
        *self.card_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn requests(&self) -> Vec<CheckoutSessionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(message) = self.card_error.lock().unwrap().clone() {
            return Err(PaymentError::Card(message));
        }
        let n = self.requests.lock().unwrap().len();
        Ok(CheckoutSession {
            id: format!("cs_test_{}", n),
            client_secret: Some(format!("cs_test_{}_secret", n)),
            url: None,
        })
    }
}

/// Notifier that records deliveries; failures can be switched on and off.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<BookingNotification>>,
    attempts: Mutex<usize>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<BookingNotification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &BookingNotification) -> Result<(), NotifyError> {
        *self.attempts.lock().unwrap() += 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected(503));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Real router over in-memory collaborators.
pub struct TestApp {
    router: Router,
    pub crm: Arc<InMemoryCrm>,
    pub gateway: Arc<ScriptedGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn test_config() -> AppConfig {
    AppConfig::new(
        "sk_test_integration".to_string(),
        PUBLISHABLE_KEY.to_string(),
        WEBHOOK_SECRET.to_string(),
        CHECKOUT_PAGE.to_string(),
        "https://book.example.com/complete?session_id={CHECKOUT_SESSION_ID}".to_string(),
    )
}

impl TestApp {
    pub fn new() -> Self {
        let crm = Arc::new(InMemoryCrm::new());
        let gateway = Arc::new(ScriptedGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let state = AppState::with_collaborators(
            test_config(),
            crm.clone(),
            gateway.clone(),
            notifier.clone(),
        )
        .expect("failed to build test state");
        let router = build_router(state).expect("failed to build router");

        Self {
            router,
            crm,
            gateway,
            notifier,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Send a request with an optional JSON body.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };
        self.send(builder.body(body).expect("failed to build request"))
            .await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response {
        self.request(Method::POST, uri, Some(body)).await
    }

    /// Posts a webhook body with the given signature header, if any.
    pub async fn post_webhook_raw(&self, payload: Vec<u8>, signature: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/webhooks/payment")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        self.send(builder.body(Body::from(payload)).expect("failed to build request"))
            .await
    }

    /// Posts a correctly signed webhook event.
    pub async fn post_webhook(&self, event: &Value) -> Response {
        let payload = serde_json::to_vec(event).expect("failed to serialize event");
        let signature = sign_payload(&payload, WEBHOOK_SECRET, Utc::now().timestamp());
        self.post_webhook_raw(payload, Some(signature.as_str()))
            .await
    }

    pub async fn seed_offering(&self, offering: &Offering) {
        self.crm
            .seed_offering(offering)
            .await
            .expect("failed to seed offering");
    }

    pub async fn booking(&self, booking_id: &str) -> Booking {
        self.crm
            .bookings()
            .await
            .into_iter()
            .find(|b| b.booking_id.as_str() == booking_id)
            .expect("booking should exist")
    }

    /// Books a student onto `offering_id` and returns the success payload.
    pub async fn create_booking(&self, offering_id: &str, student_email: &str) -> Value {
        let response = self
            .post_json("/api/v1/bookings", booking_request(offering_id, student_email))
            .await;
        assert!(
            response.status().is_success(),
            "booking failed with {}",
            response.status()
        );
        response_json(response).await["data"].clone()
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Date `days` from today in the server's local calendar.
pub fn date_from_today(days: i64) -> String {
    (Local::now().date_naive() + ChronoDuration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

pub fn offering(id: &str, year_group: YearGroup, availability: Availability, date: &str) -> Offering {
    Offering {
        id: id.to_string(),
        updated_at: Some(Utc::now()),
        name: format!("{} Physics Intensive", id),
        cohort: "Spring 2025".to_string(),
        year_group,
        subject: "Physics".to_string(),
        workshop_date: date.to_string(),
        workshop_time: "10:00-13:00".to_string(),
        availability,
        price: Decimal::new(4500, 2),
        price_label: "£45".to_string(),
        session_link: format!("https://meet.example.com/{}", id),
        payment_product_id: Some(format!("price_{}", id)),
    }
}

pub fn booking_request(offering_id: &str, student_email: &str) -> Value {
    json!({
        "offeringId": offering_id,
        "parent": {
            "firstName": "Ada",
            "lastName": "Okafor",
            "email": "Ada.Okafor@Example.com",
            "phone": "07700 900123"
        },
        "student": {
            "firstName": "Tobi",
            "lastName": "Okafor",
            "email": student_email,
            "phone": ""
        }
    })
}

/// Stripe-shaped checkout session event for `booking_id`.
pub fn checkout_event(event_type: &str, booking_id: &str, payment_status: &str) -> Value {
    json!({
        "id": format!("evt_{}_{}", event_type.replace('.', "_"), booking_id),
        "type": event_type,
        "created": Utc::now().timestamp(),
        "data": {
            "object": {
                "id": "cs_test_abc",
                "object": "checkout.session",
                "payment_status": payment_status,
                "payment_intent": "pi_test_123",
                "currency": "gbp",
                "amount_total": 4500,
                "client_reference_id": booking_id,
                "metadata": {
                    "bookingId": booking_id,
                    "parentName": "Ada Okafor",
                    "parentEmail": "ada.okafor@example.com",
                    "parentPhone": "+447700900123",
                    "studentName": "Tobi Okafor",
                    "studentEmail": "tobi@example.com",
                    "offeringId": "off_1",
                    "offeringName": "off_1 Physics Intensive",
                    "subject": "Physics",
                    "workshopDate": "2030-01-01",
                    "workshopTime": "10:00-13:00",
                    "yearGroup": "gcse",
                    "sessionLink": "https://meet.example.com/off_1",
                    "price": "45"
                }
            }
        }
    })
}
