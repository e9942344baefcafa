use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Workshop Booking API",
        version = "0.1.0",
        description = r#"
# Workshop Booking API

Books students onto revision workshops and hands parents off to hosted checkout.

## Flow

1. `GET /api/v1/offerings?yearGroup=gcse` lists bookable workshops.
2. `POST /api/v1/bookings` records the parent, student and a pending booking,
   and returns a `checkoutUrl` carrying the reconciliation metadata.
3. The payment page calls `POST /api/v1/checkout/session` to open an embedded
   checkout session.
4. The payment processor calls `POST /api/v1/webhooks/payment`; the booking is
   marked paid and downstream automation is notified.

## Error Handling

Every failure uses the same envelope; clients branch on `error.code`:

```json
{
  "success": false,
  "error": { "code": "DUPLICATE_BOOKING", "message": "This student is already booked onto this workshop" },
  "requestId": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
  "timestamp": "2025-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Offerings", description = "Workshop listing"),
        (name = "Bookings", description = "Booking creation and checkout handoff"),
        (name = "Checkout", description = "Embedded payment sessions"),
        (name = "Payments", description = "Payment processor webhooks"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::offerings::list_offerings,
        crate::handlers::bookings::create_booking,
        crate::handlers::checkout::create_checkout_session,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::services::offerings::OfferingSummary,
            crate::services::bookings::CreateBookingRequest,
            crate::services::bookings::ParentInput,
            crate::services::bookings::StudentInput,
            crate::services::bookings::CreateBookingResponse,
            crate::services::checkout::CreateCheckoutSessionRequest,
            crate::services::checkout::CheckoutMetadata,
            crate::services::checkout::CheckoutSessionResponse,
            crate::services::reconciliation::WebhookOutcome,
            crate::handlers::payment_webhooks::WebhookAck,
            crate::handlers::health::HealthResponse,
            crate::models::YearGroup,
            crate::models::Availability,
            crate::ResponseMeta,
            crate::errors::ErrorResponse,
            crate::errors::ErrorBody
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
