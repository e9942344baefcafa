//! Workshop Booking API
//!
//! Booking backend for revision workshops: offering eligibility, contact and
//! booking records kept in an external CRM, hosted checkout handoff, and
//! payment webhook reconciliation with downstream notification.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod crm;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod notifications;
pub mod openapi;
pub mod payments;
pub mod services;
pub mod tracing;
pub mod validation;

use ::tracing::{info, warn};
use anyhow::Context;
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::crm::{http::HttpCrmSettings, CrmClient, HttpCrmClient, InMemoryCrm};
use crate::notifications::{HttpNotifier, Notifier};
use crate::payments::{PaymentGateway, StripeGateway, StripeSettings};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Builds the production collaborators described by `config`.
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let crm: Arc<dyn CrmClient> = if config.uses_in_memory_crm() {
            warn!("using the in-memory CRM backend; records are lost on restart");
            Arc::new(InMemoryCrm::new())
        } else {
            let settings = HttpCrmSettings {
                base_url: config
                    .crm_base_url
                    .clone()
                    .context("crm_base_url is required for the http CRM backend")?,
                api_key: config
                    .crm_api_key
                    .clone()
                    .context("crm_api_key is required for the http CRM backend")?,
                timeout: config.crm_timeout(),
                offering_object: config.crm_offering_object.clone(),
                booking_object: config.crm_booking_object.clone(),
            };
            Arc::new(HttpCrmClient::new(settings).context("failed to build CRM client")?)
        };

        let gateway: Arc<dyn PaymentGateway> = Arc::new(
            StripeGateway::new(StripeSettings {
                secret_key: config.stripe_secret_key.clone(),
                api_base: config.stripe_api_base.clone(),
                timeout: config.stripe_timeout(),
            })
            .context("failed to build payment gateway")?,
        );

        if config.notification_webhook_url.is_none() {
            info!("notification webhook URL not configured; paid bookings will not be announced");
        }
        let notifier: Arc<dyn Notifier> = Arc::new(
            HttpNotifier::new(
                config.notification_webhook_url.clone(),
                config.notification_timeout(),
            )
            .context("failed to build notifier")?,
        );

        Self::with_collaborators(config, crm, gateway, notifier)
    }

    /// Builds state over caller-supplied collaborators.
    pub fn with_collaborators(
        config: AppConfig,
        crm: Arc<dyn CrmClient>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let services = handlers::AppServices::new(&config, crm, gateway, notifier)?;
        Ok(Self {
            config: Arc::new(config),
            services,
        })
    }
}

// Common response wrappers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            meta: ResponseMeta::capture(),
        }
    }
}

/// CORS from configured origins; permissive only where the config allows it.
pub fn cors_layer(config: &AppConfig) -> anyhow::Result<CorsLayer> {
    let configured_origins: Option<Vec<HeaderValue>> = config
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any))
    } else if config.should_allow_permissive_cors() {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if config.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        Ok(CorsLayer::permissive())
    } else {
        anyhow::bail!(
            "Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true"
        )
    }
}

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/offerings", get(handlers::offerings::list_offerings))
        .route("/bookings", post(handlers::bookings::create_booking))
        .route(
            "/checkout/session",
            post(handlers::checkout::create_checkout_session),
        )
        .route(
            "/webhooks/payment",
            post(handlers::payment_webhooks::payment_webhook),
        )
}

/// Full application router with the middleware stack applied.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config)?;
    let timeout = state.config.request_timeout();

    Ok(Router::<AppState>::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health_check))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .fallback(handlers::common::not_found)
        .layer(crate::tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(axum::middleware::from_fn(crate::tracing::assign_request_id))
        .with_state(state))
}
