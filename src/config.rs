use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use url::Url;
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CRM_BACKEND: &str = "http";
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
const DEFAULT_CURRENCY: &str = "gbp";

pub const CRM_BACKEND_HTTP: &str = "http";
pub const CRM_BACKEND_IN_MEMORY: &str = "in-memory";

/// Application configuration, built once at startup and shared read-only.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS outside development
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// Whole-request timeout
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    /// "http" for the real CRM, "in-memory" for local development
    #[serde(default = "default_crm_backend")]
    #[validate(custom = "validate_crm_backend")]
    pub crm_backend: String,

    #[serde(default)]
    pub crm_base_url: Option<String>,

    #[serde(default)]
    pub crm_api_key: Option<String>,

    #[serde(default = "default_collaborator_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub crm_timeout_secs: u64,

    /// Custom-object collection holding offerings
    #[serde(default = "default_offering_object")]
    #[validate(length(min = 1))]
    pub crm_offering_object: String,

    /// Custom-object collection holding bookings
    #[serde(default = "default_booking_object")]
    #[validate(length(min = 1))]
    pub crm_booking_object: String,

    #[validate(length(min = 1))]
    pub stripe_secret_key: String,

    #[validate(length(min = 1))]
    pub stripe_publishable_key: String,

    #[validate(length(min = 1))]
    pub stripe_webhook_secret: String,

    #[serde(default = "default_stripe_api_base")]
    #[validate(custom = "validate_absolute_url")]
    pub stripe_api_base: String,

    #[serde(default = "default_collaborator_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub stripe_timeout_secs: u64,

    /// Maximum age of a webhook signature timestamp
    #[serde(default = "default_webhook_tolerance_secs")]
    #[validate(range(min = 1, max = 3600))]
    pub webhook_tolerance_secs: u64,

    /// Currency for inline-amount checkout sessions
    #[serde(default = "default_currency")]
    #[validate(custom = "validate_currency")]
    pub currency: String,

    /// Payment page the booking flow redirects to
    #[validate(custom = "validate_absolute_url")]
    pub checkout_page_url: String,

    /// Session return URL; `{CHECKOUT_SESSION_ID}` is passed through untouched
    #[validate(custom = "validate_absolute_url")]
    pub checkout_return_url: String,

    /// Downstream automation endpoint; unset disables dispatch
    #[serde(default)]
    pub notification_webhook_url: Option<String>,

    #[serde(default = "default_collaborator_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub notification_timeout_secs: u64,
}

impl AppConfig {
    /// Development configuration with the in-memory CRM; the caller supplies
    /// processor keys and URLs.
    pub fn new(
        stripe_secret_key: String,
        stripe_publishable_key: String,
        stripe_webhook_secret: String,
        checkout_page_url: String,
        checkout_return_url: String,
    ) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: default_port(),
            environment: DEFAULT_ENV.to_string(),
            log_level: default_log_level(),
            log_json: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            request_timeout_secs: default_request_timeout_secs(),
            crm_backend: CRM_BACKEND_IN_MEMORY.to_string(),
            crm_base_url: None,
            crm_api_key: None,
            crm_timeout_secs: default_collaborator_timeout_secs(),
            crm_offering_object: default_offering_object(),
            crm_booking_object: default_booking_object(),
            stripe_secret_key,
            stripe_publishable_key,
            stripe_webhook_secret,
            stripe_api_base: default_stripe_api_base(),
            stripe_timeout_secs: default_collaborator_timeout_secs(),
            webhook_tolerance_secs: default_webhook_tolerance_secs(),
            currency: default_currency(),
            checkout_page_url,
            checkout_return_url,
            notification_webhook_url: None,
            notification_timeout_secs: default_collaborator_timeout_secs(),
        }
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn uses_in_memory_crm(&self) -> bool {
        self.crm_backend.eq_ignore_ascii_case(CRM_BACKEND_IN_MEMORY)
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn crm_timeout(&self) -> Duration {
        Duration::from_secs(self.crm_timeout_secs)
    }

    pub fn stripe_timeout(&self) -> Duration {
        Duration::from_secs(self.stripe_timeout_secs)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }

    pub fn checkout_page(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.checkout_page_url)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.uses_in_memory_crm() {
            let base_ok = self
                .crm_base_url
                .as_deref()
                .map(|u| validate_absolute_url(u).is_ok())
                .unwrap_or(false);
            if !base_ok {
                let mut err = ValidationError::new("crm_base_url_required");
                err.message = Some("Set APP__CRM_BASE_URL to an absolute URL for the http CRM backend".into());
                errors.add("crm_base_url", err);
            }

            let key_ok = self
                .crm_api_key
                .as_deref()
                .map(|k| !k.trim().is_empty())
                .unwrap_or(false);
            if !key_ok {
                let mut err = ValidationError::new("crm_api_key_required");
                err.message = Some("Set APP__CRM_API_KEY for the http CRM backend".into());
                errors.add("crm_api_key", err);
            }
        }

        if let Some(url) = self.notification_webhook_url.as_deref() {
            if !url.trim().is_empty() && validate_absolute_url(url).is_err() {
                let mut err = ValidationError::new("notification_webhook_url");
                err.message = Some("notification_webhook_url must be an absolute URL".into());
                errors.add("notification_webhook_url", err);
            }
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Runs field validation and the cross-field rules.
    pub fn validate_all(&self) -> Result<(), AppConfigError> {
        self.validate().map_err(|e| {
            error!("Configuration validation failed: {}", e);
            AppConfigError::Validation(e)
        })?;
        self.validate_additional_constraints().map_err(|e| {
            error!("Configuration validation failed: {}", e);
            AppConfigError::Validation(e)
        })
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_crm_backend() -> String {
    DEFAULT_CRM_BACKEND.to_string()
}

fn default_collaborator_timeout_secs() -> u64 {
    10
}

fn default_offering_object() -> String {
    "offerings".to_string()
}

fn default_booking_object() -> String {
    "bookings".to_string()
}

fn default_stripe_api_base() -> String {
    DEFAULT_STRIPE_API_BASE.to_string()
}

fn default_webhook_tolerance_secs() -> u64 {
    300
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_crm_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        CRM_BACKEND_HTTP | CRM_BACKEND_IN_MEMORY => Ok(()),
        _ => {
            let mut err = ValidationError::new("crm_backend");
            err.message = Some("Must be one of: http, in-memory".into());
            Err(err)
        }
    }
}

fn validate_currency(value: &str) -> Result<(), ValidationError> {
    if value.len() == 3 && value.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency");
        err.message = Some("Must be a three-letter ISO currency code".into());
        Err(err)
    }
}

fn validate_absolute_url(value: &str) -> Result<(), ValidationError> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => {
            let mut err = ValidationError::new("url");
            err.message = Some("Must be an absolute http(s) URL".into());
            Err(err)
        }
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("workshop_booking_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);
    let filter = EnvFilter::new(filter_directive);

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate_all()?;

    info!(
        environment = %app_config.environment,
        crm_backend = %app_config.crm_backend,
        "Configuration loaded successfully"
    );
    Ok(app_config)
}
