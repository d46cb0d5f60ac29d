use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEV_DEFAULT_JWT_SECRET: &str =
    "stonecraft_development_secret_key_that_is_at_least_64_characters_long_for_local_use";

/// Razorpay credentials and transport settings.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct RazorpayConfig {
    /// Public key id, also handed to the checkout widget
    #[serde(default)]
    pub key_id: String,

    /// Secret used for REST basic auth and checkout signature verification
    #[serde(default)]
    pub key_secret: String,

    /// Secret configured on the dashboard for webhook signing
    #[serde(default)]
    pub webhook_secret: String,

    #[serde(default = "default_razorpay_api_base")]
    #[validate(length(min = 1))]
    pub api_base: String,

    /// Per-request timeout for gateway calls
    #[serde(default = "default_gateway_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub timeout_secs: u64,

    /// How long a processed webhook event id is remembered
    #[serde(default = "default_webhook_dedupe_ttl_secs")]
    pub webhook_dedupe_ttl_secs: u64,
}

impl Default for RazorpayConfig {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            key_secret: String::new(),
            webhook_secret: String::new(),
            api_base: default_razorpay_api_base(),
            timeout_secs: default_gateway_timeout_secs(),
            webhook_dedupe_ttl_secs: default_webhook_dedupe_ttl_secs(),
        }
    }
}

/// Money and policy knobs for checkout.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CommerceConfig {
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    /// GST applied to the taxable base of every order
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_tax_rate")]
    pub tax_rate: Decimal,

    #[serde(default = "default_shipping_fee")]
    #[validate(custom = "validate_non_negative")]
    pub shipping_fee: Decimal,

    /// Orders at or above this amount (after promo discount) ship free
    #[serde(default = "default_free_shipping_threshold")]
    #[validate(custom = "validate_non_negative")]
    pub free_shipping_threshold: Decimal,

    #[serde(default = "default_gift_wrap_fee")]
    #[validate(custom = "validate_non_negative")]
    pub gift_wrap_fee: Decimal,

    #[serde(default = "default_return_window_days")]
    #[validate(range(min = 1, max = 365))]
    pub return_window_days: i64,
}

impl Default for CommerceConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            tax_rate: default_tax_rate(),
            shipping_fee: default_shipping_fee(),
            free_shipping_threshold: default_free_shipping_threshold(),
            gift_wrap_fee: default_gift_wrap_fee(),
            return_window_days: default_return_window_days(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    pub database_url: String,

    /// JWT secret key (minimum 64 characters)
    #[validate(length(min = 64), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// JWT lifetime in seconds
    #[validate(range(min = 300, max = 2_592_000))]
    pub jwt_expiration: i64,

    pub jwt_issuer: String,

    pub host: String,

    #[serde(default = "default_port")]
    #[validate(range(min = 1024))]
    pub port: u16,

    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub auto_migrate: bool,

    /// Comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    #[serde(default)]
    pub cors_allow_any_origin: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Request body limit in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Sender address on customer emails
    #[serde(default = "default_mail_from")]
    #[validate(email)]
    pub mail_from: String,

    #[serde(default)]
    #[validate]
    pub razorpay: RazorpayConfig,

    #[serde(default)]
    #[validate]
    pub commerce: CommerceConfig,
}

impl AppConfig {
    /// Configuration suitable for tests and local tooling.
    pub fn new(database_url: String, jwt_secret: String, environment: String) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_expiration: 3600,
            jwt_issuer: "stonecraft-api".to_string(),
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            environment,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            auto_migrate: true,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            body_limit_bytes: default_body_limit(),
            event_channel_capacity: default_event_channel_capacity(),
            mail_from: default_mail_from(),
            razorpay: RazorpayConfig::default(),
            commerce: CommerceConfig::default(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.cors_allow_any_origin || self.is_development()
    }

    /// Checks that span several fields and so cannot be expressed as derive attributes.
    pub fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && self.cors_origins().is_empty() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS outside development or opt in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message =
                Some("The development JWT secret must not be used outside development".into());
            errors.add("jwt_secret", err);
        }

        if self.is_production()
            && (self.razorpay.key_secret.is_empty() || self.razorpay.webhook_secret.is_empty())
        {
            let mut err = ValidationError::new("razorpay_credentials_required");
            err.message = Some(
                "APP__RAZORPAY__KEY_SECRET and APP__RAZORPAY__WEBHOOK_SECRET are required in production"
                    .into(),
            );
            errors.add("razorpay", err);
        }

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_pool_bounds");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_body_limit() -> usize {
    1024 * 1024
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_mail_from() -> String {
    "orders@stonecraft.example".to_string()
}

fn default_razorpay_api_base() -> String {
    "https://api.razorpay.com/v1".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    15
}

fn default_webhook_dedupe_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_tax_rate() -> Decimal {
    dec!(0.18)
}

fn default_shipping_fee() -> Decimal {
    dec!(500)
}

fn default_free_shipping_threshold() -> Decimal {
    dec!(10000)
}

fn default_gift_wrap_fee() -> Decimal {
    dec!(200)
}

fn default_return_window_days() -> i64 {
    30
}

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

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();
    if trimmed.len() < 64 {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be at least 64 characters".into());
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret must not be a repeated character".into());
            return Err(err);
        }
    }
    Ok(())
}

fn validate_tax_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if rate.is_sign_negative() || *rate > Decimal::ONE {
        let mut err = ValidationError::new("tax_rate");
        err.message = Some("tax_rate must be between 0 and 1".into());
        return Err(err);
    }
    Ok(())
}

fn validate_non_negative(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("amount must not be negative".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("stonecraft_api={},tower_http=info,sea_orm=warn", level);
    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    if let Err(err) = result {
        eprintln!("tracing subscriber already installed: {}", err);
    }
}

/// Layers built-in defaults, `config/default.toml`, `config/{RUN_ENV}.toml`
/// and `APP__*` environment variables, then validates the result.
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

    let mut builder = Config::builder()
        .set_default("database_url", "sqlite://stonecraft.db?mode=rwc")?
        .set_default("jwt_expiration", 86_400)?
        .set_default("jwt_issuer", "stonecraft-api")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?;

    if run_env.eq_ignore_ascii_case(DEFAULT_ENV) {
        builder = builder.set_default("jwt_secret", DEV_DEFAULT_JWT_SECRET)?;
    }

    let config = builder
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET (minimum 64 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "a_sufficiently_long_and_varied_secret_for_validation_purposes_0123456789".into(),
            "production".into(),
        )
    }

    #[test]
    fn defaults_validate() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate().is_ok());
        assert!(cfg.validate_additional_constraints().is_ok());
        assert_eq!(cfg.commerce.tax_rate, dec!(0.18));
        assert_eq!(cfg.commerce.return_window_days, 30);
    }

    #[test]
    fn production_requires_cors_and_gateway_secrets() {
        let cfg = base_config();
        let errors = cfg.validate_additional_constraints().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("cors_allowed_origins"));
        assert!(fields.contains_key("razorpay"));
    }

    #[test]
    fn production_with_origins_and_secrets_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://stonecraft.example, https://admin.stonecraft.example".into());
        cfg.razorpay.key_secret = "rzp_secret".into();
        cfg.razorpay.webhook_secret = "whsec".into();
        assert!(cfg.validate_additional_constraints().is_ok());
        assert_eq!(cfg.cors_origins().len(), 2);
    }

    #[test]
    fn tax_rate_out_of_range_is_rejected() {
        let mut cfg = base_config();
        cfg.commerce.tax_rate = dec!(1.5);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn weak_jwt_secret_is_rejected() {
        assert!(validate_jwt_secret("short").is_err());
        assert!(validate_jwt_secret(&"x".repeat(80)).is_err());
        assert!(validate_jwt_secret(DEV_DEFAULT_JWT_SECRET).is_ok());
    }
}
