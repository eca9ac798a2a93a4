//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use secrecy::{ExposeSecret, SecretString};
use std::net::SocketAddr;
use std::time::Duration;
use terminal_pos_core::candidates::MAX_WINDOW;
use terminal_pos_core::CollectPrompt;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub stripe_secret_key: SecretString,
    pub stripe_publishable_key: Option<String>,
    pub stripe_endpoint_secret: Option<SecretString>,
    pub stripe_api_base: String,
    pub cors_origin: String,
    pub currency: String,
    pub checkout_price_id: Option<String>,
    pub checkout_return_url: String,
    pub sdk_customer_email: String,
    pub session_ttl: Duration,
    pub session_cookie_secure: bool,
    pub dedup_charge_window: u32,
    pub dedup_customer_window: u32,
    pub collect_prompt: CollectPrompt,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Server Settings ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:4242".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            var("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Payment Platform Keys ---
        let stripe_secret_key = var("STRIPE_SECRET_KEY")
            .ok_or_else(|| ConfigError::MissingVar("STRIPE_SECRET_KEY".to_string()))?;
        validate_secret_key(&stripe_secret_key)?;
        let stripe_secret_key = SecretString::from(stripe_secret_key);

        let stripe_publishable_key = var("STRIPE_PUBLISHABLE_KEY").filter(|k| !k.is_empty());
        let stripe_endpoint_secret = var("STRIPE_ENDPOINT_SECRET")
            .filter(|k| !k.is_empty())
            .map(SecretString::from);
        let stripe_api_base = var("STRIPE_API_BASE")
            .unwrap_or_else(|| "https://api.stripe.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();

        // --- Payments ---
        let currency = var("CURRENCY").unwrap_or_else(|| "jpy".to_string()).to_lowercase();
        let checkout_price_id = var("CHECKOUT_PRICE_ID").filter(|p| !p.is_empty());
        let checkout_return_url =
            var("CHECKOUT_RETURN_URL").unwrap_or_else(|| "https://example.com/return".to_string());
        let sdk_customer_email =
            var("SDK_CUSTOMER_EMAIL").unwrap_or_else(|| "example@test.com".to_string());

        // --- Sessions ---
        let session_ttl = Duration::from_secs(parse_or(&var, "SESSION_TTL_SECS", 86_400u64)?);
        let session_cookie_secure = parse_or(&var, "SESSION_COOKIE_SECURE", false)?;

        // --- Candidate Search ---
        let dedup_charge_window = window(&var, "DEDUP_CHARGE_WINDOW")?;
        let dedup_customer_window = window(&var, "DEDUP_CUSTOMER_WINDOW")?;

        // --- Reader Prompt ---
        let defaults = CollectPrompt::default();
        let collect_prompt = CollectPrompt {
            title: var("COLLECT_EMAIL_TITLE").unwrap_or(defaults.title),
            description: var("COLLECT_EMAIL_DESCRIPTION").unwrap_or(defaults.description),
            submit_button: defaults.submit_button,
            skip_button: defaults.skip_button,
        };

        Ok(Self {
            bind_address,
            log_level,
            stripe_secret_key,
            stripe_publishable_key,
            stripe_endpoint_secret,
            stripe_api_base,
            cors_origin,
            currency,
            checkout_price_id,
            checkout_return_url,
            sdk_customer_email,
            session_ttl,
            session_cookie_secure,
            dedup_charge_window,
            dedup_customer_window,
            collect_prompt,
        })
    }

    pub fn secret_key(&self) -> &str {
        self.stripe_secret_key.expose_secret()
    }
}

/// Only test-mode secret keys are accepted.
fn validate_secret_key(key: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| {
        Err(ConfigError::InvalidValue(
            "STRIPE_SECRET_KEY".to_string(),
            reason.to_string(),
        ))
    };
    if key.trim().is_empty() {
        return invalid("the secret key is empty");
    }
    if key.starts_with("pk") {
        return invalid("a publishable key was provided; use your test mode secret key");
    }
    if key.starts_with("sk_live") {
        return invalid("a live mode secret key was provided; use your test mode secret key");
    }
    Ok(())
}

fn parse_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match var(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), format!("'{}' could not be parsed", raw))
        }),
        None => Ok(default),
    }
}

fn window(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<u32, ConfigError> {
    let value = parse_or(var, key, MAX_WINDOW)?;
    if !(1..=MAX_WINDOW).contains(&value) {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("must be between 1 and {}", MAX_WINDOW),
        ));
    }
    Ok(value)
}
