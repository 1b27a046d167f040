//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `TRADEPOST_API_URL` - Base URL of the backend REST API
//!
//! ## Optional
//! - `TRADEPOST_API_TOKEN` - Bearer token issued by the auth service
//! - `TRADEPOST_VAT_RATE` - VAT rate as a fraction (default: 0.21)
//! - `TRADEPOST_CURRENCY` - ISO 4217 display currency (default: EUR)
//! - `TRADEPOST_CART_FILE` - Where the local cart is persisted
//!   (default: .tradepost/cart.json)
//! - `TRADEPOST_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 15)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use tradepost_core::{CurrencyCode, VatRate};

const DEFAULT_CART_FILE: &str = ".tradepost/cart.json";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront configuration.
///
/// Implements `Debug` manually to redact the API token.
#[derive(Clone)]
pub struct StorefrontConfig {
    /// Backend API settings
    pub api: ApiConfig,
    /// Bearer token handed over by the auth service, if signed in
    pub api_token: Option<SecretString>,
    /// VAT rate used for display totals
    pub vat_rate: VatRate,
    /// Display currency
    pub currency: CurrencyCode,
    /// Path of the persisted cart
    pub cart_file: PathBuf,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl std::fmt::Debug for StorefrontConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontConfig")
            .field("api", &self.api)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("vat_rate", &self.vat_rate)
            .field("currency", &self.currency)
            .field("cart_file", &self.cart_file)
            .field("sentry_dsn", &self.sentry_dsn)
            .field("sentry_environment", &self.sentry_environment)
            .finish()
    }
}

/// Backend API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL all endpoints are resolved against
    pub base_url: Url,
    /// Per-request timeout
    pub timeout: Duration,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = required(&lookup, "TRADEPOST_API_URL")?;
        let base_url = Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidEnvVar("TRADEPOST_API_URL".to_string(), e.to_string()))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEnvVar(
                "TRADEPOST_API_URL".to_string(),
                "must be an http(s) URL".to_string(),
            ));
        }

        let timeout_secs = optional(&lookup, "TRADEPOST_HTTP_TIMEOUT_SECS")
            .map(|v| {
                v.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidEnvVar("TRADEPOST_HTTP_TIMEOUT_SECS".to_string(), e.to_string())
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let vat_rate = optional(&lookup, "TRADEPOST_VAT_RATE")
            .map(|v| {
                v.parse::<VatRate>().map_err(|e| {
                    ConfigError::InvalidEnvVar("TRADEPOST_VAT_RATE".to_string(), e.to_string())
                })
            })
            .transpose()?
            .unwrap_or_default();

        let currency = optional(&lookup, "TRADEPOST_CURRENCY")
            .map(|v| {
                v.parse::<CurrencyCode>().map_err(|e| {
                    ConfigError::InvalidEnvVar("TRADEPOST_CURRENCY".to_string(), e.to_string())
                })
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            api: ApiConfig {
                base_url,
                timeout: Duration::from_secs(timeout_secs),
            },
            api_token: optional(&lookup, "TRADEPOST_API_TOKEN").map(SecretString::from),
            vat_rate,
            currency,
            cart_file: optional(&lookup, "TRADEPOST_CART_FILE")
                .map_or_else(|| PathBuf::from(DEFAULT_CART_FILE), PathBuf::from),
            sentry_dsn: optional(&lookup, "SENTRY_DSN"),
            sentry_environment: optional(&lookup, "SENTRY_ENVIRONMENT"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required variable.
fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    optional(lookup, key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional variable, treating blank values as unset.
fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}
