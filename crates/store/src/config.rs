//! Store configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `YORAA_API_BASE_URL` - Collections backend base URL. Without it every
//!   collection stays local.
//! - `YORAA_API_TOKEN` - Bearer token of the signed-in user (opaque)
//! - `YORAA_STORAGE_DIR` - Directory for the local mirror (default: .yoraa)
//! - `YORAA_TAX_RATE` - Cart tax rate as a fraction (default: 0.10)
//! - `YORAA_FREE_SHIPPING_THRESHOLD` - Subtotal above which shipping is free (default: 500)
//! - `YORAA_SHIPPING_FEE` - Flat shipping fee (default: 50)
//! - `YORAA_REQUEST_TIMEOUT_SECS` - Backend request timeout (default: 30)
//! - `YORAA_ERROR_BUFFER_CAPACITY` - Error monitor capacity (default: 50)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::collection::PricingPolicy;
use crate::mirror::{FileKv, KeyValueStore};
use crate::monitor::{DEFAULT_CAPACITY, ErrorMonitor};
use crate::remote::RemoteClient;
use crate::sync::{ServiceDeps, Session};

/// Values left over from a template `.env`, compared case-insensitively
/// against the whole token.
const PLACEHOLDER_TOKENS: &[&str] = &[
    "changeme",
    "placeholder",
    "token",
    "your-token",
    "your-api-token",
    "your_api_token",
    "xxx",
    "todo",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Collection store configuration.
///
/// Implements `Debug` manually to redact the API token.
#[derive(Clone)]
pub struct StoreConfig {
    /// Backend base URL, always ending in `/`
    pub api_base_url: Option<Url>,
    /// Bearer token for the signed-in user
    pub api_token: Option<SecretString>,
    /// Directory holding the local mirror files
    pub storage_dir: PathBuf,
    /// Cart tax and shipping rules
    pub pricing: PricingPolicy,
    /// Per-request timeout for backend calls
    pub request_timeout: Duration,
    /// Number of error records kept in memory
    pub error_buffer_capacity: usize,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("api_base_url", &self.api_base_url.as_ref().map(Url::as_str))
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("storage_dir", &self.storage_dir)
            .field("pricing", &self.pricing)
            .field("request_timeout", &self.request_timeout)
            .field("error_buffer_capacity", &self.error_buffer_capacity)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[REDACTED]"))
            .field("sentry_environment", &self.sentry_environment)
            .finish()
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is malformed or the API token is
    /// a template placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`StoreConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let api_base_url = env
            .optional("YORAA_API_BASE_URL")
            .map(|raw| parse_base_url("YORAA_API_BASE_URL", &raw))
            .transpose()?;
        let api_token = env
            .optional("YORAA_API_TOKEN")
            .map(|raw| validated_token("YORAA_API_TOKEN", &raw))
            .transpose()?;
        let storage_dir = PathBuf::from(env.or_default("YORAA_STORAGE_DIR", ".yoraa"));

        let defaults = PricingPolicy::default();
        let pricing = PricingPolicy {
            tax_rate: env.non_negative_decimal("YORAA_TAX_RATE", defaults.tax_rate)?,
            free_shipping_threshold: env.non_negative_decimal(
                "YORAA_FREE_SHIPPING_THRESHOLD",
                defaults.free_shipping_threshold,
            )?,
            shipping_fee: env.non_negative_decimal("YORAA_SHIPPING_FEE", defaults.shipping_fee)?,
        };

        let timeout_secs: u64 = env.positive("YORAA_REQUEST_TIMEOUT_SECS", 30)?;
        let error_buffer_capacity: usize =
            env.positive("YORAA_ERROR_BUFFER_CAPACITY", DEFAULT_CAPACITY)?;

        Ok(Self {
            api_base_url,
            api_token,
            storage_dir,
            pricing,
            request_timeout: Duration::from_secs(timeout_secs),
            error_buffer_capacity,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Session implied by the configured token.
    #[must_use]
    pub fn session(&self) -> Session {
        self.api_token
            .clone()
            .map_or_else(Session::anonymous, Session::authenticated)
    }

    /// Backend client, if a base URL is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn remote_client(&self) -> crate::Result<Option<RemoteClient>> {
        self.api_base_url
            .clone()
            .map(|url| RemoteClient::new(url, self.request_timeout))
            .transpose()
    }

    /// Wire up everything a [`CollectionService`](crate::sync::CollectionService) needs.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be created or the
    /// HTTP client cannot be built.
    pub fn service_deps(&self, monitor: Arc<ErrorMonitor>) -> crate::Result<ServiceDeps> {
        let storage: Arc<dyn KeyValueStore> = Arc::new(FileKv::open(&self.storage_dir)?);
        Ok(ServiceDeps {
            storage,
            remote: self.remote_client()?,
            session: self.session(),
            policy: self.pricing,
            monitor,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable source used while loading.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get an optional variable. Blank values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn non_negative_decimal(&self, key: &str, default: Decimal) -> Result<Decimal, ConfigError> {
        let Some(raw) = self.optional(key) else {
            return Ok(default);
        };
        let value = Decimal::from_str(raw.trim())
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "must not be negative".to_string(),
            ));
        }
        Ok(value)
    }

    fn positive<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.optional(key) else {
            return Ok(default);
        };
        let value = raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
        if value <= T::default() {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        Ok(value)
    }
}

/// Parse a backend base URL and make sure it ends in `/` so relative
/// endpoint paths join underneath it.
fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Check a bearer token before it is sent in an `Authorization` header.
///
/// Tokens are opaque, so only whole-value placeholders and embedded
/// whitespace are rejected.
fn validated_token(key: &str, raw: &str) -> Result<SecretString, ConfigError> {
    let token = raw.trim();
    if PLACEHOLDER_TOKENS
        .iter()
        .any(|placeholder| token.eq_ignore_ascii_case(placeholder))
    {
        return Err(ConfigError::InsecureSecret(
            key.to_string(),
            "is a template placeholder".to_string(),
        ));
    }
    if token.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must not contain whitespace".to_string(),
        ));
    }
    Ok(SecretString::from(token.to_string()))
}
