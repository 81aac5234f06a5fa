//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SUPABASE_URL` - Project URL (falls back to `VITE_SUPABASE_URL`)
//! - `SUPABASE_ANON_KEY` - Public anon key (falls back to `VITE_SUPABASE_ANON_KEY`)
//!
//! ## Optional
//! - `PRAYERLINE_REQUEST_TIMEOUT_MS` - Default REST timeout (default: 10000)
//! - `PRAYERLINE_STATE_FILE` - Persisted session/cache file (default: `.prayerline/state.json`)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Sentry event sample rate (default: 1.0)

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use tracing::warn;
use url::Url;

const DEFAULT_REQUEST_TIMEOUT_MS: &str = "10000";
const DEFAULT_STATE_FILE: &str = ".prayerline/state.json";
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
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

/// Full client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub supabase: SupabaseConfig,
    /// File backing the persisted session store and caches.
    pub state_file: PathBuf,
    pub sentry: SentryConfig,
}

/// Supabase project connection settings.
///
/// Implements `Debug` manually to redact the anon key.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project base URL (e.g. `https://abc.supabase.co`).
    pub url: Url,
    pub anon_key: SecretString,
    /// Default timeout for REST and function calls.
    pub request_timeout: Duration,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl SupabaseConfig {
    /// Create a configuration with the default request timeout.
    #[must_use]
    pub fn new(url: Url, anon_key: impl Into<String>) -> Self {
        Self {
            url,
            anon_key: SecretString::from(anon_key.into()),
            request_timeout: Duration::from_millis(10_000),
        }
    }

    /// `<url>/rest/v1/`, with the trailing slash table names join onto.
    #[must_use]
    pub fn rest_url(&self) -> Url {
        self.endpoint("rest/v1/")
    }

    /// `<url>/functions/v1/`, with the trailing slash function names join onto.
    #[must_use]
    pub fn functions_url(&self) -> Url {
        self.endpoint("functions/v1/")
    }

    fn endpoint(&self, suffix: &str) -> Url {
        let mut url = self.url.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base}/{suffix}"));
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    fn from_env() -> Result<Self, ConfigError> {
        let raw_url = get_env_with_fallback("SUPABASE_URL", "VITE_SUPABASE_URL")?;
        let url = parse_project_url(&raw_url)?;

        let anon_key = get_env_with_fallback("SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY")?;
        reject_placeholder(&anon_key, "SUPABASE_ANON_KEY")?;
        warn_on_low_entropy(&anon_key, "SUPABASE_ANON_KEY");

        let timeout_ms = get_env_or_default(
            "PRAYERLINE_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
        )
        .parse::<u64>()
        .map_err(|e| {
            ConfigError::InvalidEnvVar("PRAYERLINE_REQUEST_TIMEOUT_MS".to_string(), e.to_string())
        })?;

        Ok(Self {
            url,
            anon_key: SecretString::from(anon_key),
            request_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// Sentry error tracking settings.
#[derive(Debug, Clone, Default)]
pub struct SentryConfig {
    pub dsn: Option<String>,
    pub environment: Option<String>,
    pub sample_rate: f32,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, the project
    /// URL is not http(s), the timeout is not a number, or the anon key is
    /// a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let supabase = SupabaseConfig::from_env()?;
        let state_file = PathBuf::from(get_env_or_default(
            "PRAYERLINE_STATE_FILE",
            DEFAULT_STATE_FILE,
        ));
        let sentry = SentryConfig {
            dsn: get_optional_env("SENTRY_DSN").filter(|s| !s.is_empty()),
            environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sample_rate: get_optional_env("SENTRY_SAMPLE_RATE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
        };

        Ok(Self {
            supabase,
            state_file,
            sentry,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required variable, accepting the Vite-prefixed name as a fallback.
fn get_env_with_fallback(key: &str, fallback: &str) -> Result<String, ConfigError> {
    get_required_env(key)
        .or_else(|_| get_required_env(fallback))
        .map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse the project URL, accepting only http and https.
fn parse_project_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar("SUPABASE_URL".to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            "SUPABASE_URL".to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Reject values that look like a copied `.env.example` entry.
fn reject_placeholder(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();
    if lower.trim().is_empty() {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            "is empty".to_string(),
        ));
    }
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }
    Ok(())
}

/// Log a warning for a suspiciously uniform key.
///
/// The anon key ships to browsers, so low entropy only warns.
fn warn_on_low_entropy(secret: &str, var_name: &str) {
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        warn!(
            var = var_name,
            entropy = format!("{entropy:.2}"),
            "Key has low entropy; check that it was copied correctly"
        );
    }
}
