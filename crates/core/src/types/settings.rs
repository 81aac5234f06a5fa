//! The singleton `admin_settings` row and the views cut from it.
//!
//! `branding_last_modified` is only a cache-invalidation signal. It is not
//! a version vector: two admins saving branding concurrently both win in
//! turn, and the later write stands.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default application title shown before branding is configured.
pub const DEFAULT_APP_TITLE: &str = "Church Prayer Manager";

/// Default subtitle shown before branding is configured.
pub const DEFAULT_APP_SUBTITLE: &str = "Keeping our community connected in prayer";

/// Default inactivity window for admin sessions, in minutes.
pub const DEFAULT_INACTIVITY_TIMEOUT_MINUTES: u32 = 30;

/// The full settings row (`id = 1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminSettings {
    pub id: i32,
    #[serde(flatten)]
    pub branding: Branding,
    #[serde(default)]
    pub email_notifications_enabled: bool,
    #[serde(default)]
    pub reminder_interval_days: Option<u32>,
    #[serde(flatten)]
    pub timeouts: TimeoutSettings,
}

/// Branding columns of the settings row.
///
/// Logo blobs are `data:` URLs and can be large, which is why loaders
/// probe `branding_last_modified` before fetching this payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branding {
    #[serde(default = "default_title")]
    pub app_title: String,
    #[serde(default = "default_subtitle")]
    pub app_subtitle: String,
    #[serde(default)]
    pub use_logo: bool,
    #[serde(default)]
    pub light_mode_logo_blob: Option<String>,
    #[serde(default)]
    pub dark_mode_logo_blob: Option<String>,
    #[serde(default)]
    pub branding_last_modified: Option<DateTime<Utc>>,
}

impl Branding {
    /// Comma-separated column list for a full branding fetch.
    pub const COLUMNS: &'static str = "app_title,app_subtitle,use_logo,light_mode_logo_blob,dark_mode_logo_blob,branding_last_modified";

    /// Logo for the requested theme, if logos are enabled and present.
    ///
    /// Falls back to the other theme's logo when only one is uploaded.
    #[must_use]
    pub fn logo(&self, dark_mode: bool) -> Option<&str> {
        if !self.use_logo {
            return None;
        }
        let (preferred, fallback) = if dark_mode {
            (&self.dark_mode_logo_blob, &self.light_mode_logo_blob)
        } else {
            (&self.light_mode_logo_blob, &self.dark_mode_logo_blob)
        };
        preferred
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| fallback.as_deref().filter(|s| !s.is_empty()))
    }
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            app_title: default_title(),
            app_subtitle: default_subtitle(),
            use_logo: false,
            light_mode_logo_blob: None,
            dark_mode_logo_blob: None,
            branding_last_modified: None,
        }
    }
}

fn default_title() -> String {
    DEFAULT_APP_TITLE.to_string()
}

fn default_subtitle() -> String {
    DEFAULT_APP_SUBTITLE.to_string()
}

/// Session timeout columns of the settings row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_minutes: u32,
    #[serde(default)]
    pub require_site_login: bool,
}

impl TimeoutSettings {
    /// Comma-separated column list for a timeout settings fetch.
    pub const COLUMNS: &'static str = "inactivity_timeout_minutes,require_site_login";

    /// The inactivity window as a duration.
    #[must_use]
    pub fn inactivity_timeout(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::minutes(i64::from(self.inactivity_timeout_minutes))
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            inactivity_timeout_minutes: DEFAULT_INACTIVITY_TIMEOUT_MINUTES,
            require_site_login: false,
        }
    }
}

const fn default_inactivity_timeout() -> u32 {
    DEFAULT_INACTIVITY_TIMEOUT_MINUTES
}

/// Errors decoding a logo `data:` URL.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LogoError {
    /// The value does not start with `data:`.
    #[error("logo is not a data URL")]
    NotDataUrl,
    /// The data URL is not base64-encoded.
    #[error("logo data URL is not base64-encoded")]
    NotBase64,
    /// The base64 payload is malformed.
    #[error("invalid base64 payload: {0}")]
    Decode(String),
}

/// A decoded logo image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoBlob {
    /// MIME type from the data URL (e.g. `image/png`).
    pub mime_type: String,
    /// Raw image bytes.
    pub bytes: Vec<u8>,
}

impl LogoBlob {
    /// Decode a `data:<mime>;base64,<payload>` URL.
    ///
    /// # Errors
    ///
    /// Returns [`LogoError`] if the value is not a base64 data URL or the
    /// payload does not decode.
    pub fn decode(data_url: &str) -> Result<Self, LogoError> {
        let rest = data_url
            .strip_prefix("data:")
            .ok_or(LogoError::NotDataUrl)?;
        let (meta, payload) = rest.split_once(',').ok_or(LogoError::NotDataUrl)?;
        let mime_type = meta
            .strip_suffix(";base64")
            .ok_or(LogoError::NotBase64)?;

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| LogoError::Decode(e.to_string()))?;

        Ok(Self {
            mime_type: if mime_type.is_empty() {
                "application/octet-stream".to_string()
            } else {
                mime_type.to_string()
            },
            bytes,
        })
    }

    /// File extension matching the MIME type.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/gif" => "gif",
            "image/svg+xml" => "svg",
            "image/webp" => "webp",
            _ => "bin",
        }
    }
}
