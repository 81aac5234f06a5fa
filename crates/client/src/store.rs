//! Persisted key/value session storage.
//!
//! Values are strings, as in browser local storage. Structured values go
//! through [`SessionStoreExt::get_json`] and [`SessionStoreExt::set_json`].
//! Two processes sharing a [`FileStore`] race on whole-file rewrites and the
//! later write wins.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

/// Keys under which session and cache state is persisted.
pub mod keys {
    /// Pending MFA code id returned by `send-verification-code`.
    pub const MFA_CODE_ID: &str = "mfa_code_id";
    /// Email the pending MFA code was sent to.
    pub const MFA_USER_EMAIL: &str = "mfa_user_email";
    /// Email of the validated admin session.
    pub const APPROVAL_ADMIN_EMAIL: &str = "approvalAdminEmail";
    /// `"true"` once the MFA code was verified.
    pub const APPROVAL_SESSION_VALIDATED: &str = "approvalSessionValidated";
    /// RFC 3339 timestamp of the successful verification.
    pub const ADMIN_SESSION_START: &str = "adminSessionStart";
    /// RFC 3339 timestamp of the last recorded user activity.
    pub const ADMIN_LAST_ACTIVITY: &str = "adminLastActivity";
    /// Cached [`TimeoutSettings`](prayerline_core::TimeoutSettings) JSON.
    pub const ADMIN_TIMEOUT_SETTINGS: &str = "adminTimeoutSettings";
    /// Key prefix of the persisted branding cache.
    pub const BRANDING_PREFIX: &str = "branding_";

    /// Markers of a validated admin session, cleared on logout or expiry.
    pub const SESSION_MARKERS: &[&str] = &[
        APPROVAL_ADMIN_EMAIL,
        APPROVAL_SESSION_VALIDATED,
        ADMIN_SESSION_START,
        ADMIN_LAST_ACTIVITY,
    ];
}

/// Errors reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// String key/value storage that survives restarts.
pub trait SessionStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing storage cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing storage cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Typed helpers over any [`SessionStore`].
pub trait SessionStoreExt: SessionStore {
    /// Read and decode a JSON value.
    ///
    /// A value that fails to decode is logged and read as absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing storage cannot be read.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable stored value");
                Ok(None)
            }
        }
    }

    /// Encode and write a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on encode or write failure.
    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }

    /// Remove several keys.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`] hit.
    fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

impl<S: SessionStore + ?Sized> SessionStoreExt for S {}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-process store. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// Store backed by a single JSON object on disk.
///
/// The file is read once on open and rewritten in full on every write
/// through a sibling temp file and a rename. A missing file is an empty
/// store.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file exists but cannot be read. A file
    /// that is not valid JSON is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "State file is corrupt, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        debug!(path = %path.display(), entries = entries.len(), "Opened state file");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let raw = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        let mut file = std::fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(&raw).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}
