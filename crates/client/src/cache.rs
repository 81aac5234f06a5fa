//! Metadata-gated caches.
//!
//! A cache entry carries the server's `last_modified` timestamp alongside
//! the payload. Loaders probe the server's current timestamp with a narrow
//! query and only fetch the payload when [`should_refresh`] says so.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

use crate::store::{SessionStore, SessionStoreExt, StoreError};

/// Errors writing a cache entry.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache storage error: {0}")]
    Store(#[from] StoreError),
}

/// A cached payload and the server timestamp it was fetched at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached<T> {
    pub value: T,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Whether a cache stamped `cached` is stale against `server`.
///
/// | cached | server | refresh |
/// |--------|--------|---------|
/// | none   | any    | yes     |
/// | `c`    | `s > c`  | yes   |
/// | `c`    | `s <= c` | no    |
/// | `c`    | none   | no      |
#[must_use]
pub fn should_refresh(cached: Option<DateTime<Utc>>, server: Option<DateTime<Utc>>) -> bool {
    match (cached, server) {
        (None, _) => true,
        (Some(cached), Some(server)) => server > cached,
        (Some(_), None) => false,
    }
}

/// Storage for a single metadata-stamped value.
pub trait CacheStore<T>: Send + Sync {
    /// The cached entry, if any.
    fn get(&self) -> Option<Cached<T>>;

    /// Replace the cached entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the entry cannot be persisted.
    fn set(&self, value: T, last_modified: Option<DateTime<Utc>>) -> Result<(), CacheError>;

    /// Drop the cached entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the removal cannot be persisted.
    fn clear(&self) -> Result<(), CacheError>;

    /// Timestamp of the cached entry.
    fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.get().and_then(|c| c.last_modified)
    }

    /// Whether the entry is stale against the server's timestamp.
    ///
    /// An empty cache is always stale.
    fn should_refresh(&self, server: Option<DateTime<Utc>>) -> bool {
        match self.get() {
            None => true,
            Some(cached) => should_refresh(cached.last_modified, server),
        }
    }
}

// =============================================================================
// MemoryCache
// =============================================================================

/// In-process cache.
#[derive(Debug)]
pub struct MemoryCache<T> {
    entry: Mutex<Option<Cached<T>>>,
}

impl<T> Default for MemoryCache<T> {
    fn default() -> Self {
        Self {
            entry: Mutex::new(None),
        }
    }
}

impl<T> MemoryCache<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Clone + Send> CacheStore<T> for MemoryCache<T> {
    fn get(&self) -> Option<Cached<T>> {
        self.entry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, value: T, last_modified: Option<DateTime<Utc>>) -> Result<(), CacheError> {
        *self.entry.lock().unwrap_or_else(PoisonError::into_inner) = Some(Cached {
            value,
            last_modified,
        });
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        *self.entry.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

// =============================================================================
// StoredCache
// =============================================================================

/// Cache persisted through a [`SessionStore`].
///
/// The payload lives under `<prefix>cache` as JSON and the timestamp under
/// `<prefix>last_modified` as RFC 3339. A payload that no longer decodes
/// reads as absent, so the next load refetches it.
pub struct StoredCache<S: ?Sized, T> {
    store: Arc<S>,
    payload_key: String,
    stamp_key: String,
    _value: PhantomData<fn() -> T>,
}

impl<S: ?Sized, T> std::fmt::Debug for StoredCache<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCache")
            .field("payload_key", &self.payload_key)
            .field("stamp_key", &self.stamp_key)
            .finish_non_exhaustive()
    }
}

impl<S: ?Sized, T> StoredCache<S, T> {
    /// Cache under `<prefix>cache` and `<prefix>last_modified`.
    #[must_use]
    pub fn new(store: Arc<S>, prefix: &str) -> Self {
        Self {
            store,
            payload_key: format!("{prefix}cache"),
            stamp_key: format!("{prefix}last_modified"),
            _value: PhantomData,
        }
    }
}

impl<S, T> CacheStore<T> for StoredCache<S, T>
where
    S: SessionStore + ?Sized,
    T: Serialize + DeserializeOwned,
{
    fn get(&self) -> Option<Cached<T>> {
        let value = match self.store.get_json::<T>(&self.payload_key) {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %self.payload_key, error = %e, "Failed to read cache");
                return None;
            }
        };

        let last_modified = match self.store.get(&self.stamp_key) {
            Ok(Some(raw)) => DateTime::parse_from_rfc3339(&raw)
                .map(|ts| ts.with_timezone(&Utc))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(key = %self.stamp_key, error = %e, "Failed to read cache timestamp");
                None
            }
        };

        Some(Cached {
            value,
            last_modified,
        })
    }

    fn set(&self, value: T, last_modified: Option<DateTime<Utc>>) -> Result<(), CacheError> {
        self.store.set_json(&self.payload_key, &value)?;
        match last_modified {
            Some(ts) => self.store.set(&self.stamp_key, &ts.to_rfc3339())?,
            None => self.store.remove(&self.stamp_key)?,
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.store.remove(&self.payload_key)?;
        self.store.remove(&self.stamp_key)?;
        Ok(())
    }
}
