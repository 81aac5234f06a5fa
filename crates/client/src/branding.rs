//! Branding loader with metadata-gated refresh.
//!
//! Logo blobs make the branding payload large, so a refresh first probes
//! the settings row for `branding_last_modified` and only fetches the full
//! payload when the server's stamp is newer than the cached one.
//!
//! ```text
//! load_cached()  -> publish cache (or defaults) immediately
//! refresh()      -> probe -> [stale] -> fetch -> cache + publish
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use prayerline_core::{ADMIN_SETTINGS_ID, Branding};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::backend::Backend;
use crate::cache::CacheStore;
use crate::clock::Clock;
use crate::supabase::{MutationOptions, QueryOptions, RestError};

const SETTINGS_TABLE: &str = "admin_settings";

/// Result of [`BrandingLoader::refresh`].
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// The cached payload matches the server stamp; only the probe ran.
    UpToDate,
    /// A newer payload was fetched, cached and published.
    Refreshed,
    /// The probe failed; the cached payload stays published.
    ProbeFailed(RestError),
    /// The probe asked for a refresh but the fetch failed.
    FetchFailed(RestError),
    /// The settings row does not exist; defaults stay published.
    NoSettings,
}

#[derive(Debug, Deserialize)]
struct BrandingStamp {
    #[serde(default)]
    branding_last_modified: Option<DateTime<Utc>>,
}

/// Loads branding for display and keeps the published copy current.
pub struct BrandingLoader<B> {
    backend: Arc<B>,
    cache: Arc<dyn CacheStore<Branding>>,
    clock: Arc<dyn Clock>,
    tx: watch::Sender<Branding>,
}

impl<B> std::fmt::Debug for BrandingLoader<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrandingLoader")
            .field("app_title", &self.tx.borrow().app_title)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> BrandingLoader<B> {
    /// Create a loader publishing the default branding until loaded.
    #[must_use]
    pub fn new(backend: Arc<B>, cache: Arc<dyn CacheStore<Branding>>, clock: Arc<dyn Clock>) -> Self {
        let (tx, _) = watch::channel(Branding::default());
        Self {
            backend,
            cache,
            clock,
            tx,
        }
    }

    /// Watch the published branding.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Branding> {
        self.tx.subscribe()
    }

    /// The currently published branding.
    #[must_use]
    pub fn current(&self) -> Branding {
        self.tx.borrow().clone()
    }

    /// Publish the cached branding, or the defaults, without any I/O
    /// beyond the cache itself.
    pub fn load_cached(&self) -> Branding {
        let branding = match self.cache.get() {
            Some(cached) => {
                debug!(last_modified = ?cached.last_modified, "Branding cache hit");
                cached.value
            }
            None => {
                debug!("Branding cache miss, using defaults");
                Branding::default()
            }
        };
        self.tx.send_replace(branding.clone());
        branding
    }

    /// Probe the server stamp and refetch the payload if it is newer.
    ///
    /// Failures never clear the published branding.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> RefreshOutcome {
        let probe = QueryOptions::new()
            .select("branding_last_modified")
            .eq("id", ADMIN_SETTINGS_ID)
            .limit(1);

        let server_stamp = match self
            .backend
            .select_one::<BrandingStamp>(SETTINGS_TABLE, &probe)
            .await
        {
            Ok(row) => row.and_then(|r| r.branding_last_modified),
            Err(e) => {
                warn!(error = %e, "Branding probe failed, keeping cached branding");
                return RefreshOutcome::ProbeFailed(e);
            }
        };

        if !self.cache.should_refresh(server_stamp) {
            debug!(?server_stamp, "Branding cache is current");
            return RefreshOutcome::UpToDate;
        }

        let fetch = QueryOptions::new()
            .select(Branding::COLUMNS)
            .eq("id", ADMIN_SETTINGS_ID)
            .limit(1);

        match self
            .backend
            .select_one::<Branding>(SETTINGS_TABLE, &fetch)
            .await
        {
            Ok(Some(branding)) => {
                let stamp = branding.branding_last_modified.or(server_stamp);
                if let Err(e) = self.cache.set(branding.clone(), stamp) {
                    warn!(error = %e, "Failed to write branding cache");
                }
                info!(app_title = %branding.app_title, "Branding refreshed");
                self.tx.send_replace(branding);
                RefreshOutcome::Refreshed
            }
            Ok(None) => {
                warn!("Settings row missing, keeping default branding");
                RefreshOutcome::NoSettings
            }
            Err(e) => {
                warn!(error = %e, "Branding fetch failed, keeping cached branding");
                RefreshOutcome::FetchFailed(e)
            }
        }
    }

    /// Save branding to the settings row and publish it.
    ///
    /// Stamps `branding_last_modified` with the current time so other
    /// clients refetch. Concurrent saves are last-write-wins. Returns
    /// `Ok(None)` when there is no settings row to update.
    ///
    /// # Errors
    ///
    /// Returns [`RestError`] if the update fails. The cache and published
    /// branding are left untouched on error or when no row was updated.
    #[instrument(skip(self, branding), fields(app_title = %branding.app_title))]
    pub async fn save(&self, mut branding: Branding) -> Result<Option<Branding>, RestError> {
        let now = self.clock.now();
        branding.branding_last_modified = Some(now);

        let body = serde_json::to_value(&branding).map_err(|e| RestError::Parse(e.to_string()))?;
        let options = MutationOptions::update(body)
            .eq("id", ADMIN_SETTINGS_ID)
            .returning();
        let updated: Option<Value> = self.backend.mutate_one(SETTINGS_TABLE, &options).await?;
        if updated.is_none() {
            warn!("Settings row missing, branding not saved");
            return Ok(None);
        }

        if let Err(e) = self.cache.set(branding.clone(), Some(now)) {
            warn!(error = %e, "Failed to write branding cache");
        }
        self.tx.send_replace(branding.clone());
        info!("Branding saved");

        Ok(Some(branding))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::fake::{FakeBackend, ManualClock};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn settings_row(title: &str, stamp: &str) -> serde_json::Value {
        json!({
            "id": 1,
            "app_title": title,
            "app_subtitle": "Sub",
            "use_logo": false,
            "branding_last_modified": stamp,
        })
    }

    fn loader(
        backend: Arc<FakeBackend>,
        cache: Arc<MemoryCache<Branding>>,
    ) -> BrandingLoader<FakeBackend> {
        BrandingLoader::new(backend, cache, Arc::new(ManualClock::new(day(10))))
    }

    fn cached(title: &str, stamp: DateTime<Utc>) -> Arc<MemoryCache<Branding>> {
        let cache = Arc::new(MemoryCache::new());
        cache
            .set(
                Branding {
                    app_title: title.to_string(),
                    ..Branding::default()
                },
                Some(stamp),
            )
            .unwrap();
        cache
    }

    #[test]
    fn test_load_cached_publishes_defaults_when_empty() {
        let loader = loader(Arc::new(FakeBackend::new()), Arc::new(MemoryCache::new()));
        let branding = loader.load_cached();
        assert_eq!(branding, Branding::default());
        assert_eq!(loader.current(), Branding::default());
    }

    #[tokio::test]
    async fn test_newer_server_stamp_triggers_fetch() {
        let backend = Arc::new(
            FakeBackend::new()
                .with_table("admin_settings", vec![settings_row("X", "2024-01-02T00:00:00Z")]),
        );
        let loader = loader(backend.clone(), cached("Old", day(1)));
        let rx = loader.subscribe();

        assert_eq!(loader.load_cached().app_title, "Old");
        let outcome = loader.refresh().await;

        assert!(matches!(outcome, RefreshOutcome::Refreshed));
        assert_eq!(backend.call_count(), 2);
        assert_eq!(rx.borrow().app_title, "X");
    }

    #[tokio::test]
    async fn test_equal_stamp_skips_fetch() {
        let backend = Arc::new(
            FakeBackend::new()
                .with_table("admin_settings", vec![settings_row("X", "2024-01-01T00:00:00Z")]),
        );
        let loader = loader(backend.clone(), cached("Old", day(1)));
        loader.load_cached();

        assert!(matches!(loader.refresh().await, RefreshOutcome::UpToDate));
        assert_eq!(backend.call_count(), 1);
        assert_eq!(loader.current().app_title, "Old");
    }

    #[tokio::test]
    async fn test_empty_cache_fetches() {
        let backend = Arc::new(
            FakeBackend::new()
                .with_table("admin_settings", vec![settings_row("Grace", "2024-01-01T00:00:00Z")]),
        );
        let cache = Arc::new(MemoryCache::new());
        let loader = loader(backend.clone(), cache.clone());

        assert!(matches!(loader.refresh().await, RefreshOutcome::Refreshed));
        assert_eq!(cache.last_modified(), Some(day(1)));
        assert_eq!(loader.current().app_title, "Grace");
    }

    #[tokio::test]
    async fn test_probe_failure_keeps_cache_without_fetch() {
        let backend = Arc::new(
            FakeBackend::new()
                .with_table("admin_settings", vec![settings_row("X", "2024-01-02T00:00:00Z")]),
        );
        backend.push_error("admin_settings", RestError::Network("offline".to_string()));
        let loader = loader(backend.clone(), cached("Old", day(1)));
        loader.load_cached();

        assert!(matches!(
            loader.refresh().await,
            RefreshOutcome::ProbeFailed(RestError::Network(_))
        ));
        assert_eq!(backend.call_count(), 1);
        assert_eq!(loader.current().app_title, "Old");
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_cache() {
        let backend = Arc::new(
            FakeBackend::new()
                .with_table("admin_settings", vec![settings_row("X", "2024-01-02T00:00:00Z")]),
        );
        backend.push_ok("admin_settings");
        backend.push_error(
            "admin_settings",
            RestError::QueryTimeout {
                table: "admin_settings".to_string(),
                after: std::time::Duration::from_secs(10),
            },
        );
        let cache = cached("Old", day(1));
        let loader = loader(backend.clone(), cache.clone());
        loader.load_cached();

        assert!(matches!(loader.refresh().await, RefreshOutcome::FetchFailed(_)));
        assert_eq!(backend.call_count(), 2);
        assert_eq!(loader.current().app_title, "Old");
        assert_eq!(cache.last_modified(), Some(day(1)));
    }

    #[tokio::test]
    async fn test_missing_row_keeps_defaults() {
        let backend = Arc::new(FakeBackend::new().with_table("admin_settings", vec![]));
        let loader = loader(backend, Arc::new(MemoryCache::new()));
        assert!(matches!(loader.refresh().await, RefreshOutcome::NoSettings));
        assert_eq!(loader.current(), Branding::default());
    }

    #[tokio::test]
    async fn test_save_stamps_and_publishes() {
        let backend = Arc::new(
            FakeBackend::new()
                .with_table("admin_settings", vec![settings_row("Old", "2024-01-01T00:00:00Z")]),
        );
        let cache = Arc::new(MemoryCache::new());
        let loader = loader(backend.clone(), cache.clone());

        let saved = loader
            .save(Branding {
                app_title: "New".to_string(),
                ..Branding::default()
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(saved.branding_last_modified, Some(day(10)));
        assert_eq!(cache.last_modified(), Some(day(10)));
        assert_eq!(loader.current().app_title, "New");
        let row = backend.rows("admin_settings");
        assert_eq!(row.first().unwrap()["app_title"], json!("New"));
    }

    #[tokio::test]
    async fn test_save_without_settings_row_publishes_nothing() {
        let backend = Arc::new(FakeBackend::new().with_table("admin_settings", vec![]));
        let cache = Arc::new(MemoryCache::new());
        let loader = loader(backend, cache.clone());

        let saved = loader
            .save(Branding {
                app_title: "New".to_string(),
                ..Branding::default()
            })
            .await
            .unwrap();

        assert_eq!(saved, None);
        assert_eq!(cache.last_modified(), None);
        assert_eq!(loader.current(), Branding::default());
    }
}
