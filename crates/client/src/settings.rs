//! Cached session timeout settings.

use std::sync::Arc;

use prayerline_core::{ADMIN_SETTINGS_ID, TimeoutSettings};
use tracing::{debug, instrument, warn};

use crate::backend::Backend;
use crate::store::{SessionStore, SessionStoreExt, keys};
use crate::supabase::QueryOptions;

/// Loads [`TimeoutSettings`] from the settings row and caches them in the
/// session store under `adminTimeoutSettings`.
pub struct TimeoutSettingsLoader<B> {
    backend: Arc<B>,
    store: Arc<dyn SessionStore>,
}

impl<B> std::fmt::Debug for TimeoutSettingsLoader<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutSettingsLoader").finish_non_exhaustive()
    }
}

impl<B: Backend> TimeoutSettingsLoader<B> {
    #[must_use]
    pub fn new(backend: Arc<B>, store: Arc<dyn SessionStore>) -> Self {
        Self { backend, store }
    }

    /// Cached settings, or the defaults when nothing usable is cached.
    #[must_use]
    pub fn load(&self) -> TimeoutSettings {
        match self.store.get_json(keys::ADMIN_TIMEOUT_SETTINGS) {
            Ok(Some(settings)) => settings,
            Ok(None) => TimeoutSettings::default(),
            Err(e) => {
                warn!(error = %e, "Failed to read cached timeout settings");
                TimeoutSettings::default()
            }
        }
    }

    /// Fetch the settings from the server and overwrite the cache.
    ///
    /// On failure the cached (or default) settings are returned unchanged.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> TimeoutSettings {
        let options = QueryOptions::new()
            .select(TimeoutSettings::COLUMNS)
            .eq("id", ADMIN_SETTINGS_ID)
            .limit(1);

        match self
            .backend
            .select_one::<TimeoutSettings>("admin_settings", &options)
            .await
        {
            Ok(Some(settings)) => {
                if let Err(e) = self.store.set_json(keys::ADMIN_TIMEOUT_SETTINGS, &settings) {
                    warn!(error = %e, "Failed to cache timeout settings");
                }
                debug!(
                    inactivity_timeout_minutes = settings.inactivity_timeout_minutes,
                    require_site_login = settings.require_site_login,
                    "Timeout settings refreshed"
                );
                settings
            }
            Ok(None) => {
                debug!("No settings row, keeping cached timeout settings");
                self.load()
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh timeout settings");
                self.load()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fake::FakeBackend;
    use crate::store::MemoryStore;
    use crate::supabase::RestError;

    fn loader(backend: FakeBackend) -> (TimeoutSettingsLoader<FakeBackend>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (TimeoutSettingsLoader::new(Arc::new(backend), store.clone()), store)
    }

    #[test]
    fn test_load_defaults_when_empty() {
        let (loader, _) = loader(FakeBackend::new());
        assert_eq!(loader.load(), TimeoutSettings::default());
    }

    #[tokio::test]
    async fn test_refresh_overwrites_cache() {
        let backend = FakeBackend::new().with_table(
            "admin_settings",
            vec![json!({"id": 1, "inactivity_timeout_minutes": 5, "require_site_login": true})],
        );
        let (loader, store) = loader(backend);

        let settings = loader.refresh().await;
        assert_eq!(settings.inactivity_timeout_minutes, 5);
        assert!(settings.require_site_login);
        assert!(store.get(keys::ADMIN_TIMEOUT_SETTINGS).unwrap().is_some());
        assert_eq!(loader.load(), settings);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_cache() {
        let backend = FakeBackend::new().with_table("admin_settings", vec![]);
        backend.push_error("admin_settings", RestError::Network("offline".to_string()));
        let (loader, store) = loader(backend);
        store
            .set_json(
                keys::ADMIN_TIMEOUT_SETTINGS,
                &TimeoutSettings {
                    inactivity_timeout_minutes: 12,
                    require_site_login: false,
                },
            )
            .unwrap();

        let settings = loader.refresh().await;
        assert_eq!(settings.inactivity_timeout_minutes, 12);
    }
}
