//! Admin session bookkeeping.
//!
//! Tracks the signed-in admin, last user activity and blocked status, and
//! persists the session markers through a [`SessionStore`] so a session
//! survives restarts until it times out.
//!
//! # Session lifecycle
//!
//! ```text
//! send_mfa_code -> verify_mfa_code -> [admin session]
//!                                       |-- record_activity (any input)
//!                                       |-- check_inactivity (periodic) -> expired
//!                                       |-- check_blocked_status (throttled) -> blocked
//!                                       `-- logout
//! ```

mod error;
mod mfa;

pub use error::AuthError;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use moka::future::Cache;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::backend::Backend;
use crate::clock::Clock;
use crate::settings::TimeoutSettingsLoader;
use crate::store::{SessionStore, SessionStoreExt, keys};
use crate::supabase::QueryOptions;

/// Minimum spacing between blocked-status queries, in seconds.
pub const BLOCKED_CHECK_INTERVAL_SECS: i64 = 60;

/// How long admin lookups stay cached.
const ADMIN_CACHE_TTL: Duration = Duration::from_secs(300);

const SUBSCRIBERS_TABLE: &str = "email_subscribers";

/// Published authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    /// Signed-in email, if any.
    pub email: Option<String>,
    pub is_admin: bool,
    /// Set when the last blocked-status check found the account blocked.
    pub blocked: bool,
}

/// User input that counts as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    MouseDown,
    KeyDown,
    Scroll,
    TouchStart,
}

/// Result of [`AdminAuth::check_inactivity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactivityOutcome {
    /// The admin was active within the timeout.
    Active,
    /// The timeout passed; admin markers were cleared.
    Expired,
    /// No admin session to time out.
    NotAdmin,
}

/// Result of [`AdminAuth::check_blocked_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockedCheck {
    /// Nobody is signed in.
    NoSession,
    /// A check ran within the last minute; no query was made.
    Throttled,
    /// The account is not blocked.
    Clear,
    /// The account is blocked and was signed out.
    Blocked { redirect: String },
    /// The query failed; the session is left alone.
    CheckFailed,
}

#[derive(Debug)]
struct Activity {
    last_activity: DateTime<Utc>,
    last_blocked_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct BlockedRow {
    #[serde(default)]
    is_blocked: bool,
}

/// Admin authentication and session timeout tracking.
pub struct AdminAuth<B> {
    backend: Arc<B>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    settings: TimeoutSettingsLoader<B>,
    admin_cache: Cache<String, bool>,
    activity: Mutex<Activity>,
    state: watch::Sender<AuthState>,
}

impl<B> std::fmt::Debug for AdminAuth<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<B: Backend> AdminAuth<B> {
    /// Create a signed-out tracker.
    ///
    /// Call [`restore_session`](Self::restore_session) to pick up a
    /// persisted session.
    #[must_use]
    pub fn new(backend: Arc<B>, store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        let admin_cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(ADMIN_CACHE_TTL)
            .build();
        let (state, _) = watch::channel(AuthState::default());
        let now = clock.now();

        Self {
            settings: TimeoutSettingsLoader::new(backend.clone(), store.clone()),
            backend,
            store,
            clock,
            admin_cache,
            activity: Mutex::new(Activity {
                last_activity: now,
                last_blocked_check: None,
            }),
            state,
        }
    }

    /// Watch the authentication state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// The current authentication state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Timeout settings loader shared with the session checks.
    #[must_use]
    pub const fn settings(&self) -> &TimeoutSettingsLoader<B> {
        &self.settings
    }

    /// Time of the last recorded activity.
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.activity().last_activity
    }

    /// Fail unless a validated admin session is active.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AdminRequired`] otherwise.
    pub fn require_admin(&self) -> Result<String, AuthError> {
        let state = self.state.borrow();
        match (&state.email, state.is_admin) {
            (Some(email), true) => Ok(email.clone()),
            _ => Err(AuthError::AdminRequired),
        }
    }

    /// Record user input, restarting the inactivity window.
    pub fn record_activity(&self, event: ActivityEvent) {
        let now = self.clock.now();
        self.touch(now);
        if self.state.borrow().is_admin
            && let Err(e) = self.store.set(keys::ADMIN_LAST_ACTIVITY, &now.to_rfc3339())
        {
            warn!(error = %e, "Failed to persist last activity");
        }
        debug!(?event, "Activity recorded");
    }

    /// Expire the admin session if the inactivity window has passed.
    ///
    /// Only the admin flag and session markers are cleared; the signed-in
    /// email stays.
    pub fn check_inactivity(&self) -> InactivityOutcome {
        if !self.state.borrow().is_admin {
            return InactivityOutcome::NotAdmin;
        }

        let timeout = self.settings.load().inactivity_timeout();
        let idle = self.clock.now() - self.last_activity();
        if idle <= timeout {
            return InactivityOutcome::Active;
        }

        info!(
            idle_minutes = idle.num_minutes(),
            timeout_minutes = timeout.num_minutes(),
            "Admin session expired after inactivity"
        );
        if let Err(e) = self.store.remove_all(keys::SESSION_MARKERS) {
            warn!(error = %e, "Failed to clear session markers");
        }
        self.state.send_modify(|state| state.is_admin = false);
        InactivityOutcome::Expired
    }

    /// Run [`check_inactivity`](Self::check_inactivity) every `period`
    /// until the task is aborted.
    pub fn spawn_inactivity_monitor(self: &Arc<Self>, period: Duration) -> JoinHandle<()>
    where
        B: 'static,
    {
        let auth = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if auth.check_inactivity() == InactivityOutcome::Expired {
                    debug!("Inactivity monitor expired the admin session");
                }
            }
        })
    }

    /// Check whether the signed-in account has been blocked.
    ///
    /// At most one query runs per minute; the window starts before the
    /// query, so calls made while one is in flight are throttled too.
    /// Query failures are logged and otherwise ignored.
    #[instrument(skip(self))]
    pub async fn check_blocked_status(&self, return_url: &str) -> BlockedCheck {
        let Some(email) = self.state.borrow().email.clone() else {
            return BlockedCheck::NoSession;
        };

        let now = self.clock.now();
        {
            let mut activity = self.activity();
            if activity
                .last_blocked_check
                .is_some_and(|last| now - last < TimeDelta::seconds(BLOCKED_CHECK_INTERVAL_SECS))
            {
                return BlockedCheck::Throttled;
            }
            activity.last_blocked_check = Some(now);
        }

        let options = QueryOptions::new()
            .select("is_blocked")
            .eq("email", &email)
            .limit(1);
        let row = match self
            .backend
            .select_one::<BlockedRow>(SUBSCRIBERS_TABLE, &options)
            .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!(error = %e, "Blocked status check failed");
                return BlockedCheck::CheckFailed;
            }
        };

        if !row.is_some_and(|r| r.is_blocked) {
            return BlockedCheck::Clear;
        }

        warn!("Signed-in account is blocked, signing out");
        if let Err(e) = self.logout() {
            warn!(error = %e, "Failed to clear session for blocked account");
        }
        self.state.send_modify(|state| state.blocked = true);

        let encoded: String = url::form_urlencoded::byte_serialize(return_url.as_bytes()).collect();
        BlockedCheck::Blocked {
            redirect: format!("/login?blocked=true&returnUrl={encoded}"),
        }
    }

    /// Rehydrate a persisted session.
    ///
    /// The session is restored only if it was validated and the later of
    /// its start and its last recorded activity is within the inactivity
    /// timeout. Otherwise all markers are cleared.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the store cannot be read or the admin
    /// lookup fails.
    #[instrument(skip(self))]
    pub async fn restore_session(&self) -> Result<AuthState, AuthError> {
        let validated = self
            .store
            .get(keys::APPROVAL_SESSION_VALIDATED)?
            .is_some_and(|v| v == "true");
        let email = self.store.get(keys::APPROVAL_ADMIN_EMAIL)?;
        let started = self.read_timestamp(keys::ADMIN_SESSION_START)?;

        let (true, Some(email), Some(started)) = (validated, email, started) else {
            self.store.remove_all(keys::SESSION_MARKERS)?;
            self.publish(AuthState::default());
            return Ok(AuthState::default());
        };

        let last_active = self
            .read_timestamp(keys::ADMIN_LAST_ACTIVITY)?
            .map_or(started, |ts| ts.max(started));
        let timeout = self.settings.load().inactivity_timeout();
        if self.clock.now() - last_active > timeout {
            info!("Persisted admin session has expired");
            self.store.remove_all(keys::SESSION_MARKERS)?;
            self.publish(AuthState::default());
            return Ok(AuthState::default());
        }

        let is_admin = self.is_admin_email(&email).await?;
        self.touch(last_active);
        let state = AuthState {
            email: Some(email),
            is_admin,
            blocked: false,
        };
        self.publish(state.clone());
        debug!(is_admin, "Admin session restored");

        Ok(state)
    }

    /// Sign out, clearing every session marker and any pending code.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Store`] if the markers cannot be removed.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.store.remove_all(keys::SESSION_MARKERS)?;
        self.store
            .remove_all(&[keys::MFA_CODE_ID, keys::MFA_USER_EMAIL])?;
        self.publish(AuthState::default());
        info!("Signed out");
        Ok(())
    }

    /// Whether `email` belongs to an admin subscriber.
    ///
    /// Answers are cached for five minutes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Backend`] if the lookup fails.
    pub async fn is_admin_email(&self, email: &str) -> Result<bool, AuthError> {
        let key = email.trim().to_lowercase();
        if let Some(is_admin) = self.admin_cache.get(&key).await {
            debug!("Admin lookup cache hit");
            return Ok(is_admin);
        }

        let options = QueryOptions::new()
            .select("email")
            .eq("email", &key)
            .eq("is_admin", true)
            .limit(1);
        let row: Option<serde_json::Value> =
            self.backend.select_one(SUBSCRIBERS_TABLE, &options).await?;
        let is_admin = row.is_some();

        self.admin_cache.insert(key, is_admin).await;
        Ok(is_admin)
    }

    fn activity(&self) -> std::sync::MutexGuard<'_, Activity> {
        self.activity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self, at: DateTime<Utc>) {
        self.activity().last_activity = at;
    }

    fn publish(&self, state: AuthState) {
        self.state.send_replace(state);
    }

    fn read_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>, AuthError> {
        Ok(self
            .store
            .get(key)?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|ts| ts.with_timezone(&Utc)))
    }
}
