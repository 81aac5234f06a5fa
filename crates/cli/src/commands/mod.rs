//! CLI command implementations.
//!
//! Every command runs against a [`Context`] built once from
//! [`ClientConfig`]. Admin-only commands go through [`Context::admin`],
//! which restores the persisted session and checks it is still valid.

pub mod auth;
pub mod branding;
pub mod planning_center;
pub mod prayers;

use std::sync::Arc;

use prayerline_client::auth::{ActivityEvent, BlockedCheck};
use prayerline_client::services::{PlanningCenterError, PrayerError, PrayerService};
use prayerline_client::{
    AdminAuth, AuthError, Clock, ClientConfig, FileStore, RestError, SessionStore, StoreError,
    SupabaseClient, SystemClock,
};
use prayerline_core::{EmailError, LogoError};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Rest(#[from] RestError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Prayer(#[from] PrayerError),

    #[error(transparent)]
    PlanningCenter(#[from] PlanningCenterError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("Invalid logo: {0}")]
    Logo(#[from] LogoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Branding has no logo for the requested theme.
    #[error("No logo is configured")]
    NoLogo,

    /// The signed-in account was blocked and has been signed out.
    #[error("This account has been blocked")]
    Blocked,
}

/// Shared handles for one CLI invocation.
pub struct Context {
    pub backend: Arc<SupabaseClient>,
    pub store: Arc<dyn SessionStore>,
    pub clock: Arc<dyn Clock>,
    pub auth: AdminAuth<SupabaseClient>,
}

impl Context {
    /// Build the client, open the state file and set up session tracking.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the state
    /// file cannot be opened.
    pub fn new(config: &ClientConfig) -> Result<Self, CommandError> {
        let backend = Arc::new(SupabaseClient::new(&config.supabase)?);
        let store: Arc<dyn SessionStore> = Arc::new(FileStore::open(&config.state_file)?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let auth = AdminAuth::new(backend.clone(), store.clone(), clock.clone());

        tracing::debug!(state_file = %config.state_file.display(), "Context ready");

        Ok(Self {
            backend,
            store,
            clock,
            auth,
        })
    }

    #[must_use]
    pub fn prayers(&self) -> PrayerService<SupabaseClient> {
        PrayerService::new(self.backend.clone(), self.clock.clone())
    }

    /// Restore the persisted admin session and count this command as
    /// activity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AdminRequired`] if there is no live admin
    /// session, or [`CommandError::Blocked`] if the account was blocked.
    pub async fn admin(&self) -> Result<String, CommandError> {
        self.auth.restore_session().await?;
        let email = self.auth.require_admin()?;

        if let BlockedCheck::Blocked { .. } = self.auth.check_blocked_status("/").await {
            return Err(CommandError::Blocked);
        }

        self.auth.record_activity(ActivityEvent::KeyDown);
        Ok(email)
    }
}
