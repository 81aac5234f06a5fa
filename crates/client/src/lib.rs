//! Prayerline client library.
//!
//! Talks to the Supabase project behind Prayerline:
//!
//! - [`supabase`] - PostgREST queries and mutations with timeouts and typed
//!   errors, plus Edge Function calls
//! - [`branding`] - branding loader that probes `branding_last_modified`
//!   before fetching the full payload
//! - [`auth`] - admin sign-in by emailed code, inactivity timeout and the
//!   throttled blocked-account check
//! - [`services`] - prayer moderation and Planning Center lookup
//!
//! Services depend on the [`Backend`] trait rather than on
//! [`SupabaseClient`](supabase::SupabaseClient) directly; enable the
//! `test-support` feature for an in-memory implementation.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod backend;
pub mod branding;
pub mod cache;
pub mod clock;
pub mod config;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod services;
pub mod settings;
pub mod store;
pub mod supabase;

pub use auth::{AdminAuth, AuthError, AuthState};
pub use backend::Backend;
pub use branding::{BrandingLoader, RefreshOutcome};
pub use cache::{CacheStore, Cached, MemoryCache, StoredCache};
pub use clock::{Clock, SystemClock};
pub use config::{ClientConfig, ConfigError, SupabaseConfig};
pub use settings::TimeoutSettingsLoader;
pub use store::{FileStore, MemoryStore, SessionStore, SessionStoreExt, StoreError};
pub use supabase::{RestError, SupabaseClient};
