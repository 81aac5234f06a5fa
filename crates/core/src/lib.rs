//! Prayerline Core - Shared domain types.
//!
//! This crate provides the records mirrored from the Supabase schema and the
//! small value types used by every Prayerline component:
//! - `client` - REST helper, caches, session bookkeeping and services
//! - `cli` - Command-line front end
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no HTTP
//! clients, no storage. The backend owns the data model; these types only
//! move it.
//!
//! # Modules
//!
//! - [`types`] - IDs, emails, statuses, prayers, updates and settings

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
