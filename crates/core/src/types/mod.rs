//! Core types for Prayerline.
//!
//! This module provides type-safe wrappers for the prayer-request domain.

pub mod email;
pub mod id;
pub mod prayer;
pub mod settings;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use prayer::{NewPrayer, NewPrayerUpdate, Prayer, PrayerEdit, PrayerUpdate, ValidationError};
pub use settings::{AdminSettings, Branding, LogoBlob, LogoError, TimeoutSettings};
pub use status::*;
