//! Admin authentication errors.

use prayerline_core::EmailError;
use thiserror::Error;

use crate::store::StoreError;
use crate::supabase::{FunctionError, RestError};

/// Errors from the admin sign-in flow.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("This email is not authorized for admin access")]
    NotAuthorized,

    #[error("No MFA session found. Please request a new code.")]
    NoMfaSession,

    #[error("{0}")]
    InvalidCode(String),

    #[error("Unexpected response from {function}: {message}")]
    UnexpectedResponse { function: String, message: String },

    #[error("Admin session required")]
    AdminRequired,

    #[error(transparent)]
    Backend(#[from] RestError),

    #[error(transparent)]
    Function(#[from] FunctionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Whether the failure looks like connectivity rather than a rejection.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        match self {
            Self::Backend(e) => e.is_network(),
            Self::Function(e) => e.is_network(),
            _ => false,
        }
    }
}
