//! Planning Center people lookup through the `planning-center-lookup`
//! Edge Function.

use std::sync::Arc;

use prayerline_core::{Email, EmailError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::backend::Backend;
use crate::supabase::FunctionError;

const LOOKUP_FUNCTION: &str = "planning-center-lookup";

/// Errors from a Planning Center lookup.
#[derive(Debug, Error)]
pub enum PlanningCenterError {
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error(transparent)]
    Function(#[from] FunctionError),
}

/// A person record from Planning Center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Lookup result. An empty `people` list is a normal answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResult {
    #[serde(default)]
    pub people: Vec<Person>,
    #[serde(default)]
    pub count: usize,
}

/// Planning Center client.
pub struct PlanningCenter<B> {
    backend: Arc<B>,
}

impl<B> std::fmt::Debug for PlanningCenter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanningCenter").finish_non_exhaustive()
    }
}

impl<B: Backend> PlanningCenter<B> {
    #[must_use]
    pub const fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Find people registered under `email`.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningCenterError::InvalidEmail`] before any call for a
    /// malformed address, or [`PlanningCenterError::Function`] if the
    /// function call fails.
    #[instrument(skip(self))]
    pub async fn lookup(&self, email: &str) -> Result<LookupResult, PlanningCenterError> {
        let email = Email::parse(email)?;
        let result: LookupResult = self
            .backend
            .call(LOOKUP_FUNCTION, &json!({ "email": email.normalized() }))
            .await?;
        debug!(count = result.count, "Planning Center lookup completed");
        Ok(result)
    }
}
