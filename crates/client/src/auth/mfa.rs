//! Email verification code flow.
//!
//! `send-verification-code` mails a one-time code and returns its id. The
//! id and the email are persisted so `verify-code` can be called later,
//! possibly from a fresh process.

use prayerline_core::Email;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use super::{AdminAuth, AuthError, AuthState};
use crate::backend::Backend;
use crate::store::{SessionStoreExt, keys};

const SEND_CODE_FUNCTION: &str = "send-verification-code";
const VERIFY_CODE_FUNCTION: &str = "verify-code";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendCodeResponse {
    #[serde(default)]
    code_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyCodeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

impl<B: Backend> AdminAuth<B> {
    /// Send a sign-in code to `email`.
    ///
    /// Refreshes the timeout settings first. Unless site-wide login is
    /// required, only admin emails may request a code.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidEmail`] for a malformed address
    /// - [`AuthError::NotAuthorized`] for a non-admin address
    /// - [`AuthError::Function`] if the function call fails
    /// - [`AuthError::UnexpectedResponse`] if no code id comes back
    #[instrument(skip(self))]
    pub async fn send_mfa_code(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        let normalized = email.normalized();

        let settings = self.settings.refresh().await;
        if !settings.require_site_login && !self.is_admin_email(&normalized).await? {
            warn!("Code requested for a non-admin email");
            return Err(AuthError::NotAuthorized);
        }

        let response: SendCodeResponse = self
            .backend
            .call(
                SEND_CODE_FUNCTION,
                &json!({ "email": normalized, "actionType": "login" }),
            )
            .await?;

        let code_id = response
            .code_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::UnexpectedResponse {
                function: SEND_CODE_FUNCTION.to_string(),
                message: "missing codeId".to_string(),
            })?;

        self.store.set(keys::MFA_CODE_ID, &code_id)?;
        self.store.set(keys::MFA_USER_EMAIL, &normalized)?;
        info!("Verification code sent");

        Ok(())
    }

    /// Verify a code sent by [`send_mfa_code`](Self::send_mfa_code).
    ///
    /// On success the admin session markers are persisted, the pending
    /// code is forgotten, the inactivity clock restarts, and the new state
    /// is published.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NoMfaSession`] if no code is pending; nothing is sent
    /// - [`AuthError::InvalidCode`] if the function rejects the code
    /// - [`AuthError::Function`] / [`AuthError::Backend`] on call failures
    #[instrument(skip(self, code))]
    pub async fn verify_mfa_code(&self, code: &str) -> Result<AuthState, AuthError> {
        let (Some(code_id), Some(email)) = (
            self.store.get(keys::MFA_CODE_ID)?,
            self.store.get(keys::MFA_USER_EMAIL)?,
        ) else {
            return Err(AuthError::NoMfaSession);
        };

        let response: VerifyCodeResponse = self
            .backend
            .call(
                VERIFY_CODE_FUNCTION,
                &json!({ "codeId": code_id, "code": code.trim(), "email": email }),
            )
            .await?;

        if !response.success {
            let message = response
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "Invalid verification code".to_string());
            warn!(error = %message, "Verification code rejected");
            return Err(AuthError::InvalidCode(message));
        }

        let is_admin = self.is_admin_email(&email).await?;
        let now = self.clock.now();

        self.store.set(keys::APPROVAL_ADMIN_EMAIL, &email)?;
        self.store.set(keys::APPROVAL_SESSION_VALIDATED, "true")?;
        self.store.set(keys::ADMIN_SESSION_START, &now.to_rfc3339())?;
        self.store.set(keys::ADMIN_LAST_ACTIVITY, &now.to_rfc3339())?;
        self.store.remove_all(&[keys::MFA_CODE_ID, keys::MFA_USER_EMAIL])?;

        self.touch(now);
        let state = AuthState {
            email: Some(email),
            is_admin,
            blocked: false,
        };
        self.publish(state.clone());
        info!(is_admin, "Verification code accepted");

        Ok(state)
    }
}
