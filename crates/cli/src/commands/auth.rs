//! Admin sign-in commands.
//!
//! # Usage
//!
//! ```bash
//! prayerline auth send-code admin@church.org
//! prayerline auth verify 123456
//! prayerline auth status
//! prayerline auth logout
//! ```
//!
//! The pending code id and the session markers live in the state file, so
//! `send-code` and `verify` can run as separate invocations.

use prayerline_client::auth::BlockedCheck;

use super::{CommandError, Context};

pub async fn send_code(ctx: &Context, email: &str) -> Result<(), CommandError> {
    ctx.auth.send_mfa_code(email).await?;
    tracing::info!("Verification code sent; run `prayerline auth verify <code>`");
    Ok(())
}

pub async fn verify(ctx: &Context, code: &str) -> Result<(), CommandError> {
    let state = ctx.auth.verify_mfa_code(code.trim()).await?;
    tracing::info!(
        email = state.email.as_deref().unwrap_or_default(),
        is_admin = state.is_admin,
        "Signed in"
    );
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn status(ctx: &Context) -> Result<(), CommandError> {
    let state = ctx.auth.restore_session().await?;
    match state.email {
        Some(email) => {
            println!("Signed in as {email}");
            println!("Admin: {}", if state.is_admin { "yes" } else { "no" });
            println!(
                "Last activity: {}",
                ctx.auth.last_activity().format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!(
                "Inactivity timeout: {} minutes",
                ctx.auth.settings().load().inactivity_timeout_minutes
            );
        }
        None => println!("Not signed in"),
    }
    Ok(())
}

pub fn logout(ctx: &Context) -> Result<(), CommandError> {
    ctx.auth.logout()?;
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn check_blocked(ctx: &Context, return_url: &str) -> Result<(), CommandError> {
    ctx.auth.restore_session().await?;
    match ctx.auth.check_blocked_status(return_url).await {
        BlockedCheck::NoSession => println!("Not signed in"),
        BlockedCheck::Throttled => println!("Checked recently; skipped"),
        BlockedCheck::Clear => println!("Not blocked"),
        BlockedCheck::CheckFailed => println!("Check failed; session left as is"),
        BlockedCheck::Blocked { redirect } => {
            println!("Blocked; signed out. Redirect: {redirect}");
            return Err(CommandError::Blocked);
        }
    }
    Ok(())
}
