//! Prayer commands.
//!
//! # Usage
//!
//! ```bash
//! # Public
//! prayerline prayers list --status current --limit 10
//! prayerline prayers submit --title "Healing" --for "My aunt" --description "..." --requester Ann
//!
//! # Admin
//! prayerline prayers pending
//! prayerline prayers approve <id>
//! prayerline prayers approve --update <update-id>
//! prayerline prayers archive <id>
//! ```

use prayerline_core::{
    Email, NewPrayer, NewPrayerUpdate, Prayer, PrayerEdit, PrayerId, PrayerStatus, PrayerUpdate,
    PrayerUpdateId,
};

use super::{CommandError, Context};

/// A prayer request as entered on the command line.
pub struct Submission {
    pub title: String,
    pub prayer_for: String,
    pub description: String,
    pub requester: String,
    pub email: Option<String>,
    pub anonymous: bool,
}

/// An update as entered on the command line.
pub struct UpdateSubmission {
    pub prayer_id: PrayerId,
    pub content: String,
    pub author: Option<String>,
    pub email: Option<String>,
    pub anonymous: bool,
    pub answered: bool,
}

fn parse_email(email: Option<&str>) -> Result<Option<Email>, CommandError> {
    Ok(email.map(Email::parse).transpose()?)
}

#[allow(clippy::print_stdout)]
fn print_prayer(prayer: &Prayer) {
    println!(
        "{}  [{}/{}]  {}",
        prayer.id, prayer.status, prayer.approval_status, prayer.title
    );
    println!("    For: {}", prayer.prayer_for);
    println!("    From: {}", prayer.display_requester());
    println!("    Requested: {}", prayer.created_at.format("%Y-%m-%d %H:%M"));
}

#[allow(clippy::print_stdout)]
fn print_update(update: &PrayerUpdate) {
    let author = if update.is_anonymous {
        "Anonymous"
    } else {
        update.author.as_deref().unwrap_or("Anonymous")
    };
    println!(
        "    - {} ({}, {}): {}",
        update.id,
        author,
        update.created_at.format("%Y-%m-%d"),
        update.content
    );
}

/// List approved prayers with the given status.
#[allow(clippy::print_stdout)]
pub async fn list(
    ctx: &Context,
    status: PrayerStatus,
    limit: usize,
    json: bool,
) -> Result<(), CommandError> {
    let prayers = ctx.prayers().list(status, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&prayers)?);
        return Ok(());
    }

    if prayers.is_empty() {
        println!("No {status} prayers.");
    }
    for prayer in &prayers {
        print_prayer(prayer);
        for update in prayer.approved_updates() {
            print_update(update);
        }
    }
    Ok(())
}

/// List prayers and updates waiting for moderation.
#[allow(clippy::print_stdout)]
pub async fn pending(ctx: &Context) -> Result<(), CommandError> {
    ctx.admin().await?;
    let service = ctx.prayers();
    let prayers = service.pending().await?;
    let updates = service.pending_updates().await?;

    println!("Pending prayers: {}", prayers.len());
    for prayer in &prayers {
        print_prayer(prayer);
    }
    println!("Pending updates: {}", updates.len());
    for update in &updates {
        println!("  on prayer {}", update.prayer_id);
        print_update(update);
    }
    Ok(())
}

/// Show one prayer with its approved updates.
#[allow(clippy::print_stdout)]
pub async fn show(ctx: &Context, id: PrayerId) -> Result<(), CommandError> {
    let prayer = ctx.prayers().get(id).await?;
    print_prayer(&prayer);
    println!();
    println!("{}", prayer.description);
    for update in prayer.approved_updates() {
        print_update(update);
    }
    Ok(())
}

/// Submit a new prayer for approval.
pub async fn submit(ctx: &Context, submission: Submission) -> Result<(), CommandError> {
    let prayer = NewPrayer {
        title: submission.title,
        prayer_for: submission.prayer_for,
        description: submission.description,
        requester: submission.requester,
        email: parse_email(submission.email.as_deref())?,
        is_anonymous: submission.anonymous,
    };

    let created = ctx.prayers().submit(&prayer).await?;
    tracing::info!(id = %created.id, "Prayer submitted; it will appear once approved");
    Ok(())
}

/// Post an update on an existing prayer.
pub async fn post_update(ctx: &Context, submission: UpdateSubmission) -> Result<(), CommandError> {
    let update = NewPrayerUpdate {
        prayer_id: submission.prayer_id,
        content: submission.content,
        author: submission.author,
        author_email: parse_email(submission.email.as_deref())?,
        is_anonymous: submission.anonymous,
        mark_as_answered: submission.answered,
    };

    let created = ctx.prayers().submit_update(&update).await?;
    tracing::info!(id = %created.id, "Update submitted; it will appear once approved");
    Ok(())
}

pub async fn approve(ctx: &Context, id: PrayerId) -> Result<(), CommandError> {
    ctx.admin().await?;
    let prayer = ctx.prayers().approve(id).await?;
    tracing::info!(id = %prayer.id, "Prayer approved");
    Ok(())
}

pub async fn deny(ctx: &Context, id: PrayerId) -> Result<(), CommandError> {
    ctx.admin().await?;
    let prayer = ctx.prayers().deny(id).await?;
    tracing::info!(id = %prayer.id, "Prayer denied");
    Ok(())
}

/// Approve an update; answers the prayer if the update asked for it.
pub async fn approve_update(ctx: &Context, id: PrayerUpdateId) -> Result<(), CommandError> {
    ctx.admin().await?;
    let update = ctx.prayers().approve_update(id).await?;
    tracing::info!(
        id = %update.id,
        answered = update.mark_as_answered,
        "Update approved"
    );
    Ok(())
}

pub async fn deny_update(ctx: &Context, id: PrayerUpdateId) -> Result<(), CommandError> {
    ctx.admin().await?;
    let update = ctx.prayers().deny_update(id).await?;
    tracing::info!(id = %update.id, "Update denied");
    Ok(())
}

pub async fn set_status(
    ctx: &Context,
    id: PrayerId,
    status: PrayerStatus,
) -> Result<(), CommandError> {
    ctx.admin().await?;
    let prayer = ctx.prayers().set_status(id, status).await?;
    tracing::info!(id = %prayer.id, %status, "Prayer status changed");
    Ok(())
}

pub async fn remove(ctx: &Context, id: PrayerId) -> Result<(), CommandError> {
    ctx.admin().await?;
    let prayer = ctx.prayers().remove(id).await?;
    tracing::info!(id = %prayer.id, "Prayer removed");
    Ok(())
}

pub async fn edit(ctx: &Context, id: PrayerId, edit: PrayerEdit) -> Result<(), CommandError> {
    ctx.admin().await?;
    let prayer = ctx.prayers().edit(id, &edit).await?;
    tracing::info!(id = %prayer.id, "Prayer updated");
    Ok(())
}
