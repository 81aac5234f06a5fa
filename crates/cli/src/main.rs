//! Prayerline CLI - prayer moderation, branding and admin sessions.
//!
//! # Usage
//!
//! ```bash
//! # Browse prayers
//! prayerline prayers list --status answered
//!
//! # Sign in as an admin (emails a code, then verifies it)
//! prayerline auth send-code admin@church.org
//! prayerline auth verify 123456
//!
//! # Moderate
//! prayerline prayers pending
//! prayerline prayers approve 8f14e45f-ceea-467a-9af0-2c1f6b4d3e21
//!
//! # Branding
//! prayerline branding refresh
//! prayerline branding export-logo --out logo
//! ```
//!
//! Session markers and caches persist in `PRAYERLINE_STATE_FILE`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use prayerline_client::ClientConfig;
use prayerline_core::{PrayerId, PrayerStatus, PrayerUpdateId};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod commands;

#[derive(Parser)]
#[command(name = "prayerline")]
#[command(author, version, about = "Prayerline command-line client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse, submit and moderate prayers
    Prayers {
        #[command(subcommand)]
        action: PrayerAction,
    },
    /// Show, refresh and export branding
    Branding {
        #[command(subcommand)]
        action: BrandingAction,
    },
    /// Admin sign-in and session management
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Look up people in Planning Center
    PlanningCenter {
        #[command(subcommand)]
        action: PlanningCenterAction,
    },
}

#[derive(Subcommand)]
enum PrayerAction {
    /// List approved prayers
    List {
        /// Status to list (`current`, `answered`, `archived`)
        #[arg(short, long, default_value = "current")]
        status: PrayerStatus,

        /// Maximum number of prayers
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List prayers and updates awaiting approval (admin)
    Pending,
    /// Show one prayer with its updates
    Show { id: PrayerId },
    /// Submit a prayer request
    Submit {
        #[arg(long)]
        title: String,

        /// Who the prayer is for
        #[arg(long = "for")]
        prayer_for: String,

        #[arg(long)]
        description: String,

        /// Your name
        #[arg(long, default_value = "")]
        requester: String,

        /// Contact email for follow-ups
        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        anonymous: bool,
    },
    /// Post an update on a prayer
    Update {
        prayer_id: PrayerId,

        #[arg(long)]
        content: String,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        anonymous: bool,

        /// Mark the prayer answered once this update is approved
        #[arg(long)]
        answered: bool,
    },
    /// Approve a pending prayer, or an update with `--update` (admin)
    Approve {
        /// Prayer id, or update id with `--update`
        id: Uuid,

        #[arg(long)]
        update: bool,
    },
    /// Deny a pending prayer, or an update with `--update` (admin)
    Deny {
        /// Prayer id, or update id with `--update`
        id: Uuid,

        #[arg(long)]
        update: bool,
    },
    /// Mark a prayer answered (admin)
    Answer { id: PrayerId },
    /// Archive a prayer (admin)
    Archive { id: PrayerId },
    /// Move a prayer back to current (admin)
    Restore { id: PrayerId },
    /// Hide a prayer from every list (admin)
    Remove { id: PrayerId },
    /// Edit a prayer's text (admin)
    Edit {
        id: PrayerId,

        #[arg(long)]
        title: Option<String>,

        #[arg(long = "for")]
        prayer_for: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Subcommand)]
enum BrandingAction {
    /// Print the branding, refreshing it if the server has a newer copy
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Probe the server and refetch branding when stale
    Refresh,
    /// Write the logo image to a file
    ExportLogo {
        /// Output path; the extension is added from the image type
        #[arg(short, long)]
        out: std::path::PathBuf,

        /// Export the dark mode logo
        #[arg(long)]
        dark: bool,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Email a sign-in code
    SendCode { email: String },
    /// Verify the emailed code
    Verify { code: String },
    /// Show the current session
    Status,
    /// Sign out
    Logout,
    /// Check whether the signed-in account was blocked
    CheckBlocked {
        #[arg(long, default_value = "/")]
        return_url: String,
    },
}

#[derive(Subcommand)]
enum PlanningCenterAction {
    /// Find people by email (admin)
    Lookup { email: String },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry.dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry
                .environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry.sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "prayerline=info,prayerline_client=info".into());

    // JSON for log shippers, text for terminals
    let json = std::env::var("PRAYERLINE_LOG_JSON").is_ok();
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Configuration is needed for Sentry, which must start before tracing
    let config = ClientConfig::from_env();
    let sentry_guard = config.as_ref().ok().and_then(init_sentry);
    init_tracing();

    let result: Result<(), Box<dyn std::error::Error>> = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        drop(sentry_guard);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = commands::Context::new(config)?;

    match cli.command {
        Commands::Prayers { action } => match action {
            PrayerAction::List {
                status,
                limit,
                json,
            } => commands::prayers::list(&ctx, status, limit, json).await?,
            PrayerAction::Pending => commands::prayers::pending(&ctx).await?,
            PrayerAction::Show { id } => commands::prayers::show(&ctx, id).await?,
            PrayerAction::Submit {
                title,
                prayer_for,
                description,
                requester,
                email,
                anonymous,
            } => {
                commands::prayers::submit(
                    &ctx,
                    commands::prayers::Submission {
                        title,
                        prayer_for,
                        description,
                        requester,
                        email,
                        anonymous,
                    },
                )
                .await?;
            }
            PrayerAction::Update {
                prayer_id,
                content,
                author,
                email,
                anonymous,
                answered,
            } => {
                commands::prayers::post_update(
                    &ctx,
                    commands::prayers::UpdateSubmission {
                        prayer_id,
                        content,
                        author,
                        email,
                        anonymous,
                        answered,
                    },
                )
                .await?;
            }
            PrayerAction::Approve { id, update } => {
                if update {
                    commands::prayers::approve_update(&ctx, PrayerUpdateId::new(id))
                        .await?;
                } else {
                    commands::prayers::approve(&ctx, PrayerId::new(id)).await?;
                }
            }
            PrayerAction::Deny { id, update } => {
                if update {
                    commands::prayers::deny_update(&ctx, PrayerUpdateId::new(id))
                        .await?;
                } else {
                    commands::prayers::deny(&ctx, PrayerId::new(id)).await?;
                }
            }
            PrayerAction::Answer { id } => {
                commands::prayers::set_status(&ctx, id, PrayerStatus::Answered).await?;
            }
            PrayerAction::Archive { id } => {
                commands::prayers::set_status(&ctx, id, PrayerStatus::Archived).await?;
            }
            PrayerAction::Restore { id } => {
                commands::prayers::set_status(&ctx, id, PrayerStatus::Current).await?;
            }
            PrayerAction::Remove { id } => commands::prayers::remove(&ctx, id).await?,
            PrayerAction::Edit {
                id,
                title,
                prayer_for,
                description,
            } => {
                commands::prayers::edit(
                    &ctx,
                    id,
                    prayerline_core::PrayerEdit {
                        title,
                        prayer_for,
                        description,
                    },
                )
                .await?;
            }
        },
        Commands::Branding { action } => match action {
            BrandingAction::Show { json } => commands::branding::show(&ctx, json).await?,
            BrandingAction::Refresh => commands::branding::refresh(&ctx).await?,
            BrandingAction::ExportLogo { out, dark } => {
                commands::branding::export_logo(&ctx, &out, dark).await?;
            }
        },
        Commands::Auth { action } => match action {
            AuthAction::SendCode { email } => commands::auth::send_code(&ctx, &email).await?,
            AuthAction::Verify { code } => commands::auth::verify(&ctx, &code).await?,
            AuthAction::Status => commands::auth::status(&ctx).await?,
            AuthAction::Logout => commands::auth::logout(&ctx)?,
            AuthAction::CheckBlocked { return_url } => {
                commands::auth::check_blocked(&ctx, &return_url).await?;
            }
        },
        Commands::PlanningCenter { action } => match action {
            PlanningCenterAction::Lookup { email } => {
                commands::planning_center::lookup(&ctx, &email).await?;
            }
        },
    }
    Ok(())
}
