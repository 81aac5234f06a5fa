//! Branding commands.
//!
//! Branding is cached in the state file; `show` and `export-logo` only
//! download the full payload when the server's `branding_last_modified`
//! is newer than the cached copy.

use std::path::Path;
use std::sync::Arc;

use prayerline_client::store::keys;
use prayerline_client::{
    BrandingLoader, CacheStore, RefreshOutcome, SessionStore, StoredCache, SupabaseClient,
};
use prayerline_core::{Branding, LogoBlob};

use super::{CommandError, Context};

fn loader(ctx: &Context) -> BrandingLoader<SupabaseClient> {
    let cache: Arc<dyn CacheStore<Branding>> = Arc::new(
        StoredCache::<dyn SessionStore, Branding>::new(ctx.store.clone(), keys::BRANDING_PREFIX),
    );
    let loader = BrandingLoader::new(ctx.backend.clone(), cache, ctx.clock.clone());
    loader.load_cached();
    loader
}

/// Refresh when possible, falling back to the cached copy.
async fn current(ctx: &Context) -> Branding {
    let loader = loader(ctx);
    match loader.refresh().await {
        RefreshOutcome::ProbeFailed(e) | RefreshOutcome::FetchFailed(e) => {
            tracing::warn!(error = %e, "Using cached branding");
        }
        _ => {}
    }
    loader.current()
}

#[allow(clippy::print_stdout)]
pub async fn show(ctx: &Context, json: bool) -> Result<(), CommandError> {
    let branding = current(ctx).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&branding)?);
        return Ok(());
    }

    println!("Title:    {}", branding.app_title);
    println!("Subtitle: {}", branding.app_subtitle);
    println!("Logo:     {}", if branding.use_logo { "on" } else { "off" });
    if let Some(modified) = branding.branding_last_modified {
        println!("Modified: {}", modified.to_rfc3339());
    }
    Ok(())
}

/// Probe the server and refetch when stale. Failures are errors here.
pub async fn refresh(ctx: &Context) -> Result<(), CommandError> {
    match loader(ctx).refresh().await {
        RefreshOutcome::UpToDate => tracing::info!("Branding is up to date"),
        RefreshOutcome::Refreshed => tracing::info!("Branding refreshed"),
        RefreshOutcome::NoSettings => tracing::warn!("No settings row; using defaults"),
        RefreshOutcome::ProbeFailed(e) | RefreshOutcome::FetchFailed(e) => return Err(e.into()),
    }
    Ok(())
}

/// Write the logo to `out` with an extension matching its image type.
pub async fn export_logo(ctx: &Context, out: &Path, dark: bool) -> Result<(), CommandError> {
    let branding = current(ctx).await;
    let data_url = branding.logo(dark).ok_or(CommandError::NoLogo)?;
    let logo = LogoBlob::decode(data_url)?;

    let path = out.with_extension(logo.extension());
    std::fs::write(&path, &logo.bytes)?;
    tracing::info!(
        path = %path.display(),
        bytes = logo.bytes.len(),
        mime = %logo.mime_type,
        "Logo exported"
    );
    Ok(())
}
