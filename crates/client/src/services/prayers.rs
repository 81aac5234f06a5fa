//! Prayer and prayer update operations.

use std::sync::Arc;

use prayerline_core::{
    ApprovalStatus, NewPrayer, NewPrayerUpdate, Prayer, PrayerEdit, PrayerId, PrayerStatus,
    PrayerUpdate, PrayerUpdateId, ValidationError,
};
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument};

use crate::backend::Backend;
use crate::clock::Clock;
use crate::supabase::{MutationOptions, QueryOptions, RestError};

const PRAYERS_TABLE: &str = "prayers";
const UPDATES_TABLE: &str = "prayer_updates";
const PRAYER_WITH_UPDATES: &str = "*,prayer_updates(*)";

/// Errors from prayer operations.
#[derive(Debug, Error)]
pub enum PrayerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Prayer not found: {0}")]
    NotFound(PrayerId),

    #[error("Prayer update not found: {0}")]
    UpdateNotFound(PrayerUpdateId),

    #[error("Insert into {0} returned no row")]
    NoRowReturned(&'static str),

    #[error(transparent)]
    Backend(#[from] RestError),
}

/// Prayer queries and moderation.
pub struct PrayerService<B> {
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
}

impl<B> std::fmt::Debug for PrayerService<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrayerService").finish_non_exhaustive()
    }
}

impl<B: Backend> PrayerService<B> {
    #[must_use]
    pub fn new(backend: Arc<B>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Approved prayers with `status`, newest first, with their approved
    /// updates embedded.
    ///
    /// # Errors
    ///
    /// Returns [`PrayerError::Backend`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list(&self, status: PrayerStatus, limit: usize) -> Result<Vec<Prayer>, PrayerError> {
        let options = QueryOptions::new()
            .select(PRAYER_WITH_UPDATES)
            .eq("status", status)
            .eq("approval_status", ApprovalStatus::Approved)
            .order("created_at", false)
            .limit(limit);

        let mut prayers: Vec<Prayer> = self.backend.select(PRAYERS_TABLE, &options).await?;
        for prayer in &mut prayers {
            prayer
                .updates
                .retain(|u| u.approval_status == ApprovalStatus::Approved);
        }
        Ok(prayers)
    }

    /// A single prayer with all its updates.
    ///
    /// # Errors
    ///
    /// Returns [`PrayerError::NotFound`] if no row matches.
    #[instrument(skip(self), fields(prayer_id = %id))]
    pub async fn get(&self, id: PrayerId) -> Result<Prayer, PrayerError> {
        let options = QueryOptions::new()
            .select(PRAYER_WITH_UPDATES)
            .eq("id", id)
            .limit(1);
        self.backend
            .select_one(PRAYERS_TABLE, &options)
            .await?
            .ok_or(PrayerError::NotFound(id))
    }

    /// Prayers awaiting approval, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`PrayerError::Backend`] if the query fails.
    #[instrument(skip(self))]
    pub async fn pending(&self) -> Result<Vec<Prayer>, PrayerError> {
        let options = QueryOptions::new()
            .eq("approval_status", ApprovalStatus::Pending)
            .order("created_at", true);
        Ok(self.backend.select(PRAYERS_TABLE, &options).await?)
    }

    /// Updates awaiting approval, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`PrayerError::Backend`] if the query fails.
    #[instrument(skip(self))]
    pub async fn pending_updates(&self) -> Result<Vec<PrayerUpdate>, PrayerError> {
        let options = QueryOptions::new()
            .eq("approval_status", ApprovalStatus::Pending)
            .order("created_at", true);
        Ok(self.backend.select(UPDATES_TABLE, &options).await?)
    }

    // =========================================================================
    // Submissions
    // =========================================================================

    /// Submit a new prayer request for approval.
    ///
    /// # Errors
    ///
    /// Returns [`PrayerError::Validation`] before any call if the request is
    /// invalid, or [`PrayerError::Backend`] if the insert fails.
    #[instrument(skip(self, prayer), fields(title = %prayer.title))]
    pub async fn submit(&self, prayer: &NewPrayer) -> Result<Prayer, PrayerError> {
        prayer.validate()?;
        let options = MutationOptions::insert(prayer.insert_body(self.clock.now())).returning();
        let created: Prayer = self
            .backend
            .mutate_one(PRAYERS_TABLE, &options)
            .await?
            .ok_or(PrayerError::NoRowReturned(PRAYERS_TABLE))?;
        info!(prayer_id = %created.id, "Prayer submitted");
        Ok(created)
    }

    /// Submit an update against a prayer for approval.
    ///
    /// # Errors
    ///
    /// Returns [`PrayerError::Validation`] before any call if the update is
    /// invalid, or [`PrayerError::Backend`] if the insert fails.
    #[instrument(skip(self, update), fields(prayer_id = %update.prayer_id))]
    pub async fn submit_update(&self, update: &NewPrayerUpdate) -> Result<PrayerUpdate, PrayerError> {
        update.validate()?;
        let options = MutationOptions::insert(update.insert_body()).returning();
        let created: PrayerUpdate = self
            .backend
            .mutate_one(UPDATES_TABLE, &options)
            .await?
            .ok_or(PrayerError::NoRowReturned(UPDATES_TABLE))?;
        info!(update_id = %created.id, "Prayer update submitted");
        Ok(created)
    }

    // =========================================================================
    // Moderation
    // =========================================================================

    /// Approve a pending prayer.
    ///
    /// # Errors
    ///
    /// Returns [`PrayerError::NotFound`] if no row matches.
    pub async fn approve(&self, id: PrayerId) -> Result<Prayer, PrayerError> {
        self.patch_prayer(id, json!({ "approval_status": ApprovalStatus::Approved }))
            .await
    }

    /// Deny a pending prayer.
    ///
    /// # Errors
    ///
    /// Returns [`PrayerError::NotFound`] if no row matches.
    pub async fn deny(&self, id: PrayerId) -> Result<Prayer, PrayerError> {
        self.patch_prayer(id, json!({ "approval_status": ApprovalStatus::Denied }))
            .await
    }

    /// Approve a pending update. An update marked as answering its prayer
    /// also moves the prayer to `answered`.
    ///
    /// # Errors
    ///
    /// Returns [`PrayerError::UpdateNotFound`] if no update matches, or
    /// [`PrayerError::NotFound`] if its prayer is gone.
    #[instrument(skip(self), fields(update_id = %id))]
    pub async fn approve_update(&self, id: PrayerUpdateId) -> Result<PrayerUpdate, PrayerError> {
        let update = self
            .patch_update(id, ApprovalStatus::Approved)
            .await?;
        if update.mark_as_answered {
            self.set_status(update.prayer_id, PrayerStatus::Answered)
                .await?;
            info!(prayer_id = %update.prayer_id, "Prayer marked answered by update");
        }
        Ok(update)
    }

    /// Deny a pending update.
    ///
    /// # Errors
    ///
    /// Returns [`PrayerError::UpdateNotFound`] if no update matches.
    pub async fn deny_update(&self, id: PrayerUpdateId) -> Result<PrayerUpdate, PrayerError> {
        self.patch_update(id, ApprovalStatus::Denied).await
    }

    /// Move a prayer to `status`.
    ///
    /// # Errors
    ///
    /// Returns [`PrayerError::NotFound`] if no row matches.
    pub async fn set_status(&self, id: PrayerId, status: PrayerStatus) -> Result<Prayer, PrayerError> {
        self.patch_prayer(
            id,
            json!({ "status": status, "updated_at": self.clock.now() }),
        )
        .await
    }

    /// Soft-delete a prayer. The row stays, hidden from every list.
    ///
    /// # Errors
    ///
    /// Returns [`PrayerError::NotFound`] if no row matches.
    pub async fn remove(&self, id: PrayerId) -> Result<Prayer, PrayerError> {
        self.set_status(id, PrayerStatus::Removed).await
    }

    /// Apply an admin edit to a prayer's text.
    ///
    /// # Errors
    ///
    /// Returns [`PrayerError::Validation`] before any call for an empty or
    /// invalid edit, or [`PrayerError::NotFound`] if no row matches.
    pub async fn edit(&self, id: PrayerId, edit: &PrayerEdit) -> Result<Prayer, PrayerError> {
        edit.validate()?;
        self.patch_prayer(id, edit.patch_body(self.clock.now()))
            .await
    }

    #[instrument(skip(self, body), fields(prayer_id = %id))]
    async fn patch_prayer(&self, id: PrayerId, body: serde_json::Value) -> Result<Prayer, PrayerError> {
        let options = MutationOptions::update(body).eq("id", id).returning();
        let prayer = self
            .backend
            .mutate_one(PRAYERS_TABLE, &options)
            .await?
            .ok_or(PrayerError::NotFound(id))?;
        info!("Prayer updated");
        Ok(prayer)
    }

    async fn patch_update(
        &self,
        id: PrayerUpdateId,
        status: ApprovalStatus,
    ) -> Result<PrayerUpdate, PrayerError> {
        let options = MutationOptions::update(json!({ "approval_status": status }))
            .eq("id", id)
            .returning();
        self.backend
            .mutate_one(UPDATES_TABLE, &options)
            .await?
            .ok_or(PrayerError::UpdateNotFound(id))
    }
}
