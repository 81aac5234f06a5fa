//! Prayer requests and their updates.
//!
//! Records mirror the `prayers` and `prayer_updates` tables. Submissions go
//! through [`NewPrayer`] / [`NewPrayerUpdate`], which validate user input
//! and always enter the moderation queue as pending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::email::{Email, EmailError};
use super::id::{PrayerId, PrayerUpdateId};
use super::status::{ApprovalStatus, PrayerStatus};

/// Maximum length of a prayer title.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum length of a prayer description or update body.
pub const MAX_BODY_LENGTH: usize = 5000;

/// Name shown in place of the requester for anonymous submissions.
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// Errors raised when validating a submission.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    /// A required field is blank.
    #[error("{0} is required")]
    EmptyField(&'static str),

    /// A field exceeds its maximum length.
    #[error("{field} must be at most {max} characters")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Maximum allowed length.
        max: usize,
    },

    /// The edit contains no changes.
    #[error("no fields to update")]
    NothingToUpdate,

    /// The supplied email is malformed.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),
}

/// A prayer request as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prayer {
    pub id: PrayerId,
    pub title: String,
    #[serde(default)]
    pub prayer_for: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requester: String,
    #[serde(default)]
    pub email: Option<Email>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub status: PrayerStatus,
    #[serde(default)]
    pub approval_status: ApprovalStatus,
    #[serde(default)]
    pub date_requested: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Embedded updates, present when the query selects `prayer_updates(*)`.
    #[serde(default, rename = "prayer_updates", skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<PrayerUpdate>,
}

impl Prayer {
    /// Name to display for the requester, honoring anonymity.
    #[must_use]
    pub fn display_requester(&self) -> &str {
        if self.is_anonymous || self.requester.trim().is_empty() {
            ANONYMOUS_NAME
        } else {
            &self.requester
        }
    }

    /// Approved updates, newest first.
    #[must_use]
    pub fn approved_updates(&self) -> Vec<&PrayerUpdate> {
        let mut updates: Vec<&PrayerUpdate> = self
            .updates
            .iter()
            .filter(|u| u.approval_status == ApprovalStatus::Approved)
            .collect();
        updates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        updates
    }
}

/// An update posted against a prayer.
///
/// `prayer_id` is a plain reference; updates are not owned by the prayer row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrayerUpdate {
    pub id: PrayerUpdateId,
    pub prayer_id: PrayerId,
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub author_email: Option<Email>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub mark_as_answered: bool,
    #[serde(default)]
    pub approval_status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
}

/// A prayer request submitted by an end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPrayer {
    pub title: String,
    pub prayer_for: String,
    pub description: String,
    pub requester: String,
    pub email: Option<Email>,
    pub is_anonymous: bool,
}

impl NewPrayer {
    /// Check required fields and length limits.
    ///
    /// # Errors
    ///
    /// Returns the first failing rule.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("title", &self.title, MAX_TITLE_LENGTH)?;
        require("prayer_for", &self.prayer_for, MAX_TITLE_LENGTH)?;
        require("description", &self.description, MAX_BODY_LENGTH)?;
        if !self.is_anonymous {
            require("requester", &self.requester, MAX_TITLE_LENGTH)?;
        }
        Ok(())
    }

    /// JSON row for insertion; new prayers are current and pending approval.
    #[must_use]
    pub fn insert_body(&self, now: DateTime<Utc>) -> Value {
        json!({
            "title": self.title.trim(),
            "prayer_for": self.prayer_for.trim(),
            "description": self.description.trim(),
            "requester": self.requester.trim(),
            "email": self.email.as_ref().map(Email::normalized),
            "is_anonymous": self.is_anonymous,
            "status": PrayerStatus::Current,
            "approval_status": ApprovalStatus::Pending,
            "date_requested": now,
        })
    }
}

/// An update submitted against an existing prayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPrayerUpdate {
    pub prayer_id: PrayerId,
    pub content: String,
    pub author: Option<String>,
    pub author_email: Option<Email>,
    pub is_anonymous: bool,
    pub mark_as_answered: bool,
}

impl NewPrayerUpdate {
    /// Check the update body.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is blank or too long.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("content", &self.content, MAX_BODY_LENGTH)
    }

    /// JSON row for insertion; new updates are pending approval.
    #[must_use]
    pub fn insert_body(&self) -> Value {
        json!({
            "prayer_id": self.prayer_id,
            "content": self.content.trim(),
            "author": self.author.as_deref().map(str::trim),
            "author_email": self.author_email.as_ref().map(Email::normalized),
            "is_anonymous": self.is_anonymous,
            "mark_as_answered": self.mark_as_answered,
            "approval_status": ApprovalStatus::Pending,
        })
    }
}

/// Partial admin edit of a prayer's text fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prayer_for: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PrayerEdit {
    /// Whether the edit changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.prayer_for.is_none() && self.description.is_none()
    }

    /// Check that provided fields are non-blank and within limits.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NothingToUpdate`] for an empty edit, or the
    /// first failing field rule.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::NothingToUpdate);
        }
        if let Some(title) = &self.title {
            require("title", title, MAX_TITLE_LENGTH)?;
        }
        if let Some(prayer_for) = &self.prayer_for {
            require("prayer_for", prayer_for, MAX_TITLE_LENGTH)?;
        }
        if let Some(description) = &self.description {
            require("description", description, MAX_BODY_LENGTH)?;
        }
        Ok(())
    }

    /// JSON patch body including the new `updated_at`.
    #[must_use]
    pub fn patch_body(&self, now: DateTime<Utc>) -> Value {
        let mut body = serde_json::Map::new();
        if let Some(title) = &self.title {
            body.insert("title".into(), Value::from(title.trim()));
        }
        if let Some(prayer_for) = &self.prayer_for {
            body.insert("prayer_for".into(), Value::from(prayer_for.trim()));
        }
        if let Some(description) = &self.description {
            body.insert("description".into(), Value::from(description.trim()));
        }
        body.insert("updated_at".into(), json!(now));
        Value::Object(body)
    }
}

fn require(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn new_prayer() -> NewPrayer {
        NewPrayer {
            title: "Healing for Mary".to_string(),
            prayer_for: "Mary".to_string(),
            description: "Recovering from surgery".to_string(),
            requester: "John".to_string(),
            email: Some(Email::parse("John@Example.com").unwrap()),
            is_anonymous: false,
        }
    }

    #[test]
    fn test_new_prayer_validates() {
        assert!(new_prayer().validate().is_ok());
    }

    #[test]
    fn test_new_prayer_blank_title() {
        let prayer = NewPrayer {
            title: "   ".to_string(),
            ..new_prayer()
        };
        assert!(matches!(
            prayer.validate(),
            Err(ValidationError::EmptyField("title"))
        ));
    }

    #[test]
    fn test_anonymous_prayer_needs_no_requester() {
        let prayer = NewPrayer {
            requester: String::new(),
            is_anonymous: true,
            ..new_prayer()
        };
        assert!(prayer.validate().is_ok());
    }

    #[test]
    fn test_description_too_long() {
        let prayer = NewPrayer {
            description: "x".repeat(MAX_BODY_LENGTH + 1),
            ..new_prayer()
        };
        assert!(matches!(
            prayer.validate(),
            Err(ValidationError::TooLong { field: "description", .. })
        ));
    }

    #[test]
    fn test_insert_body_enters_moderation() {
        let body = new_prayer().insert_body(Utc::now());
        assert_eq!(body["status"], "current");
        assert_eq!(body["approval_status"], "pending");
        assert_eq!(body["email"], "john@example.com");
    }

    #[test]
    fn test_prayer_deserializes_embedded_updates() {
        let json = r#"{
            "id": "8f14e45f-ceea-467a-9af0-2c1f6b4d3e21",
            "title": "Job search",
            "prayer_for": "Sam",
            "description": "Interviews this week",
            "requester": "Sam",
            "is_anonymous": true,
            "status": "answered",
            "approval_status": "approved",
            "created_at": "2024-01-01T00:00:00Z",
            "prayer_updates": [
                {
                    "id": "1c383cd3-0b7c-4d0e-9e2b-2f9b8b5f6a10",
                    "prayer_id": "8f14e45f-ceea-467a-9af0-2c1f6b4d3e21",
                    "content": "Got the job!",
                    "mark_as_answered": true,
                    "approval_status": "approved",
                    "created_at": "2024-01-05T00:00:00Z"
                },
                {
                    "id": "2d494de4-1c8d-4e1f-8f3c-3a0c9c6a7b21",
                    "prayer_id": "8f14e45f-ceea-467a-9af0-2c1f6b4d3e21",
                    "content": "pending note",
                    "created_at": "2024-01-06T00:00:00Z"
                }
            ]
        }"#;

        let prayer: Prayer = serde_json::from_str(json).unwrap();
        assert_eq!(prayer.status, PrayerStatus::Answered);
        assert_eq!(prayer.updates.len(), 2);
        assert_eq!(prayer.display_requester(), ANONYMOUS_NAME);

        let approved = prayer.approved_updates();
        assert_eq!(approved.len(), 1);
        assert!(approved.first().unwrap().mark_as_answered);
    }

    #[test]
    fn test_update_validation() {
        let update = NewPrayerUpdate {
            prayer_id: PrayerId::random(),
            content: String::new(),
            author: None,
            author_email: None,
            is_anonymous: false,
            mark_as_answered: false,
        };
        assert!(matches!(
            update.validate(),
            Err(ValidationError::EmptyField("content"))
        ));
    }

    #[test]
    fn test_empty_edit_rejected() {
        assert!(matches!(
            PrayerEdit::default().validate(),
            Err(ValidationError::NothingToUpdate)
        ));
    }

    #[test]
    fn test_edit_patch_body_only_has_changed_fields() {
        let edit = PrayerEdit {
            title: Some(" New title ".to_string()),
            ..PrayerEdit::default()
        };
        let body = edit.patch_body(Utc::now());
        assert_eq!(body["title"], "New title");
        assert!(body.get("description").is_none());
        assert!(body.get("updated_at").is_some());
    }
}
