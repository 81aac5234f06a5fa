//! Status enums for prayers and updates.
//!
//! The serialized forms are the strings stored in the backend's text
//! columns, so `Display` and `FromStr` round-trip through the same values.

use serde::{Deserialize, Serialize};

/// Where a prayer sits in its lifecycle.
///
/// Prayers are soft-removed (`Removed`) rather than deleted in most flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrayerStatus {
    #[default]
    Current,
    Answered,
    Archived,
    Removed,
}

impl PrayerStatus {
    /// Returns the wire string for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Answered => "answered",
            Self::Archived => "archived",
            Self::Removed => "removed",
        }
    }

    /// Whether prayers in this status are shown to end users.
    #[must_use]
    pub const fn is_visible(self) -> bool {
        !matches!(self, Self::Removed)
    }
}

impl std::fmt::Display for PrayerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PrayerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current" => Ok(Self::Current),
            "answered" => Ok(Self::Answered),
            "archived" => Ok(Self::Archived),
            "removed" => Ok(Self::Removed),
            _ => Err(format!("invalid prayer status: {s}")),
        }
    }
}

/// Moderation state of a submitted prayer or update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Denied,
}

impl ApprovalStatus {
    /// Returns the wire string for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            _ => Err(format!("invalid approval status: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_prayer_status_wire_strings() {
        for status in [
            PrayerStatus::Current,
            PrayerStatus::Answered,
            PrayerStatus::Archived,
            PrayerStatus::Removed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
            assert_eq!(status.as_str().parse::<PrayerStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_prayer_status_rejects_unknown() {
        assert!("deleted".parse::<PrayerStatus>().is_err());
        assert!("Current".parse::<PrayerStatus>().is_err());
    }

    #[test]
    fn test_removed_is_hidden() {
        assert!(PrayerStatus::Current.is_visible());
        assert!(PrayerStatus::Archived.is_visible());
        assert!(!PrayerStatus::Removed.is_visible());
    }

    #[test]
    fn test_approval_status_defaults_to_pending() {
        assert_eq!(ApprovalStatus::default(), ApprovalStatus::Pending);
        assert_eq!("denied".parse::<ApprovalStatus>().unwrap(), ApprovalStatus::Denied);
    }
}
