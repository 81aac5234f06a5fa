//! Domain services built on the [`Backend`](crate::backend::Backend) seam.

pub mod planning_center;
pub mod prayers;

pub use planning_center::{LookupResult, Person, PlanningCenter, PlanningCenterError};
pub use prayers::{PrayerError, PrayerService};
