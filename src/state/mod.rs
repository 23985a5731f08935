//! Convergence state of committed subscription set versions.
//!
//! Every commit produces a Pending version. Reports from the sync peer move
//! the current version to Complete or Error; a newer commit moves every
//! older version to Superseded.

mod tracker;

pub use tracker::{StateTracker, VersionState, DEFAULT_HISTORY_LEN};
