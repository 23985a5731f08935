//! # Flexible Sync Subscription Sets
//!
//! A client-side, versioned collection of query subscriptions whose
//! convergence with a sync server is tracked per version.
//!
//! ## Core Concepts
//!
//! - **Subscriptions**: Named declarations of interest in objects of a type
//!   matching a query
//! - **Generations**: Every committed write produces a new immutable version
//! - **Write-scopes**: All mutation happens inside `update`, which commits on
//!   success and rolls back on error
//! - **Convergence**: Each version moves from Pending to Complete, Error or
//!   Superseded as the server reports back
//!
//! ## Example
//!
//! ```ignore
//! use flexsync::{Subscriptions, SubscriptionOptions};
//!
//! let subs = Subscriptions::in_memory();
//!
//! let set = subs.update(|s| {
//!     s.add("Dog", "age > 3")?;
//!     s.add_with("Cat", "color == 'black'", SubscriptionOptions::named("black-cats"))?;
//!     Ok(())
//! })?;
//!
//! // Later, once the server has acknowledged the version
//! set.wait_for_synchronization().await?;
//! ```

pub mod error;
pub mod persist;
pub mod query;
pub mod set;
pub mod state;
pub mod store;
pub mod sync;
pub mod types;

// Re-exports
pub use error::{Result, SubscriptionError};
pub use persist::{PersistedSet, SnapshotFile};
pub use query::{CollapseWhitespace, QueryCanonicalizer, Verbatim};
pub use set::{MutableSubscriptionSet, SubscriptionSet};
pub use state::{StateTracker, VersionState, DEFAULT_HISTORY_LEN};
pub use store::{Subscriptions, SubscriptionsConfig};
pub use sync::{
    LoopbackConfig, LoopbackServer, ServerPolicy, SyncOutcome, SyncReport, SyncReporter, Upload,
};
pub use types::*;

pub use tokio_util::sync::CancellationToken;
