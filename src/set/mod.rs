//! Versioned subscription sets.
//!
//! A lineage is a chain of immutable generations. Readers hold
//! [`SubscriptionSet`] snapshots of a generation; writers get a
//! [`MutableSubscriptionSet`] fork inside a write-scope, which becomes the next
//! generation when the scope commits.

mod generation;
mod index;
mod snapshot;
mod writer;

pub(crate) use generation::Generation;
pub use snapshot::SubscriptionSet;
pub use writer::MutableSubscriptionSet;
