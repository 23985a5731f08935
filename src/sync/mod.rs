//! Plumbing between a subscription lineage and its sync peer.
//!
//! Outbound, every committed generation is published as an [`Upload`] on the
//! channels handed out by [`Subscriptions::uploads`](crate::Subscriptions::uploads).
//! Inbound, the peer reports the outcome for a version through a
//! [`SyncReporter`]. [`LoopbackServer`] is an in-process peer wiring the two
//! together.

mod loopback;

pub use loopback::{LoopbackConfig, LoopbackServer, ServerPolicy};

use crate::store::Shared;
use crate::types::{Subscription, Version};
use serde::{Deserialize, Serialize};
use std::sync::Weak;

/// A committed generation sent to the sync peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    pub version: Version,
    pub subscriptions: Vec<Subscription>,
}

/// Server outcome for a committed version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Acknowledged and data delivered.
    Acknowledged,
    /// Rejected with a server message.
    Rejected(String),
}

/// A report from the sync peer, keyed by version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub version: Version,
    pub outcome: SyncOutcome,
}

/// Delivers sync peer reports to a lineage.
///
/// Holds only a weak reference; reports after the owner is gone are dropped.
#[derive(Clone)]
pub struct SyncReporter {
    owner: Weak<Shared>,
}

impl SyncReporter {
    pub(crate) fn new(owner: Weak<Shared>) -> Self {
        Self { owner }
    }

    /// Apply a report. Returns whether it changed the version's state.
    ///
    /// Only the current, Pending version can transition; anything else is
    /// ignored.
    pub fn report(&self, report: SyncReport) -> bool {
        match self.owner.upgrade() {
            Some(owner) => owner.apply_report(report.version, report.outcome),
            None => false,
        }
    }

    pub fn acknowledge(&self, version: Version) -> bool {
        self.report(SyncReport {
            version,
            outcome: SyncOutcome::Acknowledged,
        })
    }

    pub fn reject(&self, version: Version, message: impl Into<String>) -> bool {
        self.report(SyncReport {
            version,
            outcome: SyncOutcome::Rejected(message.into()),
        })
    }

    /// Whether the lineage still exists.
    pub fn is_connected(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

impl std::fmt::Debug for SyncReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncReporter")
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Subscriptions;
    use crate::types::SubscriptionState;

    #[test]
    fn test_reporter_outlives_owner() {
        let subs = Subscriptions::in_memory();
        let reporter = subs.reporter();
        assert!(reporter.is_connected());

        drop(subs);
        assert!(!reporter.is_connected());
        assert!(!reporter.acknowledge(Version(1)));
    }

    #[test]
    fn test_report_moves_current_version() {
        let subs = Subscriptions::in_memory();
        let reporter = subs.reporter();
        let set = subs
            .update(|s| {
                s.add("Dog", "age > 3")?;
                Ok(())
            })
            .unwrap();

        assert!(reporter.report(SyncReport {
            version: set.version(),
            outcome: SyncOutcome::Acknowledged,
        }));
        assert_eq!(set.state(), SubscriptionState::Complete);
        assert!(!reporter.reject(set.version(), "too late"));
        assert_eq!(set.error(), None);
    }

    #[test]
    fn test_outcome_serialization() {
        let report = SyncReport {
            version: Version(2),
            outcome: SyncOutcome::Rejected("bad".into()),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["outcome"]["type"], "rejected");
        assert_eq!(value["outcome"]["message"], "bad");
    }
}
