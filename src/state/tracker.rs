//! Per-version convergence state tracking.

use crate::error::{Result, SubscriptionError};
use crate::types::{SubscriptionState, Version};
use parking_lot::RwLock;
use std::collections::VecDeque;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default number of versions whose state is retained.
pub const DEFAULT_HISTORY_LEN: usize = 16;

/// State of one committed version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionState {
    pub version: Version,
    pub state: SubscriptionState,
    /// Server-supplied message, only set in `Error`.
    pub error: Option<String>,
}

impl VersionState {
    pub fn new(version: Version, state: SubscriptionState, error: Option<String>) -> Self {
        Self {
            version,
            state,
            error,
        }
    }

    fn pending(version: Version) -> Self {
        Self::new(version, SubscriptionState::Pending, None)
    }
}

/// Tracks the lifecycle of committed versions in a fixed-size ring.
///
/// The newest slot is the current version. Versions that fell off the ring
/// read as `Superseded`.
pub struct StateTracker {
    slots: RwLock<VecDeque<VersionState>>,
    capacity: usize,
    /// Bumped on every transition; waiters re-check their version on change.
    changes: watch::Sender<u64>,
}

impl StateTracker {
    /// Create a tracker whose current version is `initial`.
    pub fn new(initial: VersionState, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = VecDeque::with_capacity(capacity);
        slots.push_back(initial);
        let (changes, _) = watch::channel(0);

        Self {
            slots: RwLock::new(slots),
            capacity,
            changes,
        }
    }

    /// Current version and its state.
    pub fn current(&self) -> VersionState {
        let slots = self.slots.read();
        slots
            .back()
            .cloned()
            .unwrap_or_else(|| VersionState::new(Version(0), SubscriptionState::Complete, None))
    }

    /// State of a version.
    pub fn get(&self, version: Version) -> VersionState {
        let slots = self.slots.read();
        slots
            .iter()
            .find(|s| s.version == version)
            .cloned()
            .unwrap_or_else(|| VersionState::new(version, SubscriptionState::Superseded, None))
    }

    /// Record a new committed version: it becomes current and Pending, every
    /// older version becomes Superseded.
    pub fn commit(&self, version: Version) {
        {
            let mut slots = self.slots.write();
            for slot in slots.iter_mut() {
                slot.state = SubscriptionState::Superseded;
                slot.error = None;
            }
            slots.push_back(VersionState::pending(version));
            while slots.len() > self.capacity {
                slots.pop_front();
            }
        }
        debug!(version = version.0, "subscription set version pending");
        self.notify();
    }

    /// Server acknowledged `version`. Returns whether a transition happened.
    pub fn acknowledge(&self, version: Version) -> bool {
        self.transition(version, SubscriptionState::Complete, None)
    }

    /// Server rejected `version`. Returns whether a transition happened.
    pub fn reject(&self, version: Version, message: impl Into<String>) -> bool {
        self.transition(version, SubscriptionState::Error, Some(message.into()))
    }

    fn transition(&self, version: Version, to: SubscriptionState, error: Option<String>) -> bool {
        {
            let mut slots = self.slots.write();
            let Some(current) = slots.back_mut() else {
                return false;
            };
            if current.version != version || current.state != SubscriptionState::Pending {
                debug!(
                    version = version.0,
                    current = current.version.0,
                    state = %current.state,
                    "ignoring report for non-pending version"
                );
                return false;
            }
            current.state = to;
            current.error = error;
        }
        info!(version = version.0, state = %to, "subscription set version converged");
        self.notify();
        true
    }

    fn notify(&self) {
        self.changes.send_modify(|n| *n = n.wrapping_add(1));
    }

    /// Wait until `version` leaves Pending.
    ///
    /// Resolves `Ok` on Complete, `Subscription` on Error, `InvalidState` on
    /// Superseded and `Cancelled` if `cancel` fires first. Cancellation does
    /// not touch the tracked state.
    pub async fn wait(&self, version: Version, cancel: Option<&CancellationToken>) -> Result<()> {
        let mut changes = self.changes.subscribe();

        loop {
            let slot = self.get(version);
            match slot.state {
                SubscriptionState::Complete => return Ok(()),
                SubscriptionState::Error => {
                    return Err(SubscriptionError::Subscription(
                        slot.error.unwrap_or_default(),
                    ))
                }
                SubscriptionState::Superseded => {
                    return Err(SubscriptionError::invalid_state(format!(
                        "subscription set version {} was superseded",
                        version
                    )))
                }
                SubscriptionState::Pending => {}
            }

            let changed = match cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(SubscriptionError::Cancelled),
                        changed = changes.changed() => changed,
                    }
                }
                None => changes.changed().await,
            };

            if changed.is_err() {
                return Err(SubscriptionError::invalid_state(
                    "subscription set owner was dropped",
                ));
            }
        }
    }
}

impl std::fmt::Debug for StateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateTracker")
            .field("current", &self.current())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn tracker() -> StateTracker {
        StateTracker::new(
            VersionState::new(Version(0), SubscriptionState::Complete, None),
            DEFAULT_HISTORY_LEN,
        )
    }

    #[test]
    fn test_commit_supersedes_older_versions() {
        let tracker = tracker();
        tracker.commit(Version(1));
        tracker.acknowledge(Version(1));
        tracker.commit(Version(2));

        assert_eq!(tracker.get(Version(0)).state, SubscriptionState::Superseded);
        assert_eq!(tracker.get(Version(1)).state, SubscriptionState::Superseded);
        assert_eq!(tracker.get(Version(2)).state, SubscriptionState::Pending);
        assert_eq!(tracker.current().version, Version(2));
    }

    #[test]
    fn test_reports_only_move_current_pending() {
        let tracker = tracker();
        tracker.commit(Version(1));
        tracker.commit(Version(2));

        assert!(!tracker.acknowledge(Version(1)));
        assert!(!tracker.reject(Version(3), "unknown"));
        assert!(tracker.reject(Version(2), "bad query"));
        assert!(!tracker.acknowledge(Version(2)));

        let current = tracker.current();
        assert_eq!(current.state, SubscriptionState::Error);
        assert_eq!(current.error.as_deref(), Some("bad query"));
    }

    #[test]
    fn test_ring_evicts_old_versions() {
        let tracker = StateTracker::new(
            VersionState::new(Version(0), SubscriptionState::Complete, None),
            2,
        );
        for v in 1..=5 {
            tracker.commit(Version(v));
        }
        assert_eq!(tracker.slots.read().len(), 2);
        assert_eq!(tracker.get(Version(1)).state, SubscriptionState::Superseded);
        assert_eq!(tracker.get(Version(5)).state, SubscriptionState::Pending);
    }

    #[tokio::test]
    async fn test_wait_resolves_on_ack() {
        let tracker = Arc::new(tracker());
        tracker.commit(Version(1));

        let waiter = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.wait(Version(1), None).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        tracker.acknowledge(Version(1));

        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_wait_cancelled_keeps_state() {
        let tracker = tracker();
        tracker.commit(Version(1));
        let token = CancellationToken::new();
        token.cancel();

        let result = tracker.wait(Version(1), Some(&token)).await;
        assert!(matches!(result, Err(SubscriptionError::Cancelled)));
        assert_eq!(tracker.get(Version(1)).state, SubscriptionState::Pending);
    }
}
