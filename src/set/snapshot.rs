//! Read-only subscription set snapshots.

use super::generation::Generation;
use super::writer::MutableSubscriptionSet;
use crate::error::{Result, SubscriptionError};
use crate::store::{yield_to_runtime, Shared};
use crate::types::{Subscription, SubscriptionState, Version};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// An immutable snapshot of one subscription set version.
///
/// Snapshots can be shared freely across threads. The state reported by
/// [`state`](Self::state) is live: it follows the server's reports for this
/// version.
#[derive(Clone)]
pub struct SubscriptionSet {
    generation: Arc<Generation>,
    owner: Arc<Shared>,
}

impl SubscriptionSet {
    pub(crate) fn new(generation: Arc<Generation>, owner: Arc<Shared>) -> Self {
        Self { generation, owner }
    }

    pub fn version(&self) -> Version {
        self.generation.version()
    }

    pub fn len(&self) -> usize {
        self.generation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generation.len() == 0
    }

    /// Subscription at `index` in insertion order.
    pub fn get(&self, index: usize) -> Result<&Subscription> {
        self.generation.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> + '_ {
        self.generation.iter()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Subscription> {
        self.generation.find_by_name(name)
    }

    /// Find the subscription whose canonical query equals `query`'s.
    pub fn find_by_query(&self, object_type: &str, query: &str) -> Option<&Subscription> {
        let query = self.owner.canonicalize(object_type, query);
        self.generation.find_by_query(object_type, &query)
    }

    pub fn state(&self) -> SubscriptionState {
        self.owner.state_of(self.version()).state
    }

    /// Server error, only present in the `Error` state.
    pub fn error(&self) -> Option<String> {
        self.owner.state_of(self.version()).error
    }

    /// Snapshots are always read-only.
    pub fn is_readonly(&self) -> bool {
        true
    }

    /// Whether this snapshot is still the lineage's current version.
    pub fn is_current(&self) -> bool {
        self.owner.current().version() == self.version()
    }

    /// Run a write-scope based on this snapshot and replace it with the
    /// committed result.
    ///
    /// Fails with `InvalidState` if this snapshot is no longer current or
    /// another write-scope is open.
    pub fn update<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut MutableSubscriptionSet<'_>) -> Result<()>,
    {
        let next = self.owner.update(Some(self.version()), f)?;
        *self = next;
        Ok(())
    }

    /// Like [`update`](Self::update) with a caller-defined error type.
    pub fn try_update<F, E>(&mut self, f: F) -> std::result::Result<(), E>
    where
        F: FnOnce(&mut MutableSubscriptionSet<'_>) -> std::result::Result<(), E>,
        E: From<SubscriptionError>,
    {
        let next = self.owner.update(Some(self.version()), f)?;
        *self = next;
        Ok(())
    }

    /// [`update`](Self::update), first yielding to the tokio scheduler when
    /// called from inside a runtime.
    pub async fn update_async<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut MutableSubscriptionSet<'_>) -> Result<()>,
    {
        yield_to_runtime().await;
        self.update(f)
    }

    /// Wait until the server has converged on this version.
    ///
    /// Returns immediately unless the version is Pending. Fails with
    /// `Subscription` if the server rejected it and `InvalidState` if a newer
    /// version superseded it.
    pub async fn wait_for_synchronization(&self) -> Result<()> {
        self.owner.wait(self.version(), None).await
    }

    /// [`wait_for_synchronization`](Self::wait_for_synchronization) that
    /// resolves with `Cancelled` once `cancel` fires.
    pub async fn wait_for_synchronization_with(&self, cancel: &CancellationToken) -> Result<()> {
        self.owner.wait(self.version(), Some(cancel)).await
    }

    /// JSON rendering for diagnostics.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let state = self.owner.state_of(self.version());
        let subscriptions = serde_json::to_value(self.generation.to_vec())?;

        Ok(json!({
            "version": self.version().0,
            "state": state.state,
            "error": state.error,
            "subscriptions": subscriptions,
        }))
    }
}

impl std::fmt::Debug for SubscriptionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionSet")
            .field("version", &self.version())
            .field("state", &self.state())
            .field("subscriptions", &self.generation.to_vec())
            .finish()
    }
}
