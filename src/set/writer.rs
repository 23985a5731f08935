//! The writable generation handed to an update callback.

use super::generation::Generation;
use crate::error::Result;
use crate::query::QueryCanonicalizer;
use crate::types::{Subscription, SubscriptionId, SubscriptionOptions, Version};
use std::sync::atomic::{AtomicU64, Ordering};

/// A subscription set inside an open write-scope.
///
/// Only obtainable through [`Subscriptions::update`](crate::Subscriptions::update)
/// and friends; changes become visible when the callback returns `Ok`.
pub struct MutableSubscriptionSet<'a> {
    generation: Generation,
    canonicalizer: &'a dyn QueryCanonicalizer,
    next_id: &'a AtomicU64,
}

impl<'a> MutableSubscriptionSet<'a> {
    pub(crate) fn new(
        generation: Generation,
        canonicalizer: &'a dyn QueryCanonicalizer,
        next_id: &'a AtomicU64,
    ) -> Self {
        Self {
            generation,
            canonicalizer,
            next_id,
        }
    }

    pub(crate) fn into_generation(self) -> Generation {
        self.generation
    }

    /// Version this write-scope will commit as.
    pub fn version(&self) -> Version {
        self.generation.version()
    }

    pub fn is_readonly(&self) -> bool {
        false
    }

    pub fn len(&self) -> usize {
        self.generation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generation.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<&Subscription> {
        self.generation.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> + '_ {
        self.generation.iter()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Subscription> {
        self.generation.find_by_name(name)
    }

    pub fn find_by_query(&self, object_type: &str, query: &str) -> Option<&Subscription> {
        let query = self.canonicalizer.canonicalize(object_type, query);
        self.generation.find_by_query(object_type, &query)
    }

    /// Add an unnamed subscription.
    pub fn add(&mut self, object_type: &str, query: &str) -> Result<Subscription> {
        self.add_with(object_type, query, SubscriptionOptions::default())
    }

    /// Add a subscription.
    ///
    /// An identical `(object_type, query)` returns the existing entry
    /// untouched. A name collision replaces the named entry's query when
    /// `update_existing` is set and fails with `DuplicateName` otherwise.
    ///
    /// An unnamed add also fails with `DuplicateName` when its derived name is
    /// already taken by a user-named entry, whatever `update_existing` says.
    pub fn add_with(
        &mut self,
        object_type: &str,
        query: &str,
        options: SubscriptionOptions,
    ) -> Result<Subscription> {
        let query = self.canonicalizer.canonicalize(object_type, query);
        let next_id = self.next_id;
        self.generation.add(object_type, &query, &options, || {
            SubscriptionId(next_id.fetch_add(1, Ordering::SeqCst))
        })
    }

    /// Remove the subscription with the given name.
    pub fn remove_by_name(&mut self, name: &str) -> bool {
        self.generation.remove_by_name(name)
    }

    /// Remove a subscription by identity.
    pub fn remove(&mut self, subscription: &Subscription) -> bool {
        self.generation.remove_by_id(subscription.id)
    }

    /// Remove subscriptions for a query. Named ones are kept unless `remove_named`.
    pub fn remove_query(&mut self, object_type: &str, query: &str, remove_named: bool) -> usize {
        let query = self.canonicalizer.canonicalize(object_type, query);
        self.generation.remove_query(object_type, &query, remove_named)
    }

    /// Remove all subscriptions of a type. Named ones are kept unless `remove_named`.
    pub fn remove_all_for_type(&mut self, object_type: &str, remove_named: bool) -> usize {
        self.generation.remove_all_for_type(object_type, remove_named)
    }

    /// Remove all subscriptions. Named ones are kept unless `remove_named`.
    pub fn remove_all(&mut self, remove_named: bool) -> usize {
        self.generation.remove_all(remove_named)
    }
}

impl std::fmt::Debug for MutableSubscriptionSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutableSubscriptionSet")
            .field("version", &self.generation.version())
            .field("len", &self.generation.len())
            .finish()
    }
}
