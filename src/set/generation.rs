//! A single generation (version) of a subscription set.
//!
//! Generations are immutable once published. A write-scope forks the current
//! generation, mutates the fork and publishes it as the next version. Entries
//! are reference counted so forking only copies the entry vector and index.

use super::index::QueryIndex;
use crate::error::{Result, SubscriptionError};
use crate::types::{
    derive_name, Subscription, SubscriptionId, SubscriptionOptions, Timestamp, Version,
};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub(crate) struct Generation {
    version: Version,
    entries: Vec<Arc<Subscription>>,
    index: QueryIndex,
}

impl Generation {
    /// The empty initial generation.
    pub(crate) fn empty() -> Self {
        Self::from_entries(Version(0), Vec::new())
    }

    /// Rebuild a generation from stored entries.
    pub(crate) fn from_entries(version: Version, entries: Vec<Subscription>) -> Self {
        let entries: Vec<Arc<Subscription>> = entries.into_iter().map(Arc::new).collect();
        let index = QueryIndex::build(&entries);
        Self {
            version,
            entries,
            index,
        }
    }

    /// Fork into the writable generation for the next version.
    pub(crate) fn fork(&self) -> Self {
        Self {
            version: self.version.next(),
            entries: self.entries.clone(),
            index: self.index.clone(),
        }
    }

    pub(crate) fn version(&self) -> Version {
        self.version
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get(&self, index: usize) -> Result<&Subscription> {
        self.entries
            .get(index)
            .map(|s| s.as_ref())
            .ok_or(SubscriptionError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            })
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Subscription> + '_ {
        self.entries.iter().map(|s| s.as_ref())
    }

    pub(crate) fn find_by_name(&self, name: &str) -> Option<&Subscription> {
        self.index.by_name(name).map(|pos| self.entries[pos].as_ref())
    }

    pub(crate) fn find_by_query(&self, object_type: &str, query: &str) -> Option<&Subscription> {
        self.index
            .by_query(object_type, query)
            .map(|pos| self.entries[pos].as_ref())
    }

    pub(crate) fn to_vec(&self) -> Vec<Subscription> {
        self.iter().cloned().collect()
    }

    // --- Mutation (writable forks only) ---

    /// Add a subscription, returning the existing one for a duplicate query.
    ///
    /// `query` must already be canonical. `next_id` is only called when a new
    /// entry is appended.
    pub(crate) fn add(
        &mut self,
        object_type: &str,
        query: &str,
        options: &SubscriptionOptions,
        next_id: impl FnOnce() -> SubscriptionId,
    ) -> Result<Subscription> {
        if let Some(pos) = self.index.by_query(object_type, query) {
            return Ok(self.entries[pos].as_ref().clone());
        }

        if let Some(ref name) = options.name {
            if let Some(pos) = self.index.by_name(name) {
                if !options.update_existing {
                    return Err(SubscriptionError::DuplicateName(name.clone()));
                }
                return Ok(self.replace_at(pos, object_type, query));
            }
        }

        let (name, named) = match options.name {
            Some(ref name) => (name.clone(), true),
            None => (derive_name(object_type, query), false),
        };

        // A user-chosen name may shadow a derived one.
        if self.index.by_name(&name).is_some() {
            return Err(SubscriptionError::DuplicateName(name));
        }

        let now = Timestamp::now();
        let sub = Subscription {
            id: next_id(),
            name,
            named,
            object_type: object_type.to_string(),
            query: query.to_string(),
            created_at: now,
            updated_at: now,
        };

        let pos = self.entries.len();
        self.index.insert(pos, &sub);
        self.entries.push(Arc::new(sub.clone()));
        Ok(sub)
    }

    fn replace_at(&mut self, pos: usize, object_type: &str, query: &str) -> Subscription {
        let old = Arc::clone(&self.entries[pos]);
        self.index.remove_query(&old);

        let sub = Subscription {
            id: old.id,
            name: old.name.clone(),
            named: true,
            object_type: object_type.to_string(),
            query: query.to_string(),
            created_at: old.created_at,
            updated_at: Timestamp::now_after(old.updated_at),
        };

        self.index.insert(pos, &sub);
        self.entries[pos] = Arc::new(sub.clone());
        sub
    }

    pub(crate) fn remove_by_name(&mut self, name: &str) -> bool {
        self.retain(|s| s.name != name) > 0
    }

    pub(crate) fn remove_by_id(&mut self, id: SubscriptionId) -> bool {
        self.retain(|s| s.id != id) > 0
    }

    pub(crate) fn remove_query(&mut self, object_type: &str, query: &str, remove_named: bool) -> usize {
        self.retain(|s| !(s.matches_query(object_type, query) && (remove_named || !s.named)))
    }

    pub(crate) fn remove_all_for_type(&mut self, object_type: &str, remove_named: bool) -> usize {
        self.retain(|s| !(s.object_type == object_type && (remove_named || !s.named)))
    }

    pub(crate) fn remove_all(&mut self, remove_named: bool) -> usize {
        self.retain(|s| !(remove_named || !s.named))
    }

    /// Keep entries matching `keep`; returns how many were removed.
    fn retain<F>(&mut self, keep: F) -> usize
    where
        F: Fn(&Subscription) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|s| keep(s.as_ref()));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.index = QueryIndex::build(&self.entries);
        }
        removed
    }
}
