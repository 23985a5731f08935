//! Lookup index over the entries of a generation.

use crate::types::Subscription;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps names and `(object_type, query)` pairs to entry positions.
#[derive(Clone, Debug, Default)]
pub(crate) struct QueryIndex {
    by_name: HashMap<String, usize>,
    /// object_type -> query -> position
    by_query: HashMap<String, HashMap<String, usize>>,
}

impl QueryIndex {
    pub(crate) fn build(entries: &[Arc<Subscription>]) -> Self {
        let mut index = Self::default();
        for (pos, sub) in entries.iter().enumerate() {
            index.insert(pos, sub);
        }
        index
    }

    pub(crate) fn insert(&mut self, pos: usize, sub: &Subscription) {
        self.by_name.insert(sub.name.clone(), pos);
        self.by_query
            .entry(sub.object_type.clone())
            .or_default()
            .insert(sub.query.clone(), pos);
    }

    /// Drop the query key of an entry (its name mapping is kept).
    pub(crate) fn remove_query(&mut self, sub: &Subscription) {
        if let Some(queries) = self.by_query.get_mut(&sub.object_type) {
            queries.remove(&sub.query);
            if queries.is_empty() {
                self.by_query.remove(&sub.object_type);
            }
        }
    }

    pub(crate) fn by_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn by_query(&self, object_type: &str, query: &str) -> Option<usize> {
        self.by_query.get(object_type)?.get(query).copied()
    }
}
