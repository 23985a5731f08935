//! Core types for subscription sets.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a subscription. Never reused within a lineage.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version of a subscription set. Bumped exactly once per committed write.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Version(pub u64);

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Version {
    pub fn next(self) -> Self {
        Version(self.0 + 1)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }

    /// Current time, but strictly after `prev`.
    pub fn now_after(prev: Timestamp) -> Self {
        let now = Self::now();
        if now > prev {
            now
        } else {
            Timestamp(prev.0 + 1)
        }
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Lifecycle state of a committed subscription set version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Committed locally, not yet acknowledged by the server.
    Pending,
    /// Server acknowledged the version and delivered its data.
    Complete,
    /// Server rejected the version.
    Error,
    /// A later version became current.
    Superseded,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubscriptionState::Pending => "pending",
            SubscriptionState::Complete => "complete",
            SubscriptionState::Error => "error",
            SubscriptionState::Superseded => "superseded",
        };
        f.write_str(s)
    }
}

/// A single subscription: interest in all objects of a type matching a query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,

    /// User-supplied name, or one derived from the query.
    pub name: String,

    /// Whether `name` was supplied by the user.
    pub named: bool,

    /// Schema type the query ranges over.
    pub object_type: String,

    /// Canonical query text.
    pub query: String,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Whether the name was given explicitly rather than derived.
    pub fn is_named(&self) -> bool {
        self.named
    }

    pub(crate) fn matches_query(&self, object_type: &str, query: &str) -> bool {
        self.object_type == object_type && self.query == query
    }
}

/// Options for adding a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionOptions {
    /// Explicit name (None = derive from the query).
    pub name: Option<String>,

    /// Replace the query of an existing subscription with the same name.
    /// Default: true
    pub update_existing: bool,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            name: None,
            update_existing: true,
        }
    }
}

impl SubscriptionOptions {
    /// Options with an explicit name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_update_existing(mut self, update_existing: bool) -> Self {
        self.update_existing = update_existing;
        self
    }
}

/// Derive a stable name for an unnamed subscription.
pub fn derive_name(object_type: &str, query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(object_type.as_bytes());
    hasher.update([0u8]);
    hasher.update(query.as_bytes());
    let digest = hasher.finalize();
    format!("{}:{}", object_type, hex::encode(&digest[..8]))
}
