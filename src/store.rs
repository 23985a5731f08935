//! The lineage owner tying generations, state tracking and persistence together.

use crate::error::{Result, SubscriptionError};
use crate::persist::{PersistedSet, SnapshotFile};
use crate::query::{QueryCanonicalizer, Verbatim};
use crate::set::{Generation, MutableSubscriptionSet, SubscriptionSet};
use crate::state::{StateTracker, VersionState, DEFAULT_HISTORY_LEN};
use crate::sync::{SyncOutcome, SyncReporter, Upload};
use crate::types::{SubscriptionState, Version};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Subscription store configuration.
#[derive(Clone, Debug)]
pub struct SubscriptionsConfig {
    /// Directory for the persisted snapshot (None = in-memory only).
    pub path: Option<PathBuf>,

    /// Number of committed versions whose state is retained.
    /// Default: 16
    pub history_len: usize,

    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Canonicalizes query text before matching.
    pub canonicalizer: Arc<dyn QueryCanonicalizer>,
}

impl Default for SubscriptionsConfig {
    fn default() -> Self {
        Self {
            path: None,
            history_len: DEFAULT_HISTORY_LEN,
            create_if_missing: true,
            canonicalizer: Arc::new(Verbatim),
        }
    }
}

impl SubscriptionsConfig {
    /// Persist under `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_canonicalizer(mut self, canonicalizer: impl QueryCanonicalizer + 'static) -> Self {
        self.canonicalizer = Arc::new(canonicalizer);
        self
    }
}

/// State shared by the owner, its snapshots and its reporters.
pub(crate) struct Shared {
    config: SubscriptionsConfig,

    /// The current generation. Replaced wholesale on commit.
    current: RwLock<Arc<Generation>>,

    /// Held for the duration of a write-scope.
    write_gate: Mutex<()>,

    tracker: StateTracker,

    next_id: AtomicU64,

    /// Outbound feeds of committed generations.
    upload_senders: RwLock<Vec<Sender<Upload>>>,

    /// Also serializes commit against state persistence.
    snapshot: Option<Mutex<SnapshotFile>>,
}

impl Shared {
    pub(crate) fn current(&self) -> Arc<Generation> {
        self.current.read().clone()
    }

    pub(crate) fn canonicalize(&self, object_type: &str, query: &str) -> String {
        self.config.canonicalizer.canonicalize(object_type, query)
    }

    pub(crate) fn state_of(&self, version: Version) -> VersionState {
        self.tracker.get(version)
    }

    pub(crate) async fn wait(
        &self,
        version: Version,
        cancel: Option<&tokio_util::sync::CancellationToken>,
    ) -> Result<()> {
        self.tracker.wait(version, cancel).await
    }

    /// Run a write-scope.
    ///
    /// With `expected` set, the write only proceeds if that version is still
    /// current.
    pub(crate) fn update<F, E>(
        self: &Arc<Self>,
        expected: Option<Version>,
        f: F,
    ) -> std::result::Result<SubscriptionSet, E>
    where
        F: FnOnce(&mut MutableSubscriptionSet<'_>) -> std::result::Result<(), E>,
        E: From<SubscriptionError>,
    {
        let _gate = self.write_gate.try_lock().ok_or_else(|| {
            SubscriptionError::invalid_state("subscription set is already being updated")
        })?;

        let base = self.current();
        if let Some(expected) = expected {
            if expected != base.version() {
                return Err(SubscriptionError::invalid_state(format!(
                    "subscription set version {} was superseded by version {}",
                    expected,
                    base.version()
                ))
                .into());
            }
        }

        debug!(base = base.version().0, "opening subscription write scope");

        let mut writer = MutableSubscriptionSet::new(
            base.fork(),
            self.config.canonicalizer.as_ref(),
            &self.next_id,
        );

        if let Err(e) = f(&mut writer) {
            debug!(base = base.version().0, "rolling back subscription write scope");
            return Err(e);
        }

        let generation = Arc::new(writer.into_generation());
        let version = generation.version();

        {
            let snapshot = self.snapshot.as_ref().map(|s| s.lock());
            if let Some(file) = snapshot.as_deref() {
                let pending = VersionState::new(version, SubscriptionState::Pending, None);
                if let Err(e) = file.write(&self.persisted(&generation, &pending)) {
                    warn!(version = version.0, error = %e, "failed to persist subscription set");
                    return Err(e.into());
                }
            }

            // Readers must never see the new generation without its state.
            let mut current = self.current.write();
            self.tracker.commit(version);
            *current = Arc::clone(&generation);
        }

        debug!(
            version = version.0,
            count = generation.len(),
            "committed subscription write scope"
        );

        self.publish(&generation);
        Ok(SubscriptionSet::new(generation, Arc::clone(self)))
    }

    /// Apply a report from the sync peer.
    pub(crate) fn apply_report(&self, version: Version, outcome: SyncOutcome) -> bool {
        let changed = match outcome {
            SyncOutcome::Acknowledged => self.tracker.acknowledge(version),
            SyncOutcome::Rejected(message) => self.tracker.reject(version, message),
        };

        if changed {
            self.persist_current();
        }
        changed
    }

    fn persist_current(&self) {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return;
        };
        let file = snapshot.lock();
        let generation = self.current();
        let state = self.tracker.get(generation.version());

        if let Err(e) = file.write(&self.persisted(&generation, &state)) {
            warn!(
                version = generation.version().0,
                error = %e,
                "failed to persist subscription state"
            );
        }
    }

    fn persisted(&self, generation: &Generation, state: &VersionState) -> PersistedSet {
        PersistedSet {
            version: generation.version(),
            next_id: self.next_id.load(Ordering::SeqCst),
            state: state.state,
            error: state.error.clone(),
            subscriptions: generation.to_vec(),
        }
    }

    fn publish(&self, generation: &Generation) {
        let mut senders = self.upload_senders.write();
        if senders.is_empty() {
            return;
        }

        let upload = Upload {
            version: generation.version(),
            subscriptions: generation.to_vec(),
        };
        senders.retain(|tx| tx.send(upload.clone()).is_ok());
    }

    fn subscribe_uploads(&self) -> Receiver<Upload> {
        let (tx, rx) = unbounded();

        // Re-send the current version if it still awaits the server.
        let generation = self.current();
        if self.tracker.get(generation.version()).state == SubscriptionState::Pending {
            let _ = tx.send(Upload {
                version: generation.version(),
                subscriptions: generation.to_vec(),
            });
        }

        self.upload_senders.write().push(tx);
        rx
    }
}

/// Owner of a subscription set lineage.
///
/// Hands out read-only [`SubscriptionSet`] snapshots and is the single place
/// where new versions are committed. Cheap to clone; clones share the lineage.
#[derive(Clone)]
pub struct Subscriptions {
    shared: Arc<Shared>,
}

impl Subscriptions {
    /// An in-memory lineage starting at the empty version 0.
    pub fn in_memory() -> Self {
        Self::from_parts(SubscriptionsConfig::default(), None, None)
    }

    /// Open a lineage with the given configuration.
    ///
    /// With a `path`, the last committed version is restored from disk and
    /// the directory is locked for exclusive use.
    pub fn open(config: SubscriptionsConfig) -> Result<Self> {
        let Some(path) = config.path.clone() else {
            return Ok(Self::from_parts(config, None, None));
        };

        let (file, stored) = SnapshotFile::open(&path, config.create_if_missing)?;
        if let Some(ref set) = stored {
            info!(
                path = %path.display(),
                version = set.version.0,
                count = set.subscriptions.len(),
                state = %set.state,
                "restored subscription set"
            );
        }

        Ok(Self::from_parts(config, Some(file), stored))
    }

    fn from_parts(
        config: SubscriptionsConfig,
        snapshot: Option<SnapshotFile>,
        stored: Option<PersistedSet>,
    ) -> Self {
        let (generation, state, next_id) = match stored {
            Some(set) => {
                // A stored Superseded state cannot be current.
                let state = match set.state {
                    SubscriptionState::Superseded => SubscriptionState::Pending,
                    other => other,
                };
                (
                    Generation::from_entries(set.version, set.subscriptions),
                    VersionState::new(set.version, state, set.error),
                    set.next_id,
                )
            }
            None => (
                Generation::empty(),
                VersionState::new(Version(0), SubscriptionState::Complete, None),
                1,
            ),
        };

        let tracker = StateTracker::new(state, config.history_len);

        Self {
            shared: Arc::new(Shared {
                config,
                current: RwLock::new(Arc::new(generation)),
                write_gate: Mutex::new(()),
                tracker,
                next_id: AtomicU64::new(next_id),
                upload_senders: RwLock::new(Vec::new()),
                snapshot: snapshot.map(Mutex::new),
            }),
        }
    }

    /// The current read-only subscription set.
    pub fn current(&self) -> SubscriptionSet {
        SubscriptionSet::new(self.shared.current(), Arc::clone(&self.shared))
    }

    /// Current version.
    pub fn version(&self) -> Version {
        self.shared.current().version()
    }

    /// State of a committed version.
    pub fn state_of(&self, version: Version) -> VersionState {
        self.shared.state_of(version)
    }

    /// Mutate the subscription set inside a write-scope.
    ///
    /// On `Ok` the changes commit as a new Pending version and the new current
    /// set is returned. On `Err` (or panic) nothing changes. Fails with
    /// `InvalidState` if another write-scope is open on this lineage.
    pub fn update<F>(&self, f: F) -> Result<SubscriptionSet>
    where
        F: FnOnce(&mut MutableSubscriptionSet<'_>) -> Result<()>,
    {
        self.shared.update(None, f)
    }

    /// Like [`update`](Self::update) with a caller-defined error type.
    pub fn try_update<F, E>(&self, f: F) -> std::result::Result<SubscriptionSet, E>
    where
        F: FnOnce(&mut MutableSubscriptionSet<'_>) -> std::result::Result<(), E>,
        E: From<SubscriptionError>,
    {
        self.shared.update(None, f)
    }

    /// [`update`](Self::update), first yielding to the tokio scheduler when
    /// called from inside a runtime.
    pub async fn update_async<F>(&self, f: F) -> Result<SubscriptionSet>
    where
        F: FnOnce(&mut MutableSubscriptionSet<'_>) -> Result<()>,
    {
        yield_to_runtime().await;
        self.update(f)
    }

    /// Handle for reporting server outcomes for committed versions.
    pub fn reporter(&self) -> SyncReporter {
        SyncReporter::new(Arc::downgrade(&self.shared))
    }

    /// Feed of committed generations for the sync peer.
    ///
    /// If the current version is still Pending it is sent first.
    pub fn uploads(&self) -> Receiver<Upload> {
        self.shared.subscribe_uploads()
    }

    pub fn config(&self) -> &SubscriptionsConfig {
        &self.shared.config
    }

    /// Snapshot directory, if persistent.
    pub fn path(&self) -> Option<&Path> {
        self.shared.config.path.as_deref()
    }
}

impl std::fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriptions")
            .field("version", &self.version())
            .field("tracker", &self.shared.tracker)
            .field("path", &self.shared.config.path)
            .finish()
    }
}

pub(crate) async fn yield_to_runtime() {
    if tokio::runtime::Handle::try_current().is_ok() {
        tokio::task::yield_now().await;
    }
}
