//! In-process sync peer.

use super::{SyncOutcome, SyncReport, SyncReporter, Upload};
use crate::store::Subscriptions;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// How the loopback peer answers uploads.
#[derive(Clone, Debug, Default)]
pub enum ServerPolicy {
    /// Acknowledge every upload.
    #[default]
    AcceptAll,
    /// Reject uploads containing a subscription on any of these types.
    RejectObjectTypes(Vec<String>),
}

impl ServerPolicy {
    /// Decide the outcome for an upload.
    pub fn evaluate(&self, upload: &Upload) -> SyncOutcome {
        match self {
            ServerPolicy::AcceptAll => SyncOutcome::Acknowledged,
            ServerPolicy::RejectObjectTypes(types) => {
                let rejected = upload
                    .subscriptions
                    .iter()
                    .find(|s| types.iter().any(|t| *t == s.object_type));
                match rejected {
                    Some(sub) => SyncOutcome::Rejected(format!(
                        "Client provided query with invalid object type: {}",
                        sub.object_type
                    )),
                    None => SyncOutcome::Acknowledged,
                }
            }
        }
    }
}

/// Loopback peer configuration.
#[derive(Clone, Debug, Default)]
pub struct LoopbackConfig {
    pub policy: ServerPolicy,

    /// Delay before answering each upload.
    /// Default: none
    pub latency: Duration,
}

/// A simulated sync peer answering uploads on a worker thread.
///
/// Stops when shut down, dropped, or when the lineage goes away.
pub struct LoopbackServer {
    stop: Sender<()>,
    worker: Option<JoinHandle<()>>,
    processed: Arc<AtomicU64>,
}

impl LoopbackServer {
    /// Start answering uploads of `subscriptions`.
    pub fn spawn(subscriptions: &Subscriptions, config: LoopbackConfig) -> Self {
        let uploads = subscriptions.uploads();
        let reporter = subscriptions.reporter();
        let (stop, stop_rx) = bounded(1);
        let processed = Arc::new(AtomicU64::new(0));

        let worker = {
            let processed = Arc::clone(&processed);
            thread::spawn(move || run(uploads, stop_rx, reporter, config, processed))
        };

        Self {
            stop,
            worker: Some(worker),
            processed,
        }
    }

    /// Number of uploads answered so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    /// Stop the worker and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn stop_worker(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

fn run(
    uploads: Receiver<Upload>,
    stop: Receiver<()>,
    reporter: SyncReporter,
    config: LoopbackConfig,
    processed: Arc<AtomicU64>,
) {
    loop {
        select! {
            recv(uploads) -> msg => {
                let Ok(upload) = msg else {
                    break;
                };
                if !config.latency.is_zero() {
                    thread::sleep(config.latency);
                }

                let outcome = config.policy.evaluate(&upload);
                debug!(version = upload.version.0, ?outcome, "loopback peer answering upload");
                reporter.report(SyncReport {
                    version: upload.version,
                    outcome,
                });
                processed.fetch_add(1, Ordering::SeqCst);
            }
            recv(stop) -> _ => break,
        }
    }
}
