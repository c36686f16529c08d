use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::parse::FeedParser;
use super::parse::Snapshot;
use super::source::FeedSource;

/// How often a waiting `update` re-checks for a completed fetch
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// State shared between the polling task (sole writer) and readers
struct Shared {
    snapshot: Mutex<Arc<Snapshot>>,
    /// Set after every completed fetch attempt, cleared by `update`
    available: AtomicBool,
}

impl Shared {
    fn current(&self) -> Arc<Snapshot> {
        match self.snapshot.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        match self.snapshot.lock() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }
}

/// Result of [`AsyncDataRefresher::update`]
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// A snapshot different from the last one handed out
    Updated(Arc<Snapshot>),
    /// Nothing new since the last check
    Unchanged,
}

/// Read-only handle to the latest snapshot, for any number of readers
#[derive(Clone)]
pub struct SnapshotReader(Arc<Shared>);

impl SnapshotReader {
    pub fn latest(&self) -> Arc<Snapshot> {
        self.0.current()
    }
}

/// Polls the remote feed in a background task
///
/// Snapshots are swapped in whole behind a mutex, so a reader only ever sees
/// a complete snapshot. A failed fetch keeps the previous snapshot.
pub struct AsyncDataRefresher {
    shared: Arc<Shared>,
    last_seen: Arc<Snapshot>,
    stop_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncDataRefresher {
    /// Spawn the polling task. The first fetch starts immediately.
    pub fn start(source: Arc<dyn FeedSource>, parser: FeedParser, period: Duration) -> Self {
        let initial = Arc::new(Snapshot::default());
        let shared = Arc::new(Shared {
            snapshot: Mutex::new(initial.clone()),
            available: AtomicBool::new(false),
        });
        let (stop_tx, stop_rx) = oneshot::channel();

        let worker = tokio::spawn(Self::poll_task(source, parser, period, shared.clone(), stop_rx));

        Self {
            shared,
            last_seen: initial,
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        }
    }

    async fn poll_task(
        source: Arc<dyn FeedSource>,
        parser: FeedParser,
        period: Duration,
        shared: Arc<Shared>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = interval.tick() => {}
            }

            info!("Refreshing feed data");
            let result = tokio::select! {
                _ = &mut stop_rx => break,
                result = source.fetch() => result,
            };

            match result.and_then(|payload| parser.parse(&payload)) {
                Ok(snapshot) => {
                    debug!("Feed refreshed with {} locations", snapshot.spaces.len());
                    shared.replace(snapshot);
                }
                Err(e) => warn!("Failed to refresh feed, keeping previous data: {}", e),
            }
            shared.available.store(true, Ordering::Release);
        }

        debug!("Feed polling task exiting");
    }

    /// Check for a new snapshot
    ///
    /// With `wait` set, sleeps until a fetch attempt has completed since the
    /// last check. Otherwise returns immediately.
    pub async fn update(&mut self, wait: bool) -> UpdateOutcome {
        if wait {
            debug!("Waiting for feed data to be fetched");
            while !self.shared.available.swap(false, Ordering::AcqRel) {
                tokio::time::sleep(WAIT_POLL_INTERVAL).await;
            }
        } else if !self.shared.available.swap(false, Ordering::AcqRel) {
            return UpdateOutcome::Unchanged;
        }

        let snapshot = self.shared.current();
        if Arc::ptr_eq(&snapshot, &self.last_seen) || *snapshot == *self.last_seen {
            return UpdateOutcome::Unchanged;
        }

        self.last_seen = snapshot.clone();
        UpdateOutcome::Updated(snapshot)
    }

    /// Latest snapshot, without consuming the availability signal
    pub fn latest(&self) -> Arc<Snapshot> {
        self.shared.current()
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader(self.shared.clone())
    }

    /// Stop polling and wait for the task to exit
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!("Feed polling task failed: {}", e);
            }
        }
        info!("Feed polling stopped");
    }
}
