//! The sync pipeline: classify, suppress, dispatch

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::classifier::{classify, RecordKind};
use crate::suppressor::{content_hash, SuppressionRegistry};
use crate::syncer::{SyncContext, SyncReport, Syncers};
use crate::watcher::FileChange;

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// How long a worker with nothing queued stays alive
pub const DEFAULT_WORKER_IDLE: Duration = Duration::from_secs(30);

/// What became of one file change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Synced(SyncReport),
    /// The bytes were written by the platform itself
    Suppressed,
    /// No tenant could be derived from the path
    Unclassified,
    /// Tenant found, but no syncer handles the file
    Unrecognized,
    Failed(String),
}

/// A classified change that survived suppression
#[derive(Debug)]
struct Job {
    tenant_id: String,
    kind: RecordKind,
    change: FileChange,
}

/// Changes for one key are applied strictly in arrival order
type WorkKey = (String, RecordKind);

pub struct SyncEngine {
    root: PathBuf,
    suppressor: Arc<dyn SuppressionRegistry>,
    syncers: Syncers,
    worker_idle: Duration,
}

impl SyncEngine {
    pub fn new(
        root: impl Into<PathBuf>,
        ctx: SyncContext,
        suppressor: Arc<dyn SuppressionRegistry>,
    ) -> Self {
        Self {
            root: root.into(),
            suppressor,
            syncers: Syncers::new(ctx),
            worker_idle: DEFAULT_WORKER_IDLE,
        }
    }

    /// Retire per-key workers after `idle` without work
    pub fn with_worker_idle(mut self, idle: Duration) -> Self {
        self.worker_idle = idle;
        self
    }

    /// Handle the platform's configuration API registers its writes with
    pub fn suppressor(&self) -> Arc<dyn SuppressionRegistry> {
        Arc::clone(&self.suppressor)
    }

    /// Run one change through the whole pipeline on the current task
    pub async fn process(&self, change: FileChange) -> Outcome {
        match self.admit(change) {
            Ok(job) => self.execute(job).await,
            Err(outcome) => outcome,
        }
    }

    fn admit(&self, change: FileChange) -> Result<Job, Outcome> {
        let classification = classify(&self.root, &change.path);

        let Some(tenant_id) = classification.tenant_id else {
            info!("Could not extract tenant ID from path {:?}", change.path);
            return Err(Outcome::Unclassified);
        };

        if classification.kind == RecordKind::Unrecognized {
            debug!("Ignoring unrecognized file {:?}", change.path);
            return Err(Outcome::Unrecognized);
        }

        if self.suppressor.take(&content_hash(&change.contents)) {
            info!("Skipping platform-triggered change to {:?}", change.path);
            return Err(Outcome::Suppressed);
        }

        Ok(Job {
            tenant_id,
            kind: classification.kind,
            change,
        })
    }

    async fn execute(&self, job: Job) -> Outcome {
        let Job {
            tenant_id,
            kind,
            change,
        } = job;

        match self
            .syncers
            .sync(&tenant_id, kind, &change.path, &change.contents)
            .await
        {
            Ok(Some(report)) => {
                info!("Synced {:?} ({})", change.path, kind.as_str());
                Outcome::Synced(report)
            }
            Ok(None) => Outcome::Unrecognized,
            Err(e) => {
                if e.is_transient() {
                    warn!("Dropped change to {:?}: {}", change.path, e);
                } else {
                    error!("Sync error for {:?}: {}", change.path, e);
                }
                Outcome::Failed(e.to_string())
            }
        }
    }

    /// Consume changes until `token` fires or the sender side closes, then
    /// let in-flight syncs drain.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<FileChange>,
        token: CancellationToken,
    ) {
        let mut dispatcher = Dispatcher::new(Arc::clone(&self));
        let mut sweep = interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                change = rx.recv() => match change {
                    Some(change) => {
                        if let Ok(job) = self.admit(change) {
                            dispatcher.route(job);
                        }
                    }
                    None => break,
                },
                _ = sweep.tick() => {
                    let expired = self.suppressor.prune();
                    if expired > 0 {
                        debug!("Expired {} unmatched platform write(s)", expired);
                    }
                    dispatcher.forget_retired();
                }
                Some(joined) = dispatcher.tasks.join_next(), if !dispatcher.tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Sync worker exited unexpectedly: {}", e);
                    }
                }
            }
        }

        rx.close();
        info!("Draining in-flight syncs");
        dispatcher.drain().await;
        info!("Sync engine stopped");
    }
}

/// Changes waiting for one worker: the newest change per path, served in the
/// order each path was first queued.
#[derive(Default)]
struct Pending {
    order: VecDeque<PathBuf>,
    jobs: HashMap<PathBuf, Job>,
    closed: bool,
}

#[derive(Default)]
struct WorkQueue {
    pending: Mutex<Pending>,
    ready: Notify,
}

impl WorkQueue {
    /// Queue `job`, replacing any pending change to the same path. The job is
    /// handed back if the worker has already retired.
    fn push(&self, job: Job) -> Result<(), Job> {
        let mut pending = self.lock();
        if pending.closed {
            return Err(job);
        }

        let path = job.change.path.clone();
        if pending.jobs.insert(path.clone(), job).is_some() {
            debug!("Superseded pending change to {:?}", path);
        } else {
            pending.order.push_back(path);
        }
        drop(pending);

        self.ready.notify_one();
        Ok(())
    }

    fn pop(&self) -> Option<Job> {
        let mut pending = self.lock();
        let path = pending.order.pop_front()?;
        pending.jobs.remove(&path)
    }

    fn len(&self) -> usize {
        self.lock().order.len()
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Close the queue unless work arrived meanwhile
    fn close_if_idle(&self) -> bool {
        let mut pending = self.lock();
        if pending.order.is_empty() {
            pending.closed = true;
        }
        pending.closed
    }

    /// Stop accepting work; the worker finishes what is queued
    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_one();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One worker task per (tenant, kind); different keys run concurrently
struct Dispatcher {
    engine: Arc<SyncEngine>,
    workers: HashMap<WorkKey, Arc<WorkQueue>>,
    tasks: JoinSet<()>,
}

impl Dispatcher {
    fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            workers: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    fn route(&mut self, job: Job) {
        let key = (job.tenant_id.clone(), job.kind);

        let job = match self.workers.get(&key) {
            Some(queue) => match queue.push(job) {
                Ok(()) => return,
                // Worker retired; start a fresh one below
                Err(job) => job,
            },
            None => job,
        };

        let queue = self.spawn_worker(&key);
        if queue.push(job).is_err() {
            error!("Failed to hand change to worker {}/{}", key.0, key.1.as_str());
        }
        self.workers.insert(key, queue);
    }

    fn spawn_worker(&mut self, key: &WorkKey) -> Arc<WorkQueue> {
        let queue = Arc::new(WorkQueue::default());
        let engine = Arc::clone(&self.engine);
        let idle = engine.worker_idle;
        let worker_queue = Arc::clone(&queue);
        let (tenant_id, kind) = key.clone();

        debug!("Starting worker for {}/{}", tenant_id, kind.as_str());
        self.tasks.spawn(async move {
            loop {
                if let Some(job) = worker_queue.pop() {
                    engine.execute(job).await;
                    continue;
                }
                if worker_queue.is_closed() {
                    break;
                }
                let woken = tokio::time::timeout(idle, worker_queue.ready.notified()).await;
                if woken.is_err() && worker_queue.close_if_idle() {
                    debug!("Retiring idle worker for {}/{}", tenant_id, kind.as_str());
                    break;
                }
            }
        });
        queue
    }

    /// Drop handles to workers that have retired
    fn forget_retired(&mut self) {
        self.workers.retain(|_, queue| !queue.is_closed());
    }

    async fn drain(mut self) {
        let queued: usize = self.workers.values().map(|queue| queue.len()).sum();
        if queued > 0 {
            info!("Finishing {} queued change(s)", queued);
        }
        for queue in self.workers.values() {
            queue.close();
        }
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!("Sync worker failed during shutdown: {}", e);
            }
        }
    }
}
