use super::control::RunControl;
use super::job::{DownloadJob, JobId, JobRequest};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Callback fired with a fresh snapshot after every change to a job
pub type JobObserver = Arc<dyn Fn(&DownloadJob) + Send + Sync>;

/// Mutable part of a job: the record plus the stop signal of its current run
struct JobSlot {
    job: DownloadJob,
    control: RunControl,
}

/// One job as held by the queue
pub struct JobEntry {
    id: JobId,
    slot: RwLock<JobSlot>,
    // Held across mutate and notify so callbacks follow mutation order;
    // readers only need `slot`
    delivery: Mutex<()>,
    observer: Option<JobObserver>,
}

impl JobEntry {
    pub fn new(request: JobRequest, observer: Option<JobObserver>) -> Self {
        let job = DownloadJob::new(request);
        Self {
            id: job.id,
            slot: RwLock::new(JobSlot {
                job,
                control: RunControl::new(),
            }),
            delivery: Mutex::new(()),
            observer,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub async fn snapshot(&self) -> DownloadJob {
        self.slot.read().await.job.clone()
    }

    /// Stop signal of the current run
    pub async fn control(&self) -> RunControl {
        self.slot.read().await.control.clone()
    }

    /// Mutate the record, then notify the observer outside the record lock.
    /// The next mutation of this job waits until the callback has returned.
    pub async fn update<F>(&self, f: F) -> DownloadJob
    where
        F: FnOnce(&mut DownloadJob),
    {
        let _delivery = self.delivery.lock().await;
        let snapshot = {
            let mut slot = self.slot.write().await;
            f(&mut slot.job);
            slot.job.clone()
        };
        self.notify(&snapshot);
        snapshot
    }

    /// Reset a stopped job for another run with a fresh stop signal.
    /// Returns the new control, or None if the job is not in a retryable state.
    pub async fn requeue(&self) -> Option<RunControl> {
        let _delivery = self.delivery.lock().await;
        let (snapshot, control) = {
            let mut slot = self.slot.write().await;
            if !slot.job.status.is_retryable() {
                return None;
            }
            slot.job.reset_for_retry();
            slot.control = RunControl::new();
            (slot.job.clone(), slot.control.clone())
        };
        self.notify(&snapshot);
        Some(control)
    }

    fn notify(&self, snapshot: &DownloadJob) {
        if let Some(observer) = &self.observer {
            observer(snapshot);
        }
    }
}

/// Jobs in creation order. Safe to share between tasks.
#[derive(Clone, Default)]
pub struct JobQueue {
    pub(crate) entries: Arc<RwLock<VecDeque<Arc<JobEntry>>>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, entry: Arc<JobEntry>) {
        let mut entries = self.entries.write().await;
        entries.push_back(entry);
    }

    pub async fn get_all(&self) -> Vec<Arc<JobEntry>> {
        // Clone the Arcs under the lock; snapshots are taken afterwards
        let entries = self.entries.read().await;
        entries.iter().cloned().collect()
    }

    pub async fn get_by_id(&self, id: JobId) -> Option<Arc<JobEntry>> {
        let entries = self.entries.read().await;
        entries.iter().find(|e| e.id == id).cloned()
    }

    pub async fn remove(&self, id: JobId) -> Option<Arc<JobEntry>> {
        let mut entries = self.entries.write().await;
        let pos = entries.iter().position(|e| e.id == id)?;
        entries.remove(pos)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
