use crate::pipeline::PipelineState;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// What a worker thread is doing right now.
///
/// A minimal structured status per worker, instead of live stack
/// inspection: enough to tell a benign wait from an anomalously stuck
/// thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Thread spawned, not yet in its loop
    Starting,
    /// Actively processing
    Running,
    /// Blocked pushing to or popping from a queue
    WaitingQueue,
    /// Input worker sleeping before restarting a failed unit
    Backoff,
    /// Waiting for the next flush tick
    Idle,
    /// Worker loop has exited
    Stopped,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Starting,
            1 => WorkerState::Running,
            2 => WorkerState::WaitingQueue,
            3 => WorkerState::Backoff,
            4 => WorkerState::Idle,
            _ => WorkerState::Stopped,
        }
    }

    /// Whether this state is a recognized benign wait or a finished worker
    fn is_benign(self) -> bool {
        matches!(
            self,
            WorkerState::WaitingQueue
                | WorkerState::Backoff
                | WorkerState::Idle
                | WorkerState::Stopped
        )
    }
}

/// Live status slot for one worker thread, shared between the worker and
/// the introspection surface
#[derive(Debug)]
pub struct WorkerStatus {
    name: String,
    state: AtomicU8,
    detail: Mutex<Option<String>>,
}

impl WorkerStatus {
    pub(crate) fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: AtomicU8::new(WorkerState::Starting as u8),
            detail: Mutex::new(None),
        })
    }

    /// The worker's thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// The worker's current state
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub(crate) fn set_detail(&self, detail: Option<String>) {
        *self.detail.lock() = detail;
    }

    /// Point-in-time copy of this worker's status
    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            name: self.name.clone(),
            state: self.state(),
            detail: self.detail.lock().clone(),
        }
    }
}

/// Point-in-time status of one worker thread
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    pub name: String,
    pub state: WorkerState,
    pub detail: Option<String>,
}

/// Registry of all worker status slots for one pipeline
#[derive(Debug, Default)]
pub(crate) struct WorkerRegistry {
    workers: Mutex<Vec<Arc<WorkerStatus>>>,
}

impl WorkerRegistry {
    pub(crate) fn register(&self, name: impl Into<String>) -> Arc<WorkerStatus> {
        let status = WorkerStatus::new(name);
        self.workers.lock().push(Arc::clone(&status));
        status
    }

    pub(crate) fn snapshots(&self) -> Vec<WorkerSnapshot> {
        self.workers.lock().iter().map(|w| w.snapshot()).collect()
    }
}

/// Read-only operational snapshot of a running pipeline.
///
/// Queue depths and in-flight counts are derived observations, never
/// authoritative state.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Current coordinator state
    pub state: PipelineState,
    /// Depth of the input→filter queue
    pub input_queue_depth: usize,
    /// Depth of the filter→output queue
    pub output_queue_depth: usize,
    /// Queued items plus per-output pending work
    pub inflight: usize,
    /// One snapshot per worker thread
    pub workers: Vec<WorkerSnapshot>,
}

impl PipelineReport {
    /// Workers that are neither finished nor blocked in a recognized benign
    /// wait: the threads worth looking at when the pipeline stalls.
    pub fn stalling_workers(&self) -> Vec<&WorkerSnapshot> {
        self.workers
            .iter()
            .filter(|w| !w.state.is_benign())
            .collect()
    }
}
