use crate::error::Result;
use crate::event::{Event, QueueItem};
use crate::inspect::{WorkerState, WorkerStatus};
use crate::queue::BoundedQueue;
use std::sync::Arc;

/// Handle through which an input unit emits events into the pipeline.
///
/// Wraps the downstream queue so units can only push regular events, never
/// control sentinels. Pushing blocks while the queue is at capacity.
pub struct EventSink {
    queue: BoundedQueue<QueueItem>,
    status: Arc<WorkerStatus>,
}

impl EventSink {
    pub(crate) fn new(queue: BoundedQueue<QueueItem>, status: Arc<WorkerStatus>) -> Self {
        Self { queue, status }
    }

    /// Push an event downstream, blocking while the queue is full
    pub fn push(&self, event: Event) {
        self.status.set_state(WorkerState::WaitingQueue);
        self.queue.push(QueueItem::Event(event));
        self.status.set_state(WorkerState::Running);
    }
}

/// An input unit: produces events and pushes them into the pipeline.
///
/// The run loop must poll [`Input::stopping`] and return once a stop has
/// been requested; the engine never forcibly terminates a worker thread.
pub trait Input: Send + Sync {
    /// Human-readable unit name
    fn name(&self) -> &str;

    /// One-time setup hook, called once before the run loop starts
    fn register(&self) -> Result<()> {
        Ok(())
    }

    /// Produce events until finished or stopped, pushing them into `sink`.
    ///
    /// An error returned while not stopping is treated as transient: the
    /// worker restarts the run loop after a backoff interval.
    fn run(&self, sink: &EventSink) -> Result<()>;

    /// Cooperative stop signal; the run loop must observe it
    fn request_stop(&self);

    /// Whether a stop has been requested. Used to distinguish expected
    /// shutdown artifacts from genuine failures.
    fn stopping(&self) -> bool;

    /// Cleanup hook, invoked exactly once when the worker exits
    fn teardown(&self) -> Result<()> {
        Ok(())
    }

    /// Create an independent copy of this unit. Units declared with
    /// parallelism above one are cloned once per extra worker before startup.
    fn clone_unit(&self) -> Arc<dyn Input>;
}

/// A filter unit: transforms events between the input and output stages.
///
/// The filter chain is shared across all filter workers, which is what the
/// thread-safety declaration is about: a unit returning `false` from
/// [`Filter::thread_safe`] forces the stage down to a single worker unless
/// the operator explicitly overrides the count.
pub trait Filter: Send + Sync {
    /// Human-readable unit name
    fn name(&self) -> &str;

    /// One-time setup hook, called once before the stage starts
    fn register(&self) -> Result<()> {
        Ok(())
    }

    /// Whether this unit is safe to run concurrently across workers
    fn thread_safe(&self) -> bool {
        false
    }

    /// Transform one event into zero or more events. An error here is fatal
    /// to the pipeline.
    fn apply(&self, event: Event) -> Result<Vec<Event>>;

    /// Emit buffered partial results without new input. `last` is true only
    /// for the one-time flush performed at shutdown.
    fn flush(&self, last: bool) -> Result<Vec<Event>> {
        let _ = last;
        Ok(Vec::new())
    }

    /// Cleanup hook, invoked exactly once when the stage exits
    fn teardown(&self) -> Result<()> {
        Ok(())
    }
}

/// An output unit: consumes events in arrival order.
pub trait Output: Send + Sync {
    /// Human-readable unit name
    fn name(&self) -> &str;

    /// One-time setup hook, called once before the stage starts
    fn register(&self) -> Result<()> {
        Ok(())
    }

    /// Consume one event. Outputs never run concurrently with each other;
    /// the single output worker invokes the chain in strict arrival order.
    fn handle(&self, event: &Event) -> Result<()>;

    /// Number of items the unit is still holding internally (batches not
    /// yet written out). Purely observational, feeds the in-flight report.
    fn pending(&self) -> usize {
        0
    }

    /// Cleanup hook, invoked exactly once when the worker exits
    fn teardown(&self) -> Result<()> {
        Ok(())
    }
}
