use crate::error::{PipelineError, Result};
use crate::event::QueueItem;
use crate::inspect::{PipelineReport, WorkerRegistry, WorkerState, WorkerStatus};
use crate::plugin::{Filter, Input, Output};
use crate::policy;
use crate::queue::BoundedQueue;
use crate::stage;
use crate::topology::Topology;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error};

/// Default capacity of each inter-stage queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Tunables passed at construction; no ambient globals
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Capacity of each inter-stage queue
    pub queue_capacity: usize,
    /// Explicit filter-worker count. `None` selects a computed default;
    /// any explicit value above one overrides the single-worker safety net
    /// for chains with units not declared thread-safe.
    pub filter_workers: Option<usize>,
    /// Interval between periodic flush markers
    pub flush_interval: Duration,
    /// Sleep before restarting a failed input unit
    pub input_retry_backoff: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            filter_workers: None,
            flush_interval: Duration::from_secs(5),
            input_retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Where the pipeline is in its lifecycle. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    /// Constructed, not yet running
    Created,
    /// Startup in progress
    Running,
    /// All stage workers spawned; shutdown may proceed
    Ready,
    /// Stop requested; waiting for input units to wind down
    DrainingInputs,
    /// Inputs done; draining the filter stage
    DrainingFilters,
    /// Filter workers joined; flushing buffered results
    FinalFlush,
    /// Draining the output stage
    DrainingOutputs,
    /// Fully drained
    Stopped,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Created,
            1 => PipelineState::Running,
            2 => PipelineState::Ready,
            3 => PipelineState::DrainingInputs,
            4 => PipelineState::DrainingFilters,
            5 => PipelineState::FinalFlush,
            6 => PipelineState::DrainingOutputs,
            _ => PipelineState::Stopped,
        }
    }
}

/// Shared stop/fault coordination between the driver and stage workers
pub(crate) struct PipelineControl {
    fault: Mutex<Option<PipelineError>>,
    inputs: Mutex<Vec<Arc<dyn Input>>>,
}

impl PipelineControl {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            fault: Mutex::new(None),
            inputs: Mutex::new(Vec::new()),
        })
    }

    /// Record the first fatal failure and signal every input unit to stop
    /// so the drain can complete and `run` can surface the error
    pub(crate) fn fault(&self, error: PipelineError) {
        {
            let mut slot = self.fault.lock();
            if slot.is_some() {
                debug!(error = %error, "additional failure after pipeline fault");
            } else {
                *slot = Some(error);
            }
        }
        self.stop_inputs();
    }

    pub(crate) fn stop_inputs(&self) {
        for unit in self.inputs.lock().iter() {
            unit.request_stop();
        }
    }

    fn set_inputs(&self, units: Vec<Arc<dyn Input>>) {
        *self.inputs.lock() = units;
    }

    fn take_fault(&self) -> Option<PipelineError> {
        self.fault.lock().take()
    }
}

struct FlushSignal {
    stopped: Mutex<bool>,
    tick: Condvar,
}

/// Ticking background task that injects periodic flush markers into the
/// input→filter queue. Runs only while filters exist; cancelled as the
/// first step of the shutdown drive, before the final flush.
struct Flusher {
    signal: Arc<FlushSignal>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Flusher {
    fn start(
        queue: BoundedQueue<QueueItem>,
        interval: Duration,
        status: Arc<WorkerStatus>,
    ) -> Self {
        let signal = Arc::new(FlushSignal {
            stopped: Mutex::new(false),
            tick: Condvar::new(),
        });
        let handle = thread::Builder::new().name("flusher".into()).spawn({
            let signal = Arc::clone(&signal);
            move || {
                let mut stopped = signal.stopped.lock();
                loop {
                    if *stopped {
                        break;
                    }
                    status.set_state(WorkerState::Idle);
                    let timed_out = signal.tick.wait_for(&mut stopped, interval).timed_out();
                    if *stopped {
                        break;
                    }
                    if timed_out {
                        drop(stopped);
                        status.set_state(WorkerState::WaitingQueue);
                        queue.push(QueueItem::Flush { last: false });
                        stopped = signal.stopped.lock();
                    }
                }
                status.set_state(WorkerState::Stopped);
            }
        });
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(error = %e, "failed to spawn flusher");
                None
            }
        };
        Self { signal, handle }
    }

    fn stop(mut self) {
        *self.signal.stopped.lock() = true;
        self.signal.tick.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// The pipeline engine: three staged worker pools connected by bounded
/// queues.
///
/// Events flow input stage → queue → filter stage → queue → output stage.
/// Construction wires the queues; [`Pipeline::run`] spawns the workers and
/// blocks until everything has drained. [`Pipeline::shutdown`] may be
/// called from any thread; share the pipeline behind an [`Arc`] for that.
pub struct Pipeline {
    topology: Topology,
    settings: PipelineSettings,
    input_to_filter: BoundedQueue<QueueItem>,
    filter_to_output: BoundedQueue<QueueItem>,
    started: AtomicBool,
    ready: AtomicBool,
    state: AtomicU8,
    registry: WorkerRegistry,
    control: Arc<PipelineControl>,
}

impl Pipeline {
    /// Create a pipeline for the given topology
    pub fn new(topology: Topology, settings: PipelineSettings) -> Self {
        let input_to_filter = BoundedQueue::new(settings.queue_capacity);
        // with no filters the two queues are one object; the filter stage
        // is bypassed entirely rather than run as a no-op
        let filter_to_output = if topology.has_filters() {
            BoundedQueue::new(settings.queue_capacity)
        } else {
            input_to_filter.clone()
        };
        Self {
            topology,
            settings,
            input_to_filter,
            filter_to_output,
            started: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            state: AtomicU8::new(PipelineState::Created as u8),
            registry: WorkerRegistry::default(),
            control: PipelineControl::new(),
        }
    }

    /// Run the pipeline to completion.
    ///
    /// Spawns all stage workers, waits for every input to finish or be
    /// stopped, then drives the sentinel-based drain across the remaining
    /// stages. Returns the process exit status (`0`) once every stage has
    /// fully drained, or the first fatal failure.
    pub fn run(&self) -> Result<i32> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::AlreadyStarted);
        }
        self.advance_state(PipelineState::Running);

        if let Err(e) = self.register_chains() {
            // open the readiness gate so a pending shutdown() cannot spin
            // forever against a pipeline that never started
            self.ready.store(true, Ordering::SeqCst);
            self.advance_state(PipelineState::Stopped);
            return Err(e);
        }

        let worker_count = policy::resolve_worker_count(
            self.topology.filters(),
            self.settings.filter_workers,
            policy::default_worker_count(),
        );

        let inputs = self.topology.expand_inputs();
        self.control.set_inputs(inputs.clone());

        let mut input_handles = Vec::with_capacity(inputs.len());
        for (index, unit) in inputs.iter().enumerate() {
            let name = format!("input-{}-{}", index, unit.name());
            let handle = thread::Builder::new().name(name.clone()).spawn({
                let unit = Arc::clone(unit);
                let queue = self.input_to_filter.clone();
                let status = self.registry.register(&name);
                let backoff = self.settings.input_retry_backoff;
                let control = Arc::clone(&self.control);
                move || stage::input_worker(unit, queue, status, backoff, control)
            });
            match handle {
                Ok(handle) => input_handles.push((name, handle)),
                Err(e) => error!(worker = %name, error = %e, "failed to spawn input worker"),
            }
        }

        let filters: Arc<Vec<Arc<dyn Filter>>> = Arc::new(self.topology.filters().to_vec());
        let mut filter_handles = Vec::new();
        let mut flusher = None;
        if self.topology.has_filters() {
            debug!(workers = worker_count, "starting filter stage");
            for index in 0..worker_count {
                let name = format!("filter-{}", index);
                let handle = thread::Builder::new().name(name.clone()).spawn({
                    let filters = Arc::clone(&filters);
                    let input = self.input_to_filter.clone();
                    let output = self.filter_to_output.clone();
                    let status = self.registry.register(&name);
                    let control = Arc::clone(&self.control);
                    move || stage::filter_worker(filters, input, output, status, control)
                });
                match handle {
                    Ok(handle) => filter_handles.push((name, handle)),
                    Err(e) => error!(worker = %name, error = %e, "failed to spawn filter worker"),
                }
            }
            flusher = Some(Flusher::start(
                self.input_to_filter.clone(),
                self.settings.flush_interval,
                self.registry.register("flusher"),
            ));
        }

        let output_handle = {
            let name = "output".to_string();
            let handle = thread::Builder::new().name(name.clone()).spawn({
                let outputs: Arc<Vec<Arc<dyn Output>>> =
                    Arc::new(self.topology.outputs().to_vec());
                let input = self.filter_to_output.clone();
                let status = self.registry.register(&name);
                let control = Arc::clone(&self.control);
                move || stage::output_worker(outputs, input, status, control)
            });
            match handle {
                Ok(handle) => Some((name, handle)),
                Err(e) => {
                    error!(error = %e, "failed to spawn output worker");
                    None
                }
            }
        };

        // unconditional, even if spawning partially failed: a shutdown call
        // must never block forever on the readiness gate
        self.ready.store(true, Ordering::SeqCst);
        self.advance_state(PipelineState::Ready);
        debug!(
            inputs = input_handles.len(),
            filter_workers = filter_handles.len(),
            "pipeline started"
        );

        // normal operation: block until every input finishes or is stopped
        for (name, handle) in input_handles {
            self.join_worker(name, handle);
        }

        if self.topology.has_filters() {
            self.advance_state(PipelineState::DrainingFilters);
            if let Some(flusher) = flusher.take() {
                flusher.stop();
            }
            self.input_to_filter.push(QueueItem::Shutdown);
            for (name, handle) in filter_handles {
                self.join_worker(name, handle);
            }
            self.advance_state(PipelineState::FinalFlush);
            self.final_flush(&filters);
            self.teardown_filters(&filters);
        }

        self.advance_state(PipelineState::DrainingOutputs);
        // with no filters this queue is the input→filter queue, and this
        // sentinel is the one the output worker observes
        self.filter_to_output.push(QueueItem::Shutdown);
        if let Some((name, handle)) = output_handle {
            self.join_worker(name, handle);
        }
        self.advance_state(PipelineState::Stopped);
        debug!("pipeline stopped");

        match self.control.take_fault() {
            Some(error) => Err(error),
            None => Ok(0),
        }
    }

    /// Stop the pipeline from any thread.
    ///
    /// Blocks until startup has finished (the readiness gate), runs the
    /// hook, then signals every input unit to stop. Does not join workers;
    /// the drain is driven by the `run` caller.
    pub fn shutdown(&self, before_stop: impl FnOnce()) {
        while !self.ready.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        before_stop();
        self.advance_state(PipelineState::DrainingInputs);
        self.control.stop_inputs();
    }

    /// Current lifecycle state
    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether startup has completed
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Operational snapshot: queue depths, in-flight count, worker states.
    /// Callable at any time from any thread.
    pub fn report(&self) -> PipelineReport {
        let shared = self.input_to_filter.same_queue(&self.filter_to_output);
        let input_queue_depth = self.input_to_filter.len();
        let output_queue_depth = self.filter_to_output.len();
        let queued = if shared {
            input_queue_depth
        } else {
            input_queue_depth + output_queue_depth
        };
        let pending: usize = self.topology.outputs().iter().map(|o| o.pending()).sum();
        PipelineReport {
            state: self.state(),
            input_queue_depth,
            output_queue_depth,
            inflight: queued + pending,
            workers: self.registry.snapshots(),
        }
    }

    fn register_chains(&self) -> Result<()> {
        for filter in self.topology.filters() {
            filter.register().map_err(|e| {
                PipelineError::Configuration(format!(
                    "failed to register filter '{}': {}",
                    filter.name(),
                    e
                ))
            })?;
        }
        for output in self.topology.outputs() {
            output.register().map_err(|e| {
                PipelineError::Configuration(format!(
                    "failed to register output '{}': {}",
                    output.name(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    fn final_flush(&self, filters: &[Arc<dyn Filter>]) {
        match stage::flush_chain(filters, true) {
            Ok(events) => {
                for event in events {
                    if !event.is_cancelled() {
                        self.filter_to_output.push(QueueItem::Event(event));
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "final flush failed");
                self.control.fault(e);
            }
        }
    }

    fn teardown_filters(&self, filters: &[Arc<dyn Filter>]) {
        for filter in filters {
            if let Err(e) = filter.teardown() {
                error!(filter = filter.name(), error = %e, "filter teardown failed");
                self.control.fault(PipelineError::Teardown(format!(
                    "filter '{}': {}",
                    filter.name(),
                    e
                )));
            }
        }
    }

    fn join_worker(&self, name: String, handle: thread::JoinHandle<()>) {
        if handle.join().is_err() {
            self.control.fault(PipelineError::ThreadPanic(name));
        }
    }

    fn advance_state(&self, state: PipelineState) {
        self.state.fetch_max(state as u8, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::plugin::EventSink;
    use crate::topology::TopologyBuilder;

    struct NullInput {
        stop: AtomicBool,
    }

    impl NullInput {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                stop: AtomicBool::new(false),
            })
        }
    }

    impl Input for NullInput {
        fn name(&self) -> &str {
            "null"
        }

        fn run(&self, _sink: &EventSink) -> Result<()> {
            Ok(())
        }

        fn request_stop(&self) {
            self.stop.store(true, Ordering::SeqCst);
        }

        fn stopping(&self) -> bool {
            self.stop.load(Ordering::SeqCst)
        }

        fn clone_unit(&self) -> Arc<dyn Input> {
            NullInput::new()
        }
    }

    struct NullFilter;

    impl Filter for NullFilter {
        fn name(&self) -> &str {
            "null"
        }

        fn apply(&self, event: Event) -> Result<Vec<Event>> {
            Ok(vec![event])
        }
    }

    struct NullOutput;

    impl Output for NullOutput {
        fn name(&self) -> &str {
            "null"
        }

        fn handle(&self, _event: &Event) -> Result<()> {
            Ok(())
        }
    }

    fn topology(filters: usize) -> Topology {
        let mut builder = TopologyBuilder::new()
            .input(NullInput::new())
            .output(Arc::new(NullOutput));
        for _ in 0..filters {
            builder = builder.filter(Arc::new(NullFilter));
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_zero_filters_share_one_queue() {
        let pipeline = Pipeline::new(topology(0), PipelineSettings::default());
        assert!(pipeline
            .input_to_filter
            .same_queue(&pipeline.filter_to_output));
    }

    #[test]
    fn test_filters_get_separate_queues() {
        let pipeline = Pipeline::new(topology(1), PipelineSettings::default());
        assert!(!pipeline
            .input_to_filter
            .same_queue(&pipeline.filter_to_output));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(settings.filter_workers, None);
        assert_eq!(settings.flush_interval, Duration::from_secs(5));
        assert_eq!(settings.input_retry_backoff, Duration::from_secs(1));
    }

    #[test]
    fn test_state_transitions_are_monotonic() {
        let pipeline = Pipeline::new(topology(0), PipelineSettings::default());
        assert_eq!(pipeline.state(), PipelineState::Created);
        pipeline.advance_state(PipelineState::Ready);
        pipeline.advance_state(PipelineState::Running);
        assert_eq!(pipeline.state(), PipelineState::Ready);
    }

    #[test]
    fn test_second_run_rejected() {
        let pipeline = Pipeline::new(topology(0), PipelineSettings::default());
        assert_eq!(pipeline.run().unwrap(), 0);
        assert!(matches!(
            pipeline.run(),
            Err(PipelineError::AlreadyStarted)
        ));
    }
}
