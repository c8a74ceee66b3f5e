use crate::error::{PipelineError, Result};
use crate::event::{Event, QueueItem};
use crate::inspect::{WorkerState, WorkerStatus};
use crate::pipeline::PipelineControl;
use crate::plugin::{EventSink, Filter, Input, Output};
use crate::queue::BoundedQueue;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error};

/// Body of one input worker thread.
///
/// Registers the unit, then reruns its loop until it finishes or is
/// stopped. A failure while the unit is not stopping is transient: logged,
/// slept off, retried. Input failures are never fatal to the pipeline.
pub(crate) fn input_worker(
    unit: Arc<dyn Input>,
    queue: BoundedQueue<QueueItem>,
    status: Arc<WorkerStatus>,
    backoff: Duration,
    control: Arc<PipelineControl>,
) {
    status.set_state(WorkerState::Running);
    if let Err(e) = unit.register() {
        error!(input = unit.name(), error = %e, "input registration failed");
    } else {
        let sink = EventSink::new(queue, Arc::clone(&status));
        loop {
            match unit.run(&sink) {
                Ok(()) => break,
                // stop was requested; the failure is an expected artifact
                Err(_) if unit.stopping() => break,
                Err(e) => {
                    error!(input = unit.name(), error = %e, "input unit failed, restarting");
                    status.set_detail(Some(e.to_string()));
                    status.set_state(WorkerState::Backoff);
                    thread::sleep(backoff);
                    if unit.stopping() {
                        break;
                    }
                    status.set_detail(None);
                    status.set_state(WorkerState::Running);
                }
            }
        }
    }
    if let Err(e) = unit.teardown() {
        error!(input = unit.name(), error = %e, "input teardown failed");
        control.fault(PipelineError::Teardown(format!(
            "input '{}': {}",
            unit.name(),
            e
        )));
    }
    status.set_state(WorkerState::Stopped);
}

/// Body of one filter worker thread.
///
/// Drains the input→filter queue, applying the shared chain to events and
/// its flush hooks to flush markers. A chain failure is fatal: the fault is
/// recorded, inputs are signaled to stop, and the worker keeps draining
/// without running the chain so upstream producers are not wedged behind a
/// full queue.
pub(crate) fn filter_worker(
    filters: Arc<Vec<Arc<dyn Filter>>>,
    input: BoundedQueue<QueueItem>,
    output: BoundedQueue<QueueItem>,
    status: Arc<WorkerStatus>,
    control: Arc<PipelineControl>,
) {
    let mut faulted = false;
    loop {
        status.set_state(WorkerState::WaitingQueue);
        let item = input.pop();
        status.set_state(WorkerState::Running);
        match item {
            QueueItem::Shutdown => {
                // sibling workers blocked on this queue must observe it too
                input.push(QueueItem::Shutdown);
                break;
            }
            _ if faulted => continue,
            QueueItem::Event(event) => match apply_chain(&filters, event) {
                Ok(events) => forward_surviving(&output, events, &status),
                Err(e) => {
                    error!(error = %e, "filter chain failed, halting event processing");
                    control.fault(e);
                    faulted = true;
                }
            },
            QueueItem::Flush { last } => match flush_chain(&filters, last) {
                Ok(events) => forward_surviving(&output, events, &status),
                Err(e) => {
                    error!(error = %e, "filter flush failed, halting event processing");
                    control.fault(e);
                    faulted = true;
                }
            },
        }
    }
    status.set_state(WorkerState::Stopped);
}

/// Body of the single output worker thread.
///
/// Invokes the output chain on each event in strict arrival order. The
/// shutdown sentinel ends the loop without being re-enqueued; this is the
/// last stage. Every output's teardown hook runs on exit.
pub(crate) fn output_worker(
    outputs: Arc<Vec<Arc<dyn Output>>>,
    input: BoundedQueue<QueueItem>,
    status: Arc<WorkerStatus>,
    control: Arc<PipelineControl>,
) {
    let mut faulted = false;
    loop {
        status.set_state(WorkerState::WaitingQueue);
        let item = input.pop();
        status.set_state(WorkerState::Running);
        match item {
            QueueItem::Shutdown => break,
            QueueItem::Flush { .. } => continue,
            QueueItem::Event(event) => {
                if event.is_cancelled() {
                    continue;
                }
                for output in outputs.iter() {
                    if let Err(e) = output.handle(&event) {
                        if faulted {
                            debug!(output = output.name(), error = %e, "output failed during abort");
                        } else {
                            error!(output = output.name(), error = %e, "output failed");
                            control.fault(PipelineError::Plugin(format!(
                                "output '{}': {}",
                                output.name(),
                                e
                            )));
                            faulted = true;
                        }
                    }
                }
            }
        }
    }
    for output in outputs.iter() {
        if let Err(e) = output.teardown() {
            error!(output = output.name(), error = %e, "output teardown failed");
            control.fault(PipelineError::Teardown(format!(
                "output '{}': {}",
                output.name(),
                e
            )));
        }
    }
    status.set_state(WorkerState::Stopped);
}

/// Run one event through the whole filter chain in order. Each filter sees
/// every event produced by the previous one; cancelled events still travel
/// the chain and are only dropped at the output-queue boundary.
pub(crate) fn apply_chain(filters: &[Arc<dyn Filter>], event: Event) -> Result<Vec<Event>> {
    let mut events = vec![event];
    for filter in filters {
        let mut produced = Vec::with_capacity(events.len());
        for event in events {
            produced.extend(filter.apply(event).map_err(|e| {
                PipelineError::Plugin(format!("filter '{}': {}", filter.name(), e))
            })?);
        }
        events = produced;
    }
    Ok(events)
}

/// Collect buffered partial results from every filter in the chain
pub(crate) fn flush_chain(filters: &[Arc<dyn Filter>], last: bool) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    for filter in filters {
        events.extend(filter.flush(last).map_err(|e| {
            PipelineError::Plugin(format!("filter '{}': {}", filter.name(), e))
        })?);
    }
    Ok(events)
}

fn forward_surviving(queue: &BoundedQueue<QueueItem>, events: Vec<Event>, status: &WorkerStatus) {
    for event in events {
        // cancelled events are dropped silently at this boundary
        if event.is_cancelled() {
            continue;
        }
        status.set_state(WorkerState::WaitingQueue);
        queue.push(QueueItem::Event(event));
        status.set_state(WorkerState::Running);
    }
}
