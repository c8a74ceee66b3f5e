//! A staged event-processing pipeline engine.
//!
//! Records move through three worker pools (input → filter → output)
//! connected by bounded FIFO queues. Backpressure is blocking: a slow stage
//! stalls its producers instead of dropping events. Shutdown is cooperative
//! and sentinel-driven, so every stage drains fully before the pipeline
//! stops.
//!
//! # Features
//!
//! - Bounded lock-free queues as the sole transport between stages
//! - One worker per input unit, replicated per its configured parallelism
//! - Filter-worker count derived from per-filter thread-safety declarations
//! - Periodic and final flush signaling for stateful filters
//! - Crash isolation: failed inputs restart with backoff, filter-chain
//!   failures terminate the pipeline cleanly
//! - Live introspection of queue depths and per-worker status
//!
//! # Example
//!
//! ```ignore
//! use event_pipeline::{Pipeline, PipelineSettings, TopologyBuilder};
//! use std::sync::Arc;
//!
//! let topology = TopologyBuilder::new()
//!     .input(my_input)
//!     .filter(my_filter)
//!     .output(my_output)
//!     .build()?;
//!
//! let pipeline = Arc::new(Pipeline::new(topology, PipelineSettings::default()));
//!
//! // stop from another thread (or let the inputs finish on their own)
//! let handle = {
//!     let pipeline = Arc::clone(&pipeline);
//!     std::thread::spawn(move || pipeline.shutdown(|| ()))
//! };
//!
//! let status = pipeline.run()?;
//! handle.join().unwrap();
//! ```

pub mod error;
pub mod event;
pub mod inspect;
pub mod pipeline;
pub mod plugin;
pub mod policy;
pub mod queue;
mod stage;
pub mod topology;

// Re-exports for convenience
pub use error::{PipelineError, Result};
pub use event::{Event, QueueItem};
pub use inspect::{PipelineReport, WorkerSnapshot, WorkerState};
pub use pipeline::{Pipeline, PipelineSettings, PipelineState, DEFAULT_QUEUE_CAPACITY};
pub use plugin::{EventSink, Filter, Input, Output};
pub use policy::{default_worker_count, resolve_worker_count};
pub use queue::BoundedQueue;
pub use topology::{InputSpec, Topology, TopologyBuilder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
