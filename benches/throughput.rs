use criterion::{black_box, criterion_group, criterion_main, Criterion};
use event_pipeline::{
    Event, EventSink, Filter, Input, Output, Pipeline, PipelineSettings,
    Result as PipelineResult, TopologyBuilder,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct GeneratorInput {
    count: usize,
    stop: AtomicBool,
}

impl GeneratorInput {
    fn new(count: usize) -> Arc<Self> {
        Arc::new(Self {
            count,
            stop: AtomicBool::new(false),
        })
    }
}

impl Input for GeneratorInput {
    fn name(&self) -> &str {
        "generator"
    }

    fn run(&self, sink: &EventSink) -> PipelineResult<()> {
        for i in 0..self.count {
            if self.stopping() {
                break;
            }
            sink.push(Event::new(black_box(vec![i as u8; 32])));
        }
        Ok(())
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn clone_unit(&self) -> Arc<dyn Input> {
        GeneratorInput::new(self.count)
    }
}

struct PassFilter;

impl Filter for PassFilter {
    fn name(&self) -> &str {
        "pass"
    }

    fn thread_safe(&self) -> bool {
        true
    }

    fn apply(&self, event: Event) -> PipelineResult<Vec<Event>> {
        Ok(vec![event])
    }
}

struct CountOutput {
    seen: AtomicUsize,
}

impl Output for CountOutput {
    fn name(&self) -> &str {
        "count"
    }

    fn handle(&self, _event: &Event) -> PipelineResult<()> {
        self.seen.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn run_pipeline(events: usize, filtered: bool) {
    let mut builder = TopologyBuilder::new()
        .input(GeneratorInput::new(events))
        .output(Arc::new(CountOutput {
            seen: AtomicUsize::new(0),
        }));
    if filtered {
        builder = builder.filter(Arc::new(PassFilter));
    }
    let topology = builder.build().expect("Build failed");

    let settings = PipelineSettings {
        queue_capacity: 100,
        ..PipelineSettings::default()
    };
    Pipeline::new(topology, settings).run().expect("Run failed");
}

fn benchmark_passthrough_throughput(c: &mut Criterion) {
    c.bench_function("passthrough_1000_events", |b| {
        b.iter(|| run_pipeline(1000, false));
    });
}

fn benchmark_filtered_throughput(c: &mut Criterion) {
    c.bench_function("filtered_1000_events", |b| {
        b.iter(|| run_pipeline(1000, true));
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = benchmark_passthrough_throughput, benchmark_filtered_throughput
);
criterion_main!(benches);
