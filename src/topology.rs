use crate::error::{PipelineError, Result};
use crate::plugin::{Filter, Input, Output};
use std::sync::Arc;

/// An input unit together with its configured parallelism
pub struct InputSpec {
    unit: Arc<dyn Input>,
    parallelism: usize,
}

impl InputSpec {
    /// The input unit
    pub fn unit(&self) -> &Arc<dyn Input> {
        &self.unit
    }

    /// How many workers run this unit
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }
}

/// Builder for a compiled pipeline topology
pub struct TopologyBuilder {
    inputs: Vec<InputSpec>,
    filters: Vec<Arc<dyn Filter>>,
    outputs: Vec<Arc<dyn Output>>,
}

impl TopologyBuilder {
    /// Create a new topology builder
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            filters: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Add an input unit with a single worker
    pub fn input(self, unit: Arc<dyn Input>) -> Self {
        self.input_with_parallelism(unit, 1)
    }

    /// Add an input unit replicated over `parallelism` workers
    pub fn input_with_parallelism(mut self, unit: Arc<dyn Input>, parallelism: usize) -> Self {
        self.inputs.push(InputSpec { unit, parallelism });
        self
    }

    /// Append a unit to the filter chain
    pub fn filter(mut self, unit: Arc<dyn Filter>) -> Self {
        self.filters.push(unit);
        self
    }

    /// Append a unit to the output chain
    pub fn output(mut self, unit: Arc<dyn Output>) -> Self {
        self.outputs.push(unit);
        self
    }

    /// Validate and build the topology
    pub fn build(self) -> Result<Topology> {
        if self.inputs.is_empty() {
            return Err(PipelineError::Configuration(
                "topology has no input units".into(),
            ));
        }
        if self.outputs.is_empty() {
            return Err(PipelineError::Configuration(
                "topology has no output units".into(),
            ));
        }
        if let Some(spec) = self.inputs.iter().find(|s| s.parallelism == 0) {
            return Err(PipelineError::Configuration(format!(
                "input '{}' declares zero parallelism",
                spec.unit.name()
            )));
        }
        Ok(Topology {
            inputs: self.inputs,
            filters: self.filters,
            outputs: self.outputs,
        })
    }
}

impl Default for TopologyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The compiled, immutable description of which units run in which stage.
///
/// Produced from the external configuration compiler's output; the engine
/// only consumes it.
pub struct Topology {
    inputs: Vec<InputSpec>,
    filters: Vec<Arc<dyn Filter>>,
    outputs: Vec<Arc<dyn Output>>,
}

impl Topology {
    /// Ordered input units with their parallelism
    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    /// The ordered filter chain
    pub fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }

    /// The ordered output chain
    pub fn outputs(&self) -> &[Arc<dyn Output>] {
        &self.outputs
    }

    /// Whether the topology has any filters
    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    /// Expand input units into one unit per worker. Units with parallelism
    /// above one are cloned once per extra worker.
    pub(crate) fn expand_inputs(&self) -> Vec<Arc<dyn Input>> {
        let mut units: Vec<Arc<dyn Input>> = Vec::new();
        for spec in &self.inputs {
            units.push(Arc::clone(&spec.unit));
            for _ in 1..spec.parallelism {
                units.push(spec.unit.clone_unit());
            }
        }
        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::event::Event;
    use crate::plugin::EventSink;
    use std::sync::atomic::{AtomicBool, Ordering};

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

        fn run(&self, _sink: &EventSink) -> crate::Result<()> {
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

    struct NullOutput;

    impl Output for NullOutput {
        fn name(&self) -> &str {
            "null"
        }

        fn handle(&self, _event: &Event) -> crate::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_build_requires_inputs() {
        let result = TopologyBuilder::new().output(Arc::new(NullOutput)).build();
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_build_requires_outputs() {
        let result = TopologyBuilder::new().input(NullInput::new()).build();
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_build_rejects_zero_parallelism() {
        let result = TopologyBuilder::new()
            .input_with_parallelism(NullInput::new(), 0)
            .output(Arc::new(NullOutput))
            .build();
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_expand_inputs_clones_parallel_units() {
        let topology = TopologyBuilder::new()
            .input(NullInput::new())
            .input_with_parallelism(NullInput::new(), 3)
            .output(Arc::new(NullOutput))
            .build()
            .unwrap();
        assert_eq!(topology.expand_inputs().len(), 4);
    }
}
