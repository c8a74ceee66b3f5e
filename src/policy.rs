use crate::plugin::Filter;
use std::sync::Arc;
use tracing::warn;

/// Computed default for the filter-worker count: half the available
/// processing units, never less than one.
pub fn default_worker_count() -> usize {
    (num_cpus::get() / 2).max(1)
}

/// Resolve how many filter workers may run concurrently.
///
/// Filters sharing a chain across workers is only sound when every unit in
/// the chain declares itself thread-safe. With any unsafe filter present the
/// count is forced to one, unless the operator explicitly asks for more:
/// the override is honored with a warning, and correctness becomes the
/// operator's responsibility. Misused, the override can race a non
/// thread-safe filter across workers; the warning is the only guard rail.
pub fn resolve_worker_count(
    filters: &[Arc<dyn Filter>],
    requested: Option<usize>,
    default_count: usize,
) -> usize {
    let unsafe_filters: Vec<&str> = filters
        .iter()
        .filter(|f| !f.thread_safe())
        .map(|f| f.name())
        .collect();

    if unsafe_filters.is_empty() {
        return requested.unwrap_or(default_count).max(1);
    }

    match requested {
        None | Some(0) | Some(1) => 1,
        Some(count) => {
            warn!(
                workers = count,
                filters = %unsafe_filters.join(", "),
                "filter chain contains units not declared thread-safe; \
                 running them across multiple workers may corrupt state"
            );
            count
        }
    }
}
