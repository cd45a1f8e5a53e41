//! Prometheus metrics for the storage engines.
//!
//! One [`EngineMetrics`] bundle is shared by every engine instance; the
//! `source` label separates payload types ("daos", "votes", ...). The
//! bundle is cheap to clone (metric families are reference-counted) and
//! works unregistered, so library users opt in by calling
//! [`EngineMetrics::register`] with their own registry.

use std::time::Duration;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

/// Labels shared by every engine metric.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SourceLabels {
    /// The engine's source name, e.g. "daos" or "votes".
    pub source: String,
}

/// Duration buckets sized for batch commits: sub-100ms for healthy small
/// batches up to tens of seconds for a struggling sink.
fn commit_histogram() -> Histogram {
    Histogram::new(
        [
            0.02, 0.05, 0.1, 0.5, 0.8, 1.0, 1.5, 2.0, 8.0, 12.0, 16.0, 25.0,
        ]
        .into_iter(),
    )
}

/// Container for all storage-engine metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    /// Rows executed against the current transaction session.
    rows_executed: Family<SourceLabels, Counter>,

    /// Time taken to commit one batch.
    commit_duration: Family<SourceLabels, Histogram, fn() -> Histogram>,

    /// Time taken to open a new transaction session.
    session_open_duration: Family<SourceLabels, Histogram, fn() -> Histogram>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            rows_executed: Family::default(),
            commit_duration: Family::new_with_constructor(commit_histogram),
            session_open_duration: Family::new_with_constructor(commit_histogram),
        }
    }

    /// Registers all metrics under the `govsink_storage` prefix.
    pub fn register(&self, registry: &mut Registry) {
        let registry = registry.sub_registry_with_prefix("govsink_storage");
        registry.register(
            "rows_executed",
            "Rows executed against the current batch transaction",
            self.rows_executed.clone(),
        );
        registry.register(
            "commit_duration_seconds",
            "Time taken to commit one batch",
            self.commit_duration.clone(),
        );
        registry.register(
            "session_open_duration_seconds",
            "Time taken to open a new transaction session",
            self.session_open_duration.clone(),
        );
    }

    pub(crate) fn inc_rows(&self, source: &str) {
        self.rows_executed
            .get_or_create(&SourceLabels {
                source: source.to_string(),
            })
            .inc();
    }

    pub(crate) fn observe_commit(&self, source: &str, elapsed: Duration) {
        self.commit_duration
            .get_or_create(&SourceLabels {
                source: source.to_string(),
            })
            .observe(elapsed.as_secs_f64());
    }

    pub(crate) fn observe_session_open(&self, source: &str, elapsed: Duration) {
        self.session_open_duration
            .get_or_create(&SourceLabels {
                source: source.to_string(),
            })
            .observe(elapsed.as_secs_f64());
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
