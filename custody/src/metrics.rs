//! Custody engine metrics
//!
//! # Metrics
//!
//! - `custody_transitions_total{operation}` - Committed custody operations
//! - `custody_ledger_retries_total` - Attempts repeated after a transient failure
//! - `custody_ledger_conflicts_total` - MVCC conflicts seen by the retry wrapper
//! - `custody_mirror_inconsistencies_total` - Mirror writes that failed after a ledger commit
//! - `custody_ledger_submit_duration_seconds` - Ledger write latency, retries included
//! - `custody_recall_cascade_size` - Batches recalled per recall call

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct CustodyMetrics {
    /// Committed operations by name
    pub transitions_total: IntCounterVec,

    /// Retried attempts
    pub retries_total: IntCounter,

    /// Conflicts observed
    pub conflicts_total: IntCounter,

    /// Mirror writes lost after a commit
    pub mirror_inconsistencies_total: IntCounter,

    /// Ledger write latency
    pub submit_duration: Histogram,

    /// Recall fan-out
    pub recall_cascade_size: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl CustodyMetrics {
    /// Create new metrics collector on a private registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transitions_total = IntCounterVec::new(
            Opts::new(
                "custody_transitions_total",
                "Committed custody operations",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(transitions_total.clone()))?;

        let retries_total = IntCounter::new(
            "custody_ledger_retries_total",
            "Attempts repeated after a transient failure",
        )?;
        registry.register(Box::new(retries_total.clone()))?;

        let conflicts_total = IntCounter::new(
            "custody_ledger_conflicts_total",
            "MVCC conflicts seen by the retry wrapper",
        )?;
        registry.register(Box::new(conflicts_total.clone()))?;

        let mirror_inconsistencies_total = IntCounter::new(
            "custody_mirror_inconsistencies_total",
            "Mirror writes that failed after a ledger commit",
        )?;
        registry.register(Box::new(mirror_inconsistencies_total.clone()))?;

        let submit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "custody_ledger_submit_duration_seconds",
                "Ledger write latency, retries included",
            )
            .buckets(vec![0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(submit_duration.clone()))?;

        let recall_cascade_size = Histogram::with_opts(
            HistogramOpts::new(
                "custody_recall_cascade_size",
                "Batches recalled per recall call",
            )
            .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]),
        )?;
        registry.register(Box::new(recall_cascade_size.clone()))?;

        Ok(Self {
            transitions_total,
            retries_total,
            conflicts_total,
            mirror_inconsistencies_total,
            submit_duration,
            recall_cascade_size,
            registry,
        })
    }

    /// Count a committed operation
    pub fn committed(&self, operation: &str) {
        self.transitions_total
            .with_label_values(&[operation])
            .inc();
    }

    /// Committed count for one operation
    pub fn committed_count(&self, operation: &str) -> u64 {
        self.transitions_total
            .with_label_values(&[operation])
            .get()
    }

    /// Get Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
