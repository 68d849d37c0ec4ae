//! Metrics collection for ledger round trips
//!
//! # Metrics
//!
//! - `ledger_submits_total` - Submits sent through the pool
//! - `ledger_evaluates_total` - Evaluates sent through the pool
//! - `ledger_conflicts_total` - Submits rejected with an MVCC read conflict
//! - `ledger_timeouts_total` - Round trips that exceeded their deadline
//! - `ledger_submit_duration_seconds` - Histogram of submit latencies
//! - `ledger_connections_in_use` - Leases currently held

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct GatewayMetrics {
    /// Submits sent
    pub submits_total: IntCounter,

    /// Evaluates sent
    pub evaluates_total: IntCounter,

    /// MVCC conflicts observed
    pub conflicts_total: IntCounter,

    /// Deadline overruns
    pub timeouts_total: IntCounter,

    /// Submit duration histogram
    pub submit_duration: Histogram,

    /// Leases in use
    pub connections_in_use: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl GatewayMetrics {
    /// Create new metrics collector on a private registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let submits_total =
            IntCounter::new("ledger_submits_total", "Submits sent through the pool")?;
        registry.register(Box::new(submits_total.clone()))?;

        let evaluates_total =
            IntCounter::new("ledger_evaluates_total", "Evaluates sent through the pool")?;
        registry.register(Box::new(evaluates_total.clone()))?;

        let conflicts_total = IntCounter::new(
            "ledger_conflicts_total",
            "Submits rejected with an MVCC read conflict",
        )?;
        registry.register(Box::new(conflicts_total.clone()))?;

        let timeouts_total = IntCounter::new(
            "ledger_timeouts_total",
            "Round trips that exceeded their deadline",
        )?;
        registry.register(Box::new(timeouts_total.clone()))?;

        let submit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_submit_duration_seconds",
                "Histogram of submit latencies",
            )
            .buckets(vec![0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0]),
        )?;
        registry.register(Box::new(submit_duration.clone()))?;

        let connections_in_use =
            IntGauge::new("ledger_connections_in_use", "Leases currently held")?;
        registry.register(Box::new(connections_in_use.clone()))?;

        Ok(Self {
            submits_total,
            evaluates_total,
            conflicts_total,
            timeouts_total,
            submit_duration,
            connections_in_use,
            registry,
        })
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
