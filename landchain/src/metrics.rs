// Copyright (c) 2024 Botho Foundation

//! Ledger observability.
//!
//! The ledger reports what it does through [`LedgerObserver`]. Control flow
//! never depends on the observer. [`LedgerMetrics`] is a Prometheus-backed
//! observer with its own registry.
//!
//! ## Metrics Exported
//! - `landchain_blocks_mined_total` - Blocks mined, rebuilds included (counter)
//! - `landchain_mining_attempts_total` - Hashes computed while mining (counter)
//! - `landchain_mining_duration_seconds` - Time to mine one block (histogram)
//! - `landchain_chain_height` - Index of the chain tip (gauge)
//! - `landchain_validation_failures_total` - Validation failures by category (counter)
//! - `landchain_signatures_total` - Signatures attached to blocks (counter)
//! - `landchain_chain_rebuilds_total` - Completed rebuilds from the log (counter)

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

use crate::miner::MiningStats;
use crate::validation::ValidationFailure;

/// Receives ledger events. Every method defaults to a no-op.
pub trait LedgerObserver: Send + Sync {
    fn block_mined(&self, _index: u64, _stats: &MiningStats) {}

    fn chain_height(&self, _height: u64) {}

    fn validation_failed(&self, _failure: &ValidationFailure) {}

    fn signature_added(&self, _block_index: u64) {}

    fn chain_rebuilt(&self, _blocks: usize, _elapsed: Duration) {}
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl LedgerObserver for NoopObserver {}

/// Prometheus metrics for one ledger instance
pub struct LedgerMetrics {
    registry: Registry,
    pub blocks_mined: IntCounter,
    pub mining_attempts: IntCounter,
    pub mining_duration: Histogram,
    pub chain_height: IntGauge,
    pub validation_failures: IntCounterVec,
    pub signatures: IntCounter,
    pub rebuilds: IntCounter,
}

impl LedgerMetrics {
    /// Create a new metrics registry with all metrics registered
    pub fn new() -> Self {
        let registry = Registry::new();

        let blocks_mined = IntCounter::with_opts(Opts::new(
            "landchain_blocks_mined_total",
            "Blocks mined, rebuilds included",
        ))
        .expect("metric can be created");

        let mining_attempts = IntCounter::with_opts(Opts::new(
            "landchain_mining_attempts_total",
            "Hashes computed while mining",
        ))
        .expect("metric can be created");

        let mining_duration = Histogram::with_opts(
            HistogramOpts::new(
                "landchain_mining_duration_seconds",
                "Time to mine one block",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )
        .expect("metric can be created");

        let chain_height = IntGauge::with_opts(Opts::new(
            "landchain_chain_height",
            "Index of the chain tip",
        ))
        .expect("metric can be created");

        let validation_failures = IntCounterVec::new(
            Opts::new(
                "landchain_validation_failures_total",
                "Validation failures by category",
            ),
            &["category"],
        )
        .expect("metric can be created");

        let signatures = IntCounter::with_opts(Opts::new(
            "landchain_signatures_total",
            "Signatures attached to blocks",
        ))
        .expect("metric can be created");

        let rebuilds = IntCounter::with_opts(Opts::new(
            "landchain_chain_rebuilds_total",
            "Completed rebuilds from the transaction log",
        ))
        .expect("metric can be created");

        registry
            .register(Box::new(blocks_mined.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(mining_attempts.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(mining_duration.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(chain_height.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(validation_failures.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(signatures.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(rebuilds.clone()))
            .expect("collector can be registered");

        Self {
            registry,
            blocks_mined,
            mining_attempts,
            mining_duration,
            chain_height,
            validation_failures,
            signatures,
            rebuilds,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}

impl Default for LedgerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerObserver for LedgerMetrics {
    fn block_mined(&self, index: u64, stats: &MiningStats) {
        self.blocks_mined.inc();
        self.mining_attempts.inc_by(stats.attempts);
        self.mining_duration.observe(stats.elapsed.as_secs_f64());
        self.chain_height.set(index as i64);
    }

    fn chain_height(&self, height: u64) {
        self.chain_height.set(height as i64);
    }

    fn validation_failed(&self, failure: &ValidationFailure) {
        self.validation_failures
            .with_label_values(&[failure.category().as_str()])
            .inc();
    }

    fn signature_added(&self, _block_index: u64) {
        self.signatures.inc();
    }

    fn chain_rebuilt(&self, blocks: usize, _elapsed: Duration) {
        self.rebuilds.inc();
        self.chain_height.set(blocks.saturating_sub(1) as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = LedgerMetrics::new();

        metrics.block_mined(
            3,
            &MiningStats {
                attempts: 250,
                elapsed: Duration::from_millis(2),
            },
        );
        metrics.signature_added(3);
        metrics.validation_failed(&ValidationFailure::EmptyChain);

        assert_eq!(metrics.blocks_mined.get(), 1);
        assert_eq!(metrics.mining_attempts.get(), 250);
        assert_eq!(metrics.chain_height.get(), 3);
        assert_eq!(metrics.signatures.get(), 1);
        assert_eq!(
            metrics
                .validation_failures
                .with_label_values(&["structure"])
                .get(),
            1
        );

        let output = metrics.encode().unwrap();
        assert!(output.contains("landchain_blocks_mined_total"));
        assert!(output.contains("landchain_mining_duration_seconds"));
        assert!(output.contains("category=\"structure\""));
    }

    #[test]
    fn test_rebuild_sets_height() {
        let metrics = LedgerMetrics::new();
        metrics.chain_rebuilt(5, Duration::from_millis(10));
        assert_eq!(metrics.rebuilds.get(), 1);
        assert_eq!(metrics.chain_height.get(), 4);
    }
}
