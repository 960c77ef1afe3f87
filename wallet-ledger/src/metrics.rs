//! Metrics collection for observability
//!
//! Prometheus metrics for the posting engine, registered on a private
//! registry so several ledgers can live in one process.
//!
//! # Metrics
//!
//! - `wallet_ledger_batches_committed_total` - Batches committed
//! - `wallet_ledger_transactions_posted_total` - Transactions committed
//! - `wallet_ledger_commit_failures_total` - Batches the store rejected or that timed out
//! - `wallet_ledger_invalid_batches_total` - Batches rejected before any write
//! - `wallet_ledger_batch_size` - Histogram of entries per batch
//! - `wallet_ledger_commit_duration_seconds` - Histogram of commit latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Batches committed
    pub batches_committed: IntCounter,

    /// Transactions committed
    pub transactions_posted: IntCounter,

    /// Failed commits
    pub commit_failures: IntCounter,

    /// Batches rejected during validation
    pub invalid_batches: IntCounter,

    /// Batch size histogram
    pub batch_size: Histogram,

    /// Commit duration histogram
    pub commit_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let batches_committed = IntCounter::new(
            "wallet_ledger_batches_committed_total",
            "Total number of batches committed",
        )?;
        registry.register(Box::new(batches_committed.clone()))?;

        let transactions_posted = IntCounter::new(
            "wallet_ledger_transactions_posted_total",
            "Total number of transactions committed",
        )?;
        registry.register(Box::new(transactions_posted.clone()))?;

        let commit_failures = IntCounter::new(
            "wallet_ledger_commit_failures_total",
            "Total number of batches that failed to commit",
        )?;
        registry.register(Box::new(commit_failures.clone()))?;

        let invalid_batches = IntCounter::new(
            "wallet_ledger_invalid_batches_total",
            "Total number of batches rejected before any write",
        )?;
        registry.register(Box::new(invalid_batches.clone()))?;

        let batch_size = Histogram::with_opts(
            HistogramOpts::new("wallet_ledger_batch_size", "Histogram of entries per batch")
                .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
        )?;
        registry.register(Box::new(batch_size.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "wallet_ledger_commit_duration_seconds",
                "Histogram of commit latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        Ok(Self {
            batches_committed,
            transactions_posted,
            commit_failures,
            invalid_batches,
            batch_size,
            commit_duration,
            registry,
        })
    }

    /// Record a committed batch
    pub fn record_commit(&self, transactions: usize, duration_seconds: f64) {
        self.batches_committed.inc();
        self.transactions_posted.inc_by(transactions as u64);
        self.batch_size.observe(transactions as f64);
        self.commit_duration.observe(duration_seconds);
    }

    /// Record a failed commit
    pub fn record_commit_failure(&self) {
        self.commit_failures.inc();
    }

    /// Record a batch rejected during validation
    pub fn record_invalid_batch(&self) {
        self.invalid_batches.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
