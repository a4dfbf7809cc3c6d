//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `voting_votes_cast_total` - Votes committed
//! - `voting_votes_rejected_total` - Votes refused (already voted, unknown candidate, ...)
//! - `voting_candidates` - Registered candidates
//! - `voting_commit_batch_size` - Histogram of commit group sizes
//! - `voting_commit_duration_seconds` - Histogram of commit latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Each instance owns its registry, so several ledgers can live in one process.
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Votes committed
    pub votes_cast: IntCounter,

    /// Votes rejected
    pub votes_rejected: IntCounter,

    /// Registered candidates
    pub candidates: IntGauge,

    /// Commit group size histogram
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

        let votes_cast = IntCounter::new("voting_votes_cast_total", "Votes committed")?;
        registry.register(Box::new(votes_cast.clone()))?;

        let votes_rejected =
            IntCounter::new("voting_votes_rejected_total", "Votes refused by the ledger")?;
        registry.register(Box::new(votes_rejected.clone()))?;

        let candidates = IntGauge::new("voting_candidates", "Registered candidates")?;
        registry.register(Box::new(candidates.clone()))?;

        let batch_size = Histogram::with_opts(
            HistogramOpts::new("voting_commit_batch_size", "Histogram of commit group sizes")
                .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
        )?;
        registry.register(Box::new(batch_size.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "voting_commit_duration_seconds",
                "Histogram of commit latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        Ok(Self {
            votes_cast,
            votes_rejected,
            candidates,
            batch_size,
            commit_duration,
            registry,
        })
    }

    /// Record a committed group of votes
    pub fn record_commit(&self, votes: usize, duration_seconds: f64) {
        self.votes_cast.inc_by(votes as u64);
        self.batch_size.observe(votes as f64);
        self.commit_duration.observe(duration_seconds);
    }

    /// Record a rejected vote
    pub fn record_rejection(&self) {
        self.votes_rejected.inc();
    }

    /// Update the candidate gauge
    pub fn set_candidates(&self, count: u64) {
        self.candidates.set(count as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
