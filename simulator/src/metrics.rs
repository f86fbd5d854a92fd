//! Simulation metrics.

use std::collections::VecDeque;

use serde::Serialize;

/// Simulation metrics.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationMetrics {
    /// Transactions created.
    pub transactions: u64,
    /// Split edits applied (amount, price, account, reconcile).
    pub edits: u64,
    /// Splits removed and discarded.
    pub removals: u64,
    /// Rebalances performed.
    pub rebalances: u64,
    /// Rebalances that appended a mirror split.
    pub mirrors_created: u64,
    /// Rebalances that left a lone source split alone.
    pub single_entry: u64,
    /// Transactions found not summing to zero outside single-entry.
    pub invariant_violations: u64,
    /// Operations rejected as contract violations.
    pub contract_errors: u64,
    /// Rebalance latency samples (us).
    #[serde(skip)]
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    #[serde(skip)]
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            transactions: 0,
            edits: 0,
            removals: 0,
            rebalances: 0,
            mirrors_created: 0,
            single_entry: 0,
            invariant_violations: 0,
            contract_errors: 0,
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    /// Record one rebalance and how long it took.
    pub fn record_rebalance(&mut self, latency_us: u64) {
        self.rebalances += 1;
        self.push_sample(latency_us);
    }

    fn push_sample(&mut self, latency_us: u64) {
        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_us);
    }

    /// Fold a worker's counters into these.
    pub fn merge(&mut self, other: &SimulationMetrics) {
        self.transactions += other.transactions;
        self.edits += other.edits;
        self.removals += other.removals;
        self.rebalances += other.rebalances;
        self.mirrors_created += other.mirrors_created;
        self.single_entry += other.single_entry;
        self.invariant_violations += other.invariant_violations;
        self.contract_errors += other.contract_errors;
        for sample in &other.latency_samples {
            self.push_sample(*sample);
        }
    }

    /// Get average rebalance latency in us.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    /// Get p99 rebalance latency.
    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    pub fn is_clean(&self) -> bool {
        self.invariant_violations == 0 && self.contract_errors == 0
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}
