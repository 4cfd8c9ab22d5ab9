//! Metrics collection: transition counters, retrieval hit rate, compression
//! ratio and per-operation latency percentiles.
//!
//! The collector's lock is a leaf: nothing else is acquired while it is
//! held, so it may be called with the store lock taken.

use crate::segment::Tier;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Default number of latency samples kept per operation.
pub const DEFAULT_LATENCY_WINDOW: usize = 1024;

/// Public operation classes with tracked latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Add,
    Remove,
    Retrieve,
    Optimize,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Add,
        Operation::Remove,
        Operation::Retrieve,
        Operation::Optimize,
    ];
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Add => "add",
            Operation::Remove => "remove",
            Operation::Retrieve => "retrieve",
            Operation::Optimize => "optimize",
        };
        f.write_str(s)
    }
}

/// Tier transitions performed by one call, or cumulatively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationSummary {
    pub promotions: u64,
    pub demotions: u64,
    pub evictions: u64,
    pub compressions: u64,
}

impl OptimizationSummary {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn total(&self) -> u64 {
        self.promotions + self.demotions + self.evictions + self.compressions
    }

    pub fn absorb(&mut self, other: OptimizationSummary) {
        self.promotions += other.promotions;
        self.demotions += other.demotions;
        self.evictions += other.evictions;
        self.compressions += other.compressions;
    }
}

/// Occupancy of one tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierStats {
    pub tier: Tier,
    pub segments: usize,
    pub tokens: usize,
    /// Bytes held by segment bodies in their resident form.
    pub bytes: usize,
    /// Token capacity (Active, Working) or segment cap (LongTerm), if bounded.
    pub capacity: Option<usize>,
    pub utilization: f64,
}

/// Latency percentiles for one operation class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub operation: Operation,
    pub samples: usize,
    pub p50_ms: f64,
    pub p99_ms: f64,
}

/// Point-in-time metrics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextMetrics {
    pub tiers: Vec<TierStats>,
    pub total_segments: usize,
    pub retrievals: u64,
    pub retrieval_hits: u64,
    pub retrieval_hit_rate: f64,
    /// Mean `compressed / original` over applied compressions; `1.0` when
    /// nothing has been compressed.
    pub average_compression_ratio: f64,
    pub transitions: OptimizationSummary,
    pub latency: Vec<LatencyStats>,
    pub embedding_cache_hits: u64,
    pub embedding_cache_misses: u64,
}

impl ContextMetrics {
    pub fn tier(&self, tier: Tier) -> Option<&TierStats> {
        self.tiers.iter().find(|t| t.tier == tier)
    }

    pub fn latency_of(&self, op: Operation) -> Option<&LatencyStats> {
        self.latency.iter().find(|l| l.operation == op)
    }
}

#[derive(Debug, Default)]
struct Counters {
    transitions: OptimizationSummary,
    retrievals: u64,
    retrieval_hits: u64,
    ratio_sum: f64,
    ratio_count: u64,
    latencies: HashMap<Operation, VecDeque<f64>>,
}

/// Thread-safe metrics sink.
#[derive(Debug)]
pub struct MetricsCollector {
    enabled: bool,
    window: usize,
    counters: Mutex<Counters>,
}

impl MetricsCollector {
    pub fn new(enabled: bool, window: usize) -> Self {
        Self {
            enabled,
            window: window.max(1),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn with<R>(&self, f: impl FnOnce(&mut Counters) -> R) -> Option<R> {
        if !self.enabled {
            return None;
        }
        let mut c = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        Some(f(&mut c))
    }

    pub fn record_transitions(&self, summary: OptimizationSummary) {
        if summary.is_empty() {
            return;
        }
        self.with(|c| c.transitions.absorb(summary));
    }

    pub fn record_compression(&self, achieved_ratio: f64) {
        self.with(|c| {
            c.ratio_sum += achieved_ratio;
            c.ratio_count += 1;
        });
    }

    /// A hit is a query that returned at least one segment.
    pub fn record_retrieval(&self, results: usize) {
        self.with(|c| {
            c.retrievals += 1;
            if results > 0 {
                c.retrieval_hits += 1;
            }
        });
    }

    pub fn record_latency(&self, op: Operation, elapsed: Duration) {
        let window = self.window;
        self.with(|c| {
            let samples = c.latencies.entry(op).or_default();
            if samples.len() == window {
                samples.pop_front();
            }
            samples.push_back(elapsed.as_micros() as f64 / 1000.0);
        });
    }

    /// Combine recorded counters with tier occupancy and cache stats.
    pub fn snapshot(&self, tiers: Vec<TierStats>, cache: (u64, u64)) -> ContextMetrics {
        let c = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let total_segments = tiers.iter().map(|t| t.segments).sum();
        let latency = Operation::ALL
            .iter()
            .filter_map(|op| {
                let samples = c.latencies.get(op)?;
                let mut sorted: Vec<f64> = samples.iter().copied().collect();
                sorted.sort_by(f64::total_cmp);
                Some(LatencyStats {
                    operation: *op,
                    samples: sorted.len(),
                    p50_ms: percentile(&sorted, 0.50),
                    p99_ms: percentile(&sorted, 0.99),
                })
            })
            .collect();

        ContextMetrics {
            tiers,
            total_segments,
            retrievals: c.retrievals,
            retrieval_hits: c.retrieval_hits,
            retrieval_hit_rate: ratio(c.retrieval_hits, c.retrievals),
            average_compression_ratio: if c.ratio_count == 0 {
                1.0
            } else {
                c.ratio_sum / c.ratio_count as f64
            },
            transitions: c.transitions,
            latency,
            embedding_cache_hits: cache.0,
            embedding_cache_misses: cache.1,
        }
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Nearest-rank percentile of sorted samples.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> Vec<TierStats> {
        vec![TierStats {
            tier: Tier::Active,
            segments: 2,
            tokens: 50,
            bytes: 300,
            capacity: Some(100),
            utilization: 0.5,
        }]
    }

    #[test]
    fn percentiles_use_nearest_rank() {
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&samples, 0.5), 50.0);
        assert_eq!(percentile(&samples, 0.99), 99.0);
        assert_eq!(percentile(&[7.0], 0.99), 7.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn hit_rate_and_compression_ratio() {
        let m = MetricsCollector::new(true, 16);
        m.record_retrieval(3);
        m.record_retrieval(0);
        m.record_compression(0.2);
        m.record_compression(0.4);
        let snap = m.snapshot(tiers(), (4, 1));
        assert_eq!(snap.retrievals, 2);
        assert_eq!(snap.retrieval_hit_rate, 0.5);
        assert!((snap.average_compression_ratio - 0.3).abs() < 1e-12);
        assert_eq!(snap.total_segments, 2);
        assert_eq!(snap.embedding_cache_hits, 4);
        assert_eq!(snap.tier(Tier::Active).map(|t| t.tokens), Some(50));
    }

    #[test]
    fn latency_window_slides() {
        let m = MetricsCollector::new(true, 2);
        for ms in [100, 1, 2] {
            m.record_latency(Operation::Add, Duration::from_millis(ms));
        }
        let snap = m.snapshot(vec![], (0, 0));
        let add = snap.latency_of(Operation::Add).unwrap();
        assert_eq!(add.samples, 2);
        assert_eq!(add.p99_ms, 2.0);
        assert!(snap.latency_of(Operation::Remove).is_none());
    }

    #[test]
    fn disabled_collector_records_nothing() {
        let m = MetricsCollector::new(false, 8);
        m.record_retrieval(1);
        m.record_transitions(OptimizationSummary {
            demotions: 2,
            ..Default::default()
        });
        let snap = m.snapshot(tiers(), (0, 0));
        assert_eq!(snap.retrievals, 0);
        assert!(snap.transitions.is_empty());
        assert_eq!(snap.tiers.len(), 1);
    }

    #[test]
    fn summaries_accumulate() {
        let mut a = OptimizationSummary {
            promotions: 1,
            ..Default::default()
        };
        a.absorb(OptimizationSummary {
            promotions: 1,
            evictions: 2,
            ..Default::default()
        });
        assert_eq!(a.promotions, 2);
        assert_eq!(a.total(), 4);
    }
}
