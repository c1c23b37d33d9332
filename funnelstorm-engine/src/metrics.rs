//! Concurrent outcome aggregation: counters, rates, and latency percentiles.
//!
//! The aggregator is the only shared mutable state in a run. Every update is
//! an atomic increment or a short mutex push, so folds commute across
//! arbitrarily interleaved session tasks.
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::event::{BeaconOutcome, EventType};
use crate::session::SessionState;

#[derive(Debug, Default)]
struct EventCounters {
    accepted: AtomicU64,
    failed: AtomicU64,
}

/// Shared sink for every beacon outcome and population transition.
#[derive(Debug)]
pub struct MetricsAggregator {
    events: [EventCounters; EventType::COUNT],
    latencies_ms: Mutex<Vec<u64>>,
    spawned: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    aborted: AtomicU64,
    saturation: AtomicU64,
    active: AtomicUsize,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Default::default(),
            latencies_ms: Mutex::new(Vec::new()),
            spawned: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
            saturation: AtomicU64::new(0),
            active: AtomicUsize::new(0),
        }
    }

    /// Folds one beacon outcome, tagged by event type.
    pub fn record_outcome(&self, event_type: EventType, outcome: &BeaconOutcome) {
        let counters = &self.events[event_type.index()];
        if outcome.accepted {
            counters.accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        let ms = outcome.latency_ms();
        self.latencies_ms
            .lock()
            .expect("latency buffer poisoned")
            .push(ms);
    }

    pub fn record_spawned(&self) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a session reaching a terminal state and frees its slot in the
    /// live-population gauge.
    pub fn record_session_end(&self, state: SessionState) {
        match state {
            SessionState::Dropped => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            SessionState::Completed => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            SessionState::Aborted => {
                self.aborted.fetch_add(1, Ordering::Relaxed);
            }
            // Non-terminal states never free a slot; ending a session in one
            // of them is a state-machine bug.
            SessionState::Entering
            | SessionState::Dwelling
            | SessionState::Bounced
            | SessionState::Exiting => {
                debug_assert!(false, "session ended in non-terminal state {state}");
            }
        }
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Counts spawn attempts the scheduler had to drop.
    pub fn record_saturation(&self, dropped_spawns: u64) {
        self.saturation.fetch_add(dropped_spawns, Ordering::Relaxed);
    }

    /// Instantaneous count of live sessions.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every statistic, safe to take mid-run.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut samples = self
            .latencies_ms
            .lock()
            .expect("latency buffer poisoned")
            .clone();
        samples.sort_unstable();

        let events = EventType::ALL.map(|ty| {
            let counters = &self.events[ty.index()];
            EventStats {
                event_type: ty,
                accepted: counters.accepted.load(Ordering::Relaxed),
                failed: counters.failed.load(Ordering::Relaxed),
            }
        });

        MetricsSnapshot {
            events: events.to_vec(),
            latency: LatencySummary::from_sorted(&samples),
            population: PopulationStats {
                spawned: self.spawned.load(Ordering::Relaxed),
                dropped: self.dropped.load(Ordering::Relaxed),
                completed: self.completed.load(Ordering::Relaxed),
                aborted: self.aborted.load(Ordering::Relaxed),
                scheduling_saturation: self.saturation.load(Ordering::Relaxed),
            },
            latency_samples: samples,
        }
    }
}

/// Counters for one event type. `attempted` is derived, which keeps the
/// conservation invariant `accepted + failed == attempted` true at every
/// observation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    pub event_type: EventType,
    pub accepted: u64,
    pub failed: u64,
}

impl EventStats {
    #[must_use]
    pub const fn attempted(&self) -> u64 {
        self.accepted + self.failed
    }

    /// Accepted / attempted; 1.0 when nothing was attempted, so thresholds on
    /// an event type a profile never fires do not spuriously fail.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        let attempted = self.attempted();
        if attempted == 0 {
            1.0
        } else {
            self.accepted as f64 / attempted as f64
        }
    }
}

/// Latency distribution summary over every beacon call in the run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

impl LatencySummary {
    #[allow(clippy::cast_precision_loss)]
    fn from_sorted(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self {
                count: 0,
                min_ms: 0,
                max_ms: 0,
                mean_ms: 0.0,
                p50_ms: 0,
                p95_ms: 0,
                p99_ms: 0,
            };
        }
        let sum: u128 = samples.iter().map(|&ms| u128::from(ms)).sum();
        Self {
            count: samples.len() as u64,
            min_ms: samples[0],
            max_ms: samples[samples.len() - 1],
            mean_ms: sum as f64 / samples.len() as f64,
            p50_ms: percentile_sorted(samples, 50.0),
            p95_ms: percentile_sorted(samples, 95.0),
            p99_ms: percentile_sorted(samples, 99.0),
        }
    }
}

/// Population counters for the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationStats {
    pub spawned: u64,
    pub dropped: u64,
    pub completed: u64,
    pub aborted: u64,
    pub scheduling_saturation: u64,
}

/// Point-in-time view used by the threshold evaluator and report writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub events: Vec<EventStats>,
    pub latency: LatencySummary,
    pub population: PopulationStats,
    /// Sorted latency samples, kept for arbitrary-percentile threshold
    /// bounds; excluded from serialized reports.
    #[serde(skip)]
    latency_samples: Vec<u64>,
}

impl MetricsSnapshot {
    /// Nearest-rank latency percentile for an arbitrary quantile.
    #[must_use]
    pub fn latency_percentile(&self, q: f64) -> u64 {
        percentile_sorted(&self.latency_samples, q)
    }

    #[must_use]
    pub fn event(&self, ty: EventType) -> EventStats {
        self.events
            .iter()
            .copied()
            .find(|stats| stats.event_type == ty)
            .unwrap_or(EventStats {
                event_type: ty,
                accepted: 0,
                failed: 0,
            })
    }

    /// Failed / attempted across all event types.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn overall_error_rate(&self) -> f64 {
        let attempted: u64 = self.events.iter().map(EventStats::attempted).sum();
        let failed: u64 = self.events.iter().map(|stats| stats.failed).sum();
        if attempted == 0 {
            0.0
        } else {
            failed as f64 / attempted as f64
        }
    }

    #[must_use]
    pub fn total_attempted(&self) -> u64 {
        self.events.iter().map(EventStats::attempted).sum()
    }
}

/// Nearest-rank percentile over an already-sorted sample buffer.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn percentile_sorted(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let q = q.clamp(0.0, 100.0);
    let rank = ((q / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ok(ms: u64) -> BeaconOutcome {
        BeaconOutcome::from_status(200, Duration::from_millis(ms))
    }

    fn rejected(ms: u64) -> BeaconOutcome {
        BeaconOutcome::from_status(503, Duration::from_millis(ms))
    }

    #[test]
    fn conservation_holds_at_every_observation_point() {
        let metrics = MetricsAggregator::new();
        for i in 0..10 {
            let outcome = if i % 3 == 0 { rejected(5) } else { ok(5) };
            metrics.record_outcome(EventType::FunnelEnter, &outcome);
            let stats = metrics.snapshot().event(EventType::FunnelEnter);
            assert_eq!(stats.accepted + stats.failed, stats.attempted());
            assert_eq!(stats.attempted(), i + 1);
        }
    }

    #[test]
    fn success_rate_and_error_rate_agree() {
        let metrics = MetricsAggregator::new();
        for _ in 0..98 {
            metrics.record_outcome(EventType::Heartbeat, &ok(10));
        }
        for _ in 0..2 {
            metrics.record_outcome(EventType::Heartbeat, &rejected(10));
        }
        let snapshot = metrics.snapshot();
        let stats = snapshot.event(EventType::Heartbeat);
        assert!((stats.success_rate() - 0.98).abs() < 1e-9);
        assert!((snapshot.overall_error_rate() - 0.02).abs() < 1e-9);
    }

    #[test]
    fn unattempted_event_type_reports_full_success() {
        let snapshot = MetricsAggregator::new().snapshot();
        assert!((snapshot.event(EventType::FunnelComplete).success_rate() - 1.0).abs() < 1e-9);
        assert!(snapshot.overall_error_rate().abs() < 1e-9);
    }

    #[test]
    fn nearest_rank_percentiles_on_known_data() {
        let sorted: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile_sorted(&sorted, 50.0), 50);
        assert_eq!(percentile_sorted(&sorted, 95.0), 95);
        assert_eq!(percentile_sorted(&sorted, 99.0), 99);
        assert_eq!(percentile_sorted(&sorted, 100.0), 100);
        assert_eq!(percentile_sorted(&[7], 50.0), 7);
        assert_eq!(percentile_sorted(&[], 95.0), 0);
    }

    #[test]
    fn latency_summary_tracks_distribution() {
        let metrics = MetricsAggregator::new();
        for ms in [10, 20, 30, 40, 1000] {
            metrics.record_outcome(EventType::FunnelEnter, &ok(ms));
        }
        let latency = metrics.snapshot().latency;
        assert_eq!(latency.count, 5);
        assert_eq!(latency.min_ms, 10);
        assert_eq!(latency.max_ms, 1000);
        assert_eq!(latency.p50_ms, 30);
        assert!((latency.mean_ms - 220.0).abs() < 1e-9);
    }

    #[test]
    fn population_gauge_tracks_spawn_and_end() {
        let metrics = MetricsAggregator::new();
        metrics.record_spawned();
        metrics.record_spawned();
        assert_eq!(metrics.active_sessions(), 2);
        metrics.record_session_end(SessionState::Completed);
        metrics.record_session_end(SessionState::Dropped);
        assert_eq!(metrics.active_sessions(), 0);
        let population = metrics.snapshot().population;
        assert_eq!(population.spawned, 2);
        assert_eq!(population.completed, 1);
        assert_eq!(population.dropped, 1);
        assert_eq!(population.aborted, 0);
    }

    #[test]
    fn saturation_events_accumulate() {
        let metrics = MetricsAggregator::new();
        metrics.record_saturation(3);
        metrics.record_saturation(2);
        assert_eq!(metrics.snapshot().population.scheduling_saturation, 5);
    }
}
