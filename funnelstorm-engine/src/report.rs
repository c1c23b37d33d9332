//! Final report surface handed to the reporting layer.
use serde::{Deserialize, Serialize};

use crate::event::EventType;
use crate::metrics::{LatencySummary, MetricsSnapshot, PopulationStats};
use crate::threshold::{self, ThresholdSpec, ThresholdVerdict};

/// Per-event-type row of the final report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventReportRow {
    pub event_type: EventType,
    pub attempted: u64,
    pub accepted: u64,
    pub failed: u64,
    pub success_rate: f64,
}

/// Everything a completed run reports: counts, rates, latency percentiles,
/// population counters, and the threshold verdicts. Always produced, even
/// when most calls failed — mass failure is data, not a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub source: String,
    pub duration_secs: f64,
    pub events: Vec<EventReportRow>,
    pub overall_error_rate: f64,
    pub latency: LatencySummary,
    pub population: PopulationStats,
    pub thresholds: Vec<ThresholdVerdict>,
    pub passed: bool,
}

impl RunReport {
    /// Folds a final snapshot and the configured thresholds into the report.
    #[must_use]
    pub fn build(
        source: &str,
        specs: &[ThresholdSpec],
        snapshot: &MetricsSnapshot,
        duration_secs: f64,
    ) -> Self {
        let verdicts = threshold::evaluate(specs, snapshot);
        let passed = threshold::overall_pass(&verdicts);
        let events = snapshot
            .events
            .iter()
            .map(|stats| EventReportRow {
                event_type: stats.event_type,
                attempted: stats.attempted(),
                accepted: stats.accepted,
                failed: stats.failed,
                success_rate: stats.success_rate(),
            })
            .collect();

        Self {
            source: source.to_string(),
            duration_secs,
            events,
            overall_error_rate: snapshot.overall_error_rate(),
            latency: snapshot.latency,
            population: snapshot.population,
            thresholds: verdicts,
            passed,
        }
    }

    /// Row for one event type; zeroes when the run never fired it.
    #[must_use]
    pub fn event(&self, ty: EventType) -> EventReportRow {
        self.events
            .iter()
            .copied()
            .find(|row| row.event_type == ty)
            .unwrap_or(EventReportRow {
                event_type: ty,
                attempted: 0,
                accepted: 0,
                failed: 0,
                success_rate: 1.0,
            })
    }
}
