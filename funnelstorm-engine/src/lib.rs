//! Funnelstorm Engine
//!
//! Core journey simulation for load-testing a multi-step funnel tracking
//! service: a per-session stochastic state machine, a time-phased concurrency
//! ramp scheduler, and a metrics/threshold evaluator. Transport, CLI, and
//! report formatting live in the runner crate; this crate only ever talks to
//! the outside world through the [`BeaconSender`] trait.

pub mod config;
pub mod event;
pub mod funnel;
pub mod journey;
pub mod metrics;
pub mod ramp;
pub mod report;
pub mod scheduler;
pub mod session;
pub mod threshold;

// Re-export commonly used types
pub use config::{CompiledProfile, ConfigError, LoadProfile};
pub use event::{BeaconOutcome, BeaconSender, EventRecord, EventType};
pub use funnel::{DwellRange, FunnelModel, FunnelStep};
pub use journey::{JourneyRunner, JourneyTiming};
pub use metrics::{
    EventStats, LatencySummary, MetricsAggregator, MetricsSnapshot, PopulationStats,
};
pub use ramp::{RampPlan, RampStage};
pub use report::{EventReportRow, RunReport};
pub use scheduler::RampScheduler;
pub use session::{Session, SessionIdGen, SessionState};
pub use threshold::{
    Bound, BoundVerdict, Comparator, Stat, ThresholdSpec, ThresholdVerdict, evaluate, overall_pass,
};

use std::sync::Arc;

use tokio::time::Instant;

/// One configured load test: a compiled profile bound to a beacon transport.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use funnelstorm_engine::{LoadTest, LoadProfile, BeaconSender};
/// # async fn run(profile: LoadProfile, sender: Arc<dyn BeaconSender>) {
/// let test = LoadTest::new(&profile, sender).expect("profile must validate");
/// let report = test.run().await;
/// assert!(report.passed);
/// # }
/// ```
pub struct LoadTest {
    compiled: CompiledProfile,
    sender: Arc<dyn BeaconSender>,
    metrics: Arc<MetricsAggregator>,
}

impl LoadTest {
    /// Validates the profile and binds it to a transport. This is the
    /// fail-fast gate: a profile that does not compile never generates
    /// traffic.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first invalid table entry.
    pub fn new(profile: &LoadProfile, sender: Arc<dyn BeaconSender>) -> Result<Self, ConfigError> {
        Ok(Self {
            compiled: profile.compile()?,
            sender,
            metrics: Arc::new(MetricsAggregator::new()),
        })
    }

    /// Live handle to the aggregator, for mid-run observation.
    #[must_use]
    pub fn metrics(&self) -> Arc<MetricsAggregator> {
        Arc::clone(&self.metrics)
    }

    /// Compiled artifacts, mainly useful for inspection and tests.
    #[must_use]
    pub const fn compiled(&self) -> &CompiledProfile {
        &self.compiled
    }

    /// Drives the full ramp and returns the final report. Always yields a
    /// verdict; per-call failures are folded into the metrics, never raised.
    pub async fn run(&self) -> RunReport {
        let started = Instant::now();
        RampScheduler::new(
            &self.compiled,
            Arc::clone(&self.sender),
            Arc::clone(&self.metrics),
        )
        .run()
        .await;

        RunReport::build(
            &self.compiled.source,
            &self.compiled.specs,
            &self.metrics.snapshot(),
            started.elapsed().as_secs_f64(),
        )
    }
}
