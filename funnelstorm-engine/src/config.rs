//! Load-profile configuration surface and fail-fast validation.
use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::funnel::{FunnelModel, FunnelStep};
use crate::journey::JourneyTiming;
use crate::ramp::{RampPlan, RampStage};
use crate::threshold::ThresholdSpec;

/// Configuration problems that must stop the engine before any traffic is
/// generated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("funnel has no steps")]
    EmptyFunnel,
    #[error("step '{step}': {field} {value} is outside [0, 1]")]
    RateOutOfRange {
        step: String,
        field: &'static str,
        value: f64,
    },
    #[error("step '{step}': dwell range [{min}, {max}] is invalid")]
    InvalidDwellRange { step: String, min: f64, max: f64 },
    #[error("step '{step}': order {found} breaks the contiguous sequence (expected {expected})")]
    StepOrderGap {
        step: String,
        expected: u32,
        found: u32,
    },
    #[error("ramp has no stages")]
    EmptyRamp,
    #[error("ramp stage {stage}: duration {seconds}s must be positive")]
    InvalidStageDuration { stage: usize, seconds: f64 },
    #[error("threshold '{metric}' expression '{expr}': {reason}")]
    InvalidThreshold {
        metric: String,
        expr: String,
        reason: String,
    },
    #[error("heartbeat interval {seconds}s must be positive")]
    InvalidHeartbeatInterval { seconds: f64 },
    #[error("profile JSON is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

fn default_source() -> String {
    "funnelstorm".to_string()
}

const fn default_heartbeat_interval() -> f64 {
    3.0
}

const fn default_bounce_pace() -> f64 {
    1.0
}

const fn default_tick_interval_ms() -> u64 {
    250
}

const fn default_spawn_burst() -> usize {
    256
}

const fn default_max_sessions() -> usize {
    16_384
}

const fn default_cooldown_grace() -> f64 {
    10.0
}

/// Everything a run needs: funnel shape, ramp curve, thresholds, and the
/// scheduler/journey knobs. Key names match the external configuration
/// surface (camelCase JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadProfile {
    /// Journey-profile tag stamped on every event's `source` field.
    #[serde(default = "default_source")]
    pub source: String,
    pub ramp_stages: Vec<RampStage>,
    pub funnel_steps: Vec<FunnelStep>,
    /// Fixed in-dwell heartbeat cadence, constant across steps.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: f64,
    /// Metric name -> bound expressions (`rate<0.01`, `p(95)<3000`, ...).
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
    /// `false`: one VU, one iteration (lead simulation). `true`: a finished
    /// session's task immediately starts a fresh journey (pure throughput).
    #[serde(default)]
    pub reuse_sessions_across_iterations: bool,
    /// Scale factor on bounce away/settle intervals; compressed-timing
    /// profiles set this below 1.
    #[serde(default = "default_bounce_pace")]
    pub bounce_pace: f64,
    /// Scheduler tick, milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Most sessions spawned in a single tick.
    #[serde(default = "default_spawn_burst")]
    pub spawn_burst: usize,
    /// Absolute population cap; deficit beyond it is dropped and counted as
    /// scheduling saturation.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// How long to wait for in-flight journeys after the final stage before
    /// force-aborting stragglers.
    #[serde(default = "default_cooldown_grace")]
    pub cooldown_grace_seconds: f64,
}

impl LoadProfile {
    /// Minimal profile around a funnel and ramp; every knob at its default.
    #[must_use]
    pub fn new(ramp_stages: Vec<RampStage>, funnel_steps: Vec<FunnelStep>) -> Self {
        Self {
            source: default_source(),
            ramp_stages,
            funnel_steps,
            heartbeat_interval_seconds: default_heartbeat_interval(),
            thresholds: BTreeMap::new(),
            reuse_sessions_across_iterations: false,
            bounce_pace: default_bounce_pace(),
            tick_interval_ms: default_tick_interval_ms(),
            spawn_burst: default_spawn_burst(),
            max_sessions: default_max_sessions(),
            cooldown_grace_seconds: default_cooldown_grace(),
        }
    }

    /// Parses a profile from its JSON document.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for malformed JSON; call
    /// [`LoadProfile::compile`] afterwards for semantic validation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validates every table and freezes the run-ready artifacts. This is
    /// the single fail-fast gate: nothing downstream re-checks config.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found in the funnel, ramp,
    /// thresholds, or timing knobs.
    pub fn compile(&self) -> Result<CompiledProfile, ConfigError> {
        let model = FunnelModel::new(self.funnel_steps.clone())?;
        let plan = RampPlan::new(self.ramp_stages.clone())?;
        if !self.heartbeat_interval_seconds.is_finite() || self.heartbeat_interval_seconds <= 0.0 {
            return Err(ConfigError::InvalidHeartbeatInterval {
                seconds: self.heartbeat_interval_seconds,
            });
        }
        let specs = self
            .thresholds
            .iter()
            .map(|(metric, exprs)| ThresholdSpec::parse(metric, exprs))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledProfile {
            model,
            plan,
            specs,
            timing: JourneyTiming::new(self.heartbeat_interval_seconds, self.bounce_pace),
            source: self.source.clone(),
            reuse_sessions: self.reuse_sessions_across_iterations,
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            spawn_burst: self.spawn_burst.max(1),
            max_sessions: self.max_sessions.max(1),
            cooldown_grace: Duration::from_secs_f64(self.cooldown_grace_seconds.max(0.0)),
        })
    }
}

/// Validated, immutable artifacts compiled from a [`LoadProfile`].
#[derive(Debug, Clone)]
pub struct CompiledProfile {
    pub model: FunnelModel,
    pub plan: RampPlan,
    pub specs: Vec<ThresholdSpec>,
    pub timing: JourneyTiming,
    pub source: String,
    pub reuse_sessions: bool,
    pub tick_interval: Duration,
    pub spawn_burst: usize,
    pub max_sessions: usize,
    pub cooldown_grace: Duration,
}
