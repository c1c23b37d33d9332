//! Target-concurrency curve: ordered stages with linear interpolation.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// One phase of the ramp: reach `target_concurrency` by the end of
/// `duration_seconds`, interpolating linearly from the previous stage's
/// end-target. A holding stage simply repeats the previous target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RampStage {
    pub duration_seconds: f64,
    pub target_concurrency: u32,
}

impl RampStage {
    #[must_use]
    pub const fn new(duration_seconds: f64, target_concurrency: u32) -> Self {
        Self {
            duration_seconds,
            target_concurrency,
        }
    }
}

/// Validated stage sequence; fully defines target concurrency over time,
/// starting from zero before the first stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RampPlan {
    stages: Vec<RampStage>,
    total: Duration,
}

impl RampPlan {
    /// Validates and freezes a stage table.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the table is empty or a stage duration
    /// is non-positive or non-finite.
    pub fn new(stages: Vec<RampStage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::EmptyRamp);
        }
        let mut total = Duration::ZERO;
        for (index, stage) in stages.iter().enumerate() {
            if !stage.duration_seconds.is_finite() || stage.duration_seconds <= 0.0 {
                return Err(ConfigError::InvalidStageDuration {
                    stage: index,
                    seconds: stage.duration_seconds,
                });
            }
            total += Duration::from_secs_f64(stage.duration_seconds);
        }
        Ok(Self { stages, total })
    }

    #[must_use]
    pub fn stages(&self) -> &[RampStage] {
        &self.stages
    }

    /// Wall-clock length of the whole ramp.
    #[must_use]
    pub const fn total_duration(&self) -> Duration {
        self.total
    }

    /// Interpolated target population at `elapsed` since ramp start. Past the
    /// final stage the last target holds (the scheduler stops consulting the
    /// plan there anyway).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn target_at(&self, elapsed: Duration) -> usize {
        let mut cursor = 0.0_f64;
        let mut previous = 0.0_f64;
        let t = elapsed.as_secs_f64();
        for stage in &self.stages {
            let end = cursor + stage.duration_seconds;
            let target = f64::from(stage.target_concurrency);
            if t < end {
                let frac = (t - cursor) / stage.duration_seconds;
                let value = previous + (target - previous) * frac;
                return value.round().max(0.0) as usize;
            }
            cursor = end;
            previous = target;
        }
        previous.round().max(0.0) as usize
    }

    /// Highest stage target; a cheap upper bound for capacity checks.
    #[must_use]
    pub fn peak_concurrency(&self) -> u32 {
        self.stages
            .iter()
            .map(|stage| stage.target_concurrency)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(stages: &[(f64, u32)]) -> RampPlan {
        RampPlan::new(
            stages
                .iter()
                .map(|&(secs, target)| RampStage::new(secs, target))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_and_zero_duration_stages() {
        assert!(matches!(
            RampPlan::new(Vec::new()),
            Err(ConfigError::EmptyRamp)
        ));
        assert!(matches!(
            RampPlan::new(vec![RampStage::new(0.0, 10)]),
            Err(ConfigError::InvalidStageDuration { stage: 0, .. })
        ));
    }

    #[test]
    fn first_stage_ramps_from_zero() {
        let plan = plan(&[(10.0, 100)]);
        assert_eq!(plan.target_at(Duration::ZERO), 0);
        assert_eq!(plan.target_at(Duration::from_secs(5)), 50);
        assert_eq!(plan.target_at(Duration::from_secs_f64(9.999)), 100);
    }

    #[test]
    fn holding_stage_keeps_previous_target() {
        let plan = plan(&[(10.0, 100), (60.0, 100)]);
        assert_eq!(plan.target_at(Duration::from_secs(15)), 100);
        assert_eq!(plan.target_at(Duration::from_secs(69)), 100);
    }

    #[test]
    fn downward_stage_interpolates_toward_lower_target() {
        let plan = plan(&[(10.0, 100), (10.0, 0)]);
        assert_eq!(plan.target_at(Duration::from_secs(15)), 50);
        assert_eq!(plan.target_at(Duration::from_secs_f64(19.9)), 1);
    }

    #[test]
    fn past_the_final_stage_the_last_target_holds() {
        let plan = plan(&[(10.0, 100), (10.0, 20)]);
        assert_eq!(plan.target_at(Duration::from_secs(50)), 20);
    }

    #[test]
    fn total_duration_sums_stages() {
        let plan = plan(&[(120.0, 50), (300.0, 500), (30.0, 2000)]);
        assert_eq!(plan.total_duration(), Duration::from_secs(450));
        assert_eq!(plan.peak_concurrency(), 2000);
    }

    #[test]
    fn stage_parses_from_camel_case_json() {
        let stage: RampStage =
            serde_json::from_str(r#"{ "durationSeconds": 30, "targetConcurrency": 2000 }"#)
                .unwrap();
        assert!((stage.duration_seconds - 30.0).abs() < f64::EPSILON);
        assert_eq!(stage.target_concurrency, 2000);
    }
}
