//! Static funnel description: ordered steps with per-step stochastic knobs.
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Inclusive dwell bounds in seconds, uniformly sampled per visit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DwellRange {
    pub min: f64,
    pub max: f64,
}

impl DwellRange {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// One stage of the funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStep {
    /// Unique step identifier, also the wire "page" value.
    pub id: String,
    /// Optional explicit position; validated as contiguous when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    pub dwell_range: DwellRange,
    /// Probability that a session leaving this step does NOT continue.
    #[serde(default)]
    pub drop_off_rate: f64,
    /// Probability of one tab-switch bounce cycle during a visit.
    #[serde(default)]
    pub bounce_rate: f64,
    /// Step fires a funnel_complete event in addition to enter/exit.
    #[serde(default)]
    pub completion_marker: bool,
    /// Probabilistic extra funnel_complete (mission completion).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_chance: Option<f64>,
}

impl FunnelStep {
    /// Plain step with the given id and dwell bounds; rates default to zero.
    #[must_use]
    pub fn new(id: impl Into<String>, dwell_min: f64, dwell_max: f64) -> Self {
        Self {
            id: id.into(),
            order: None,
            dwell_range: DwellRange::new(dwell_min, dwell_max),
            drop_off_rate: 0.0,
            bounce_rate: 0.0,
            completion_marker: false,
            completion_chance: None,
        }
    }

    #[must_use]
    pub const fn with_drop_off(mut self, rate: f64) -> Self {
        self.drop_off_rate = rate;
        self
    }

    #[must_use]
    pub const fn with_bounce(mut self, rate: f64) -> Self {
        self.bounce_rate = rate;
        self
    }

    #[must_use]
    pub const fn with_completion_marker(mut self) -> Self {
        self.completion_marker = true;
        self
    }

    #[must_use]
    pub const fn with_completion_chance(mut self, chance: f64) -> Self {
        self.completion_chance = Some(chance);
        self
    }
}

/// Validated, immutable step table. Built once at load time and shared
/// read-only across every session task.
#[derive(Debug, Clone, PartialEq)]
pub struct FunnelModel {
    steps: Vec<FunnelStep>,
}

impl FunnelModel {
    /// Validates and freezes a step table.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the table is empty, a rate falls
    /// outside [0, 1], a dwell range is negative or inverted, or explicit
    /// `order` values are not the contiguous sequence 0..n.
    pub fn new(steps: Vec<FunnelStep>) -> Result<Self, ConfigError> {
        if steps.is_empty() {
            return Err(ConfigError::EmptyFunnel);
        }
        for (index, step) in steps.iter().enumerate() {
            validate_rate(&step.id, "dropOffRate", step.drop_off_rate)?;
            validate_rate(&step.id, "bounceRate", step.bounce_rate)?;
            if let Some(chance) = step.completion_chance {
                validate_rate(&step.id, "completionChance", chance)?;
            }
            let range = step.dwell_range;
            if !range.min.is_finite() || !range.max.is_finite() || range.min < 0.0 {
                return Err(ConfigError::InvalidDwellRange {
                    step: step.id.clone(),
                    min: range.min,
                    max: range.max,
                });
            }
            if range.min > range.max {
                return Err(ConfigError::InvalidDwellRange {
                    step: step.id.clone(),
                    min: range.min,
                    max: range.max,
                });
            }
            if let Some(order) = step.order {
                let expected = u32::try_from(index).unwrap_or(u32::MAX);
                if order != expected {
                    return Err(ConfigError::StepOrderGap {
                        step: step.id.clone(),
                        expected,
                        found: order,
                    });
                }
            }
        }
        Ok(Self { steps })
    }

    /// Ordered step list.
    #[must_use]
    pub fn steps(&self) -> &[FunnelStep] {
        &self.steps
    }

    /// Lookup by traversal index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is past the terminal step; callers advance one step
    /// at a time and stop at the terminal, so an out-of-range index is a bug.
    #[must_use]
    pub fn step(&self, index: usize) -> &FunnelStep {
        &self.steps[index]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// True for the highest-order step, where drop-off is never evaluated.
    #[must_use]
    pub fn is_terminal(&self, index: usize) -> bool {
        index + 1 == self.steps.len()
    }
}

fn validate_rate(step: &str, field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::RateOutOfRange {
            step: step.to_string(),
            field,
            value,
        })
    }
}
