//! Pass/fail threshold specs and their evaluation against a metrics snapshot.
//!
//! Bounds use the same expression notation the tracking team's earlier test
//! rigs used: `rate<0.01`, `p(95)<3000`, `avg<=1500`, `count>0`. A metric may
//! carry several bounds; all of them must hold for the metric to pass, and
//! the run verdict is the conjunction over every spec.
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::event::EventType;
use crate::metrics::MetricsSnapshot;

/// Statistic selected by a bound expression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    /// Success or failure rate, depending on the metric.
    Rate,
    Avg,
    Min,
    Max,
    Count,
    /// Nearest-rank percentile, e.g. `p(95)`.
    Percentile(f64),
}

impl std::fmt::Display for Stat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rate => f.write_str("rate"),
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Count => f.write_str("count"),
            Self::Percentile(q) => write!(f, "p({q})"),
        }
    }
}

/// Comparator in a bound expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Comparator {
    #[must_use]
    pub fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Le => observed <= bound,
            Self::Gt => observed > bound,
            Self::Ge => observed >= bound,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// One parsed bound: statistic, comparator, numeric limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub stat: Stat,
    pub comparator: Comparator,
    pub limit: f64,
}

impl Bound {
    /// Parses an expression such as `p(95)<3000` or `rate>=0.99`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError::InvalidThreshold`] when the statistic,
    /// comparator, or limit cannot be parsed.
    pub fn parse(metric: &str, expr: &str) -> Result<Self, ConfigError> {
        let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
        let bad = |reason: &str| ConfigError::InvalidThreshold {
            metric: metric.to_string(),
            expr: expr.to_string(),
            reason: reason.to_string(),
        };

        let (op_at, op_len) = find_comparator(&compact).ok_or_else(|| bad("no comparator"))?;
        let comparator = match &compact[op_at..op_at + op_len] {
            "<=" => Comparator::Le,
            ">=" => Comparator::Ge,
            "<" => Comparator::Lt,
            ">" => Comparator::Gt,
            _ => return Err(bad("no comparator")),
        };

        let stat_token = &compact[..op_at];
        let stat = parse_stat(stat_token).ok_or_else(|| bad("unknown statistic"))?;

        let limit: f64 = compact[op_at + op_len..]
            .parse()
            .map_err(|_| bad("limit is not a number"))?;
        if !limit.is_finite() {
            return Err(bad("limit is not finite"));
        }

        Ok(Self {
            stat,
            comparator,
            limit,
        })
    }
}

impl std::fmt::Display for Bound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.stat, self.comparator.as_str(), self.limit)
    }
}

fn find_comparator(expr: &str) -> Option<(usize, usize)> {
    for two in ["<=", ">="] {
        if let Some(at) = expr.find(two) {
            return Some((at, 2));
        }
    }
    for one in ["<", ">"] {
        if let Some(at) = expr.find(one) {
            return Some((at, 1));
        }
    }
    None
}

fn parse_stat(token: &str) -> Option<Stat> {
    match token {
        "rate" => Some(Stat::Rate),
        "avg" => Some(Stat::Avg),
        "min" => Some(Stat::Min),
        "max" => Some(Stat::Max),
        "count" => Some(Stat::Count),
        "med" => Some(Stat::Percentile(50.0)),
        _ => {
            let inner = token.strip_prefix("p(")?.strip_suffix(')')?;
            let q: f64 = inner.parse().ok()?;
            if q.is_finite() && (0.0..=100.0).contains(&q) {
                Some(Stat::Percentile(q))
            } else {
                None
            }
        }
    }
}

/// Named metric plus every bound configured for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSpec {
    pub metric: String,
    pub bounds: Vec<Bound>,
}

impl ThresholdSpec {
    /// Parses one `metric -> [expr, ...]` config entry.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when any expression is malformed or the
    /// entry has no bounds at all.
    pub fn parse(metric: &str, exprs: &[String]) -> Result<Self, ConfigError> {
        if exprs.is_empty() {
            return Err(ConfigError::InvalidThreshold {
                metric: metric.to_string(),
                expr: String::new(),
                reason: "no bounds configured".to_string(),
            });
        }
        let bounds = exprs
            .iter()
            .map(|expr| Bound::parse(metric, expr))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            metric: metric.to_string(),
            bounds,
        })
    }
}

/// Verdict for a single bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundVerdict {
    pub expr: String,
    /// Observed value, absent when the metric/stat pair does not resolve.
    pub observed: Option<f64>,
    pub passed: bool,
}

/// Verdict for one metric: every bound must hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdVerdict {
    pub metric: String,
    pub bounds: Vec<BoundVerdict>,
    pub passed: bool,
}

/// Evaluates every spec against a snapshot. The run passes iff every spec
/// passes; a metric that resolves to no value fails its spec rather than
/// passing silently.
#[must_use]
pub fn evaluate(specs: &[ThresholdSpec], snapshot: &MetricsSnapshot) -> Vec<ThresholdVerdict> {
    specs
        .iter()
        .map(|spec| {
            let bounds: Vec<BoundVerdict> = spec
                .bounds
                .iter()
                .map(|bound| {
                    let observed = resolve(snapshot, &spec.metric, bound.stat);
                    let passed =
                        observed.is_some_and(|value| bound.comparator.holds(value, bound.limit));
                    BoundVerdict {
                        expr: bound.to_string(),
                        observed,
                        passed,
                    }
                })
                .collect();
            let passed = bounds.iter().all(|bound| bound.passed);
            ThresholdVerdict {
                metric: spec.metric.clone(),
                bounds,
                passed,
            }
        })
        .collect()
}

/// Conjunction over per-spec verdicts.
#[must_use]
pub fn overall_pass(verdicts: &[ThresholdVerdict]) -> bool {
    verdicts.iter().all(|verdict| verdict.passed)
}

#[allow(clippy::cast_precision_loss)]
fn resolve(snapshot: &MetricsSnapshot, metric: &str, stat: Stat) -> Option<f64> {
    match metric {
        "beacon_latency_ms" | "http_req_duration" => match stat {
            Stat::Rate => None,
            Stat::Avg => Some(snapshot.latency.mean_ms),
            Stat::Min => Some(snapshot.latency.min_ms as f64),
            Stat::Max => Some(snapshot.latency.max_ms as f64),
            Stat::Count => Some(snapshot.latency.count as f64),
            Stat::Percentile(q) => Some(snapshot.latency_percentile(q) as f64),
        },
        "http_req_failed" | "overall_error_rate" => match stat {
            Stat::Rate => Some(snapshot.overall_error_rate()),
            Stat::Count => Some(
                snapshot
                    .events
                    .iter()
                    .map(|stats| stats.failed)
                    .sum::<u64>() as f64,
            ),
            _ => None,
        },
        "sessions_spawned" => count_stat(stat, snapshot.population.spawned),
        "sessions_dropped" => count_stat(stat, snapshot.population.dropped),
        "sessions_completed" => count_stat(stat, snapshot.population.completed),
        "sessions_aborted" => count_stat(stat, snapshot.population.aborted),
        "scheduling_saturation" => count_stat(stat, snapshot.population.scheduling_saturation),
        _ => {
            let event = success_rate_event(metric)?;
            let stats = snapshot.event(event);
            match stat {
                Stat::Rate => Some(stats.success_rate()),
                Stat::Count => Some(stats.attempted() as f64),
                _ => None,
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn count_stat(stat: Stat, value: u64) -> Option<f64> {
    match stat {
        Stat::Count => Some(value as f64),
        _ => None,
    }
}

fn success_rate_event(metric: &str) -> Option<EventType> {
    match metric {
        "funnel_entry_success" => Some(EventType::FunnelEnter),
        "funnel_exit_success" => Some(EventType::FunnelExit),
        "funnel_reenter_success" => Some(EventType::FunnelReenter),
        "funnel_reexit_success" => Some(EventType::FunnelReexit),
        "heartbeat_success" => Some(EventType::Heartbeat),
        "funnel_complete_success" => Some(EventType::FunnelComplete),
        _ => None,
    }
}
