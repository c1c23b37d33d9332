//! Built-in load profiles.
//!
//! The tracking team's traffic scenarios are probability-table and
//! ramp-shape variants of the same engine, so each one is a named
//! configuration here rather than its own binary.
use funnelstorm_engine::{FunnelStep, LoadProfile, RampStage};

/// Name/description pairs for `--list-profiles`.
#[must_use]
pub fn list() -> Vec<(&'static str, &'static str)> {
    vec![
        ("smoke", "5 sessions for 1 minute; quick sanity check before heavy runs"),
        ("funnel-flow", "full funnel with realistic dwell and drop-off, peak 2k sessions"),
        ("journey-blitz", "compressed full funnel with bounces and completions, peak 5k"),
        ("bounce-storm", "rapid enter/exit/reenter churn to stress live counters, peak 3k"),
        ("beacon-stress", "pure beacon throughput, continuous sessions, peak 10k"),
    ]
}

/// Looks up a built-in profile by name.
#[must_use]
pub fn builtin(name: &str) -> Option<LoadProfile> {
    match name {
        "smoke" => Some(smoke()),
        "funnel-flow" => Some(funnel_flow()),
        "journey-blitz" => Some(journey_blitz()),
        "bounce-storm" => Some(bounce_storm()),
        "beacon-stress" => Some(beacon_stress()),
        _ => None,
    }
}

/// The full six-step funnel with realistic per-step dwell and drop-off.
fn realistic_steps() -> Vec<FunnelStep> {
    vec![
        FunnelStep::new("website", 3.0, 30.0).with_drop_off(0.40),
        FunnelStep::new("tutorial", 10.0, 120.0).with_drop_off(0.30),
        FunnelStep::new("webinar", 30.0, 300.0).with_drop_off(0.25),
        FunnelStep::new("contract", 5.0, 60.0).with_drop_off(0.10),
        FunnelStep::new("congrats", 2.0, 10.0).with_drop_off(0.05),
        FunnelStep::new("brand-steps", 5.0, 60.0).with_completion_marker(),
    ]
}

fn smoke() -> LoadProfile {
    let mut profile = LoadProfile::new(
        vec![RampStage::new(5.0, 5), RampStage::new(55.0, 5)],
        vec![FunnelStep::new("website", 1.0, 3.0)],
    );
    profile.source = "smoke-test".to_string();
    profile.thresholds.insert(
        "http_req_duration".to_string(),
        vec!["p(95)<3000".to_string()],
    );
    profile
        .thresholds
        .insert("http_req_failed".to_string(), vec!["rate<0.01".to_string()]);
    profile
}

fn funnel_flow() -> LoadProfile {
    let mut profile = LoadProfile::new(
        vec![
            RampStage::new(120.0, 50),   // warm-up
            RampStage::new(300.0, 500),  // steady state
            RampStage::new(30.0, 2000),  // spike ramp
            RampStage::new(120.0, 2000), // spike hold
            RampStage::new(60.0, 500),   // scale down
            RampStage::new(300.0, 500),  // sustained
            RampStage::new(120.0, 0),    // cool-down
        ],
        realistic_steps(),
    );
    profile.source = "funnel-flow".to_string();
    profile.thresholds.insert(
        "http_req_duration".to_string(),
        vec!["p(95)<3000".to_string()],
    );
    profile
        .thresholds
        .insert("http_req_failed".to_string(), vec!["rate<0.01".to_string()]);
    profile.thresholds.insert(
        "funnel_entry_success".to_string(),
        vec!["rate>0.99".to_string()],
    );
    profile.thresholds.insert(
        "funnel_exit_success".to_string(),
        vec!["rate>0.99".to_string()],
    );
    profile.thresholds.insert(
        "beacon_latency_ms".to_string(),
        vec!["p(99)<5000".to_string()],
    );
    profile
}

fn journey_blitz() -> LoadProfile {
    let mut profile = LoadProfile::new(
        vec![
            RampStage::new(30.0, 500),
            RampStage::new(60.0, 2000),
            RampStage::new(180.0, 2000),
            RampStage::new(30.0, 5000),
            RampStage::new(120.0, 5000),
            RampStage::new(30.0, 1000),
            RampStage::new(60.0, 1000),
            RampStage::new(30.0, 0),
        ],
        vec![
            FunnelStep::new("website", 1.0, 3.0).with_drop_off(0.40),
            FunnelStep::new("tutorial", 1.0, 3.0).with_drop_off(0.30),
            FunnelStep::new("webinar", 2.0, 4.0)
                .with_drop_off(0.25)
                .with_bounce(0.20),
            FunnelStep::new("contract", 1.0, 2.0).with_drop_off(0.10),
            FunnelStep::new("congrats", 0.5, 1.5)
                .with_drop_off(0.05)
                .with_completion_marker(),
            FunnelStep::new("brand-steps", 1.0, 3.0)
                .with_bounce(0.15)
                .with_completion_chance(0.30),
        ],
    );
    profile.source = "journey-blitz".to_string();
    profile.thresholds.insert(
        "http_req_duration".to_string(),
        vec!["p(95)<3000".to_string(), "p(99)<5000".to_string()],
    );
    profile
        .thresholds
        .insert("http_req_failed".to_string(), vec!["rate<0.05".to_string()]);
    profile.thresholds.insert(
        "funnel_entry_success".to_string(),
        vec!["rate>0.95".to_string()],
    );
    profile.thresholds.insert(
        "funnel_exit_success".to_string(),
        vec!["rate>0.95".to_string()],
    );
    profile.thresholds.insert(
        "beacon_latency_ms".to_string(),
        vec!["p(95)<2000".to_string(), "p(99)<5000".to_string()],
    );
    profile
}

fn bounce_storm() -> LoadProfile {
    let mut profile = LoadProfile::new(
        vec![
            RampStage::new(20.0, 500),
            RampStage::new(40.0, 2000),
            RampStage::new(180.0, 2000),
            RampStage::new(20.0, 3000),
            RampStage::new(60.0, 3000),
            RampStage::new(30.0, 0),
        ],
        vec![
            FunnelStep::new("website", 0.5, 2.0).with_drop_off(0.25).with_bounce(1.0),
            FunnelStep::new("tutorial", 0.5, 2.0).with_drop_off(0.25).with_bounce(1.0),
            FunnelStep::new("webinar", 0.5, 2.0).with_drop_off(0.25).with_bounce(1.0),
            FunnelStep::new("contract", 0.5, 2.0).with_drop_off(0.25).with_bounce(1.0),
            FunnelStep::new("congrats", 0.5, 2.0).with_drop_off(0.25).with_bounce(1.0),
            FunnelStep::new("brand-steps", 0.5, 2.0).with_bounce(1.0),
        ],
    );
    profile.source = "bounce-storm".to_string();
    // Every visit bounces, and the compressed pace keeps the away/settle
    // intervals in the sub-second-to-two-second band.
    profile.bounce_pace = 0.5;
    profile.reuse_sessions_across_iterations = true;
    profile.thresholds.insert(
        "http_req_duration".to_string(),
        vec!["p(95)<3000".to_string(), "p(99)<5000".to_string()],
    );
    profile
        .thresholds
        .insert("http_req_failed".to_string(), vec!["rate<0.05".to_string()]);
    for metric in [
        "funnel_entry_success",
        "funnel_exit_success",
        "funnel_reenter_success",
        "funnel_reexit_success",
    ] {
        profile
            .thresholds
            .insert(metric.to_string(), vec!["rate>0.95".to_string()]);
    }
    profile.thresholds.insert(
        "beacon_latency_ms".to_string(),
        vec!["p(95)<2000".to_string()],
    );
    profile
}

fn beacon_stress() -> LoadProfile {
    let mut profile = LoadProfile::new(
        vec![
            RampStage::new(60.0, 100),
            RampStage::new(120.0, 1000),
            RampStage::new(60.0, 3000),
            RampStage::new(180.0, 3000),
            RampStage::new(30.0, 5000),
            RampStage::new(120.0, 5000),
            RampStage::new(30.0, 10_000),
            RampStage::new(120.0, 10_000),
            RampStage::new(120.0, 0),
        ],
        vec![FunnelStep::new("website", 0.5, 1.5)],
    );
    profile.source = "beacon-stress".to_string();
    profile.reuse_sessions_across_iterations = true;
    profile.thresholds.insert(
        "http_req_duration".to_string(),
        vec!["p(95)<2000".to_string()],
    );
    profile.thresholds.insert(
        "http_req_failed".to_string(),
        vec!["rate<0.005".to_string()],
    );
    profile.thresholds.insert(
        "funnel_entry_success".to_string(),
        vec!["rate>0.995".to_string()],
    );
    profile
}
