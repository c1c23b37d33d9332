//! Time-phased concurrency controller.
//!
//! Owns the population of running journey tasks and keeps its size tracking
//! the ramp plan's interpolated target: spawn the deficit each tick, let
//! finishing sessions retire on their own, and never block when the
//! population cap is hit — dropped spawn attempts are counted as scheduling
//! saturation instead.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::CompiledProfile;
use crate::event::BeaconSender;
use crate::funnel::FunnelModel;
use crate::journey::{JourneyRunner, JourneyTiming};
use crate::metrics::MetricsAggregator;
use crate::ramp::RampPlan;
use crate::session::{Session, SessionIdGen};

pub struct RampScheduler {
    model: Arc<FunnelModel>,
    plan: RampPlan,
    sender: Arc<dyn BeaconSender>,
    metrics: Arc<MetricsAggregator>,
    ids: Arc<SessionIdGen>,
    timing: JourneyTiming,
    source: String,
    reuse_sessions: bool,
    tick_interval: Duration,
    spawn_burst: usize,
    max_sessions: usize,
    cooldown_grace: Duration,
}

impl RampScheduler {
    #[must_use]
    pub fn new(
        compiled: &CompiledProfile,
        sender: Arc<dyn BeaconSender>,
        metrics: Arc<MetricsAggregator>,
    ) -> Self {
        Self {
            model: Arc::new(compiled.model.clone()),
            plan: compiled.plan.clone(),
            sender,
            metrics,
            ids: Arc::new(SessionIdGen::new(&compiled.source)),
            timing: compiled.timing,
            source: compiled.source.clone(),
            reuse_sessions: compiled.reuse_sessions,
            tick_interval: compiled.tick_interval,
            spawn_burst: compiled.spawn_burst,
            max_sessions: compiled.max_sessions,
            cooldown_grace: compiled.cooldown_grace,
        }
    }

    /// Drives the whole ramp: spawn loop, cooldown grace, forced abort of
    /// stragglers. Returns once every session task has retired.
    pub async fn run(&self) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut sessions: JoinSet<()> = JoinSet::new();
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let started = Instant::now();
        let total = self.plan.total_duration();
        log::info!(
            "ramp starting: {} stages over {:.0}s, peak {} sessions",
            self.plan.stages().len(),
            total.as_secs_f64(),
            self.plan.peak_concurrency()
        );

        loop {
            ticker.tick().await;
            let elapsed = started.elapsed();
            if elapsed >= total {
                break;
            }
            // Reap retired tasks so the join set does not grow unbounded.
            while sessions.try_join_next().is_some() {}

            let target = self.plan.target_at(elapsed);
            let live = self.metrics.active_sessions();
            if live >= target {
                continue;
            }
            let deficit = target - live;
            let room = self.max_sessions.saturating_sub(live);
            if deficit > room {
                let dropped = u64::try_from(deficit - room).unwrap_or(u64::MAX);
                self.metrics.record_saturation(dropped);
                log::warn!(
                    "scheduler saturated at {elapsed:?}: target {target}, live {live}, \
                     dropping {dropped} spawn attempts"
                );
            }
            for _ in 0..deficit.min(room).min(self.spawn_burst) {
                self.spawn_session(&mut sessions, cancel_rx.clone());
            }
        }

        log::info!(
            "ramp finished; waiting up to {:.0}s for {} in-flight sessions",
            self.cooldown_grace.as_secs_f64(),
            sessions.len()
        );

        let deadline = Instant::now() + self.cooldown_grace;
        while !sessions.is_empty() {
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => break,
                joined = sessions.join_next() => {
                    if joined.is_none() {
                        break;
                    }
                }
            }
        }

        if !sessions.is_empty() {
            log::warn!("force-aborting {} straggler sessions", sessions.len());
            let _ = cancel_tx.send(true);
            while sessions.join_next().await.is_some() {}
        }
    }

    /// One population slot: a task that runs a journey, and in reuse mode
    /// keeps starting fresh sessions until cancelled. Spawn decisions stay
    /// population-size-driven either way.
    fn spawn_session(&self, sessions: &mut JoinSet<()>, cancel: watch::Receiver<bool>) {
        let model = Arc::clone(&self.model);
        let sender = Arc::clone(&self.sender);
        let metrics = Arc::clone(&self.metrics);
        let ids = Arc::clone(&self.ids);
        let timing = self.timing;
        let source = self.source.clone();
        let reuse = self.reuse_sessions;

        sessions.spawn(async move {
            let mut runner = JourneyRunner::new(
                model,
                sender,
                Arc::clone(&metrics),
                timing,
                source,
                cancel.clone(),
            );
            loop {
                let mut session = Session::new(ids.next_id(), !reuse);
                metrics.record_spawned();
                let state = runner.run(&mut session).await;
                metrics.record_session_end(state);
                if !reuse || *cancel.borrow() {
                    break;
                }
            }
        });
    }
}
