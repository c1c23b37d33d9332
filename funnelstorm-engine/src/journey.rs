//! Per-session journey state machine.
//!
//! Drives exactly one [`Session`] through the funnel from step 0 to
//! completion, drop-off, or abort, emitting beacons at every transition and
//! folding each outcome into the shared metrics aggregator. Every suspension
//! point races the run's cancellation signal, so a test-end deadline turns
//! any in-flight journey into a hard abort without a synthetic final exit.
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;

use crate::event::{BeaconOutcome, BeaconSender, EventRecord, EventType};
use crate::funnel::{FunnelModel, FunnelStep};
use crate::metrics::MetricsAggregator;
use crate::session::{Session, SessionState};

/// Base "away" interval for a tab-switch bounce, seconds.
const AWAY_RANGE_SECS: (f64, f64) = (1.0, 4.0);
/// Base "returned, settling back in" interval after a bounce, seconds.
const SETTLE_RANGE_SECS: (f64, f64) = (1.0, 3.0);

/// Cadence knobs shared by every journey in a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JourneyTiming {
    /// Fixed heartbeat cadence during dwell.
    pub heartbeat_interval: Duration,
    /// Sampled bounce-away interval bounds, seconds.
    pub away_secs: (f64, f64),
    /// Sampled post-reenter settle interval bounds, seconds.
    pub settle_secs: (f64, f64),
}

impl JourneyTiming {
    /// Timing from the profile's heartbeat interval and bounce pace factor
    /// (compressed-timing profiles shrink the bounce intervals).
    #[must_use]
    pub fn new(heartbeat_interval_seconds: f64, bounce_pace: f64) -> Self {
        Self {
            heartbeat_interval: Duration::from_secs_f64(heartbeat_interval_seconds),
            away_secs: (AWAY_RANGE_SECS.0 * bounce_pace, AWAY_RANGE_SECS.1 * bounce_pace),
            settle_secs: (
                SETTLE_RANGE_SECS.0 * bounce_pace,
                SETTLE_RANGE_SECS.1 * bounce_pace,
            ),
        }
    }
}

/// Signals that the run's cancellation deadline fired mid-suspension.
struct Cancelled;

/// Walks one session through the funnel model.
pub struct JourneyRunner {
    model: Arc<FunnelModel>,
    sender: Arc<dyn BeaconSender>,
    metrics: Arc<MetricsAggregator>,
    timing: JourneyTiming,
    source: String,
    cancel: watch::Receiver<bool>,
}

impl JourneyRunner {
    #[must_use]
    pub fn new(
        model: Arc<FunnelModel>,
        sender: Arc<dyn BeaconSender>,
        metrics: Arc<MetricsAggregator>,
        timing: JourneyTiming,
        source: String,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            model,
            sender,
            metrics,
            timing,
            source,
            cancel,
        }
    }

    /// Runs the session to a terminal state and returns it.
    pub async fn run(&mut self, session: &mut Session) -> SessionState {
        loop {
            let step = self.model.step(session.current_step).clone();

            session.state = SessionState::Entering;
            let entered = self
                .emit(EventType::FunnelEnter, &step, session, None)
                .await;
            if !entered.accepted {
                // Can't verify the user is even on the page.
                session.state = SessionState::Aborted;
                break;
            }

            session.state = SessionState::Dwelling;
            let dwell = sample_secs(step.dwell_range.min, step.dwell_range.max);
            if self
                .dwell_with_heartbeats(&step, session, dwell)
                .await
                .is_err()
            {
                session.state = SessionState::Aborted;
                break;
            }
            let time_on_page = duration_ms(dwell);

            if roll() < step.bounce_rate {
                session.state = SessionState::Bounced;
                if self.bounce(&step, session, time_on_page).await.is_err() {
                    session.state = SessionState::Aborted;
                    break;
                }
            }

            if step.completion_marker {
                self.emit(EventType::FunnelComplete, &step, session, None)
                    .await;
            }
            if let Some(chance) = step.completion_chance
                && roll() < chance
            {
                self.emit(EventType::FunnelComplete, &step, session, None)
                    .await;
            }

            let terminal = self.model.is_terminal(session.current_step);
            session.state = SessionState::Exiting;
            let dropping = !terminal && roll() < step.drop_off_rate;
            self.emit(EventType::FunnelExit, &step, session, Some(time_on_page))
                .await;

            if dropping {
                session.state = SessionState::Dropped;
                break;
            }
            if terminal {
                session.state = SessionState::Completed;
                break;
            }
            session.current_step += 1;
        }

        log::debug!(
            "session {} finished {} at step {} after {:?}",
            session.session_id,
            session.state,
            session.current_step,
            session.started_at.elapsed()
        );
        session.state
    }

    /// Suspends for the sampled dwell in heartbeat-interval increments,
    /// emitting a heartbeat after every increment except the last. Heartbeat
    /// failures are tolerated; only cancellation interrupts the dwell.
    async fn dwell_with_heartbeats(
        &mut self,
        step: &FunnelStep,
        session: &Session,
        total: Duration,
    ) -> Result<(), Cancelled> {
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            let chunk = (total - elapsed).min(self.timing.heartbeat_interval);
            self.pause(chunk).await?;
            elapsed += chunk;
            if elapsed < total {
                self.emit(EventType::Heartbeat, step, session, None).await;
            }
        }
        Ok(())
    }

    /// One tab-switch reversal: reexit carrying the dwell accumulated so far,
    /// an away interval, reenter, then a shorter settle interval. Layered on
    /// top of the already-sampled dwell; never changes time-on-page
    /// accounting and never aborts the journey on rejection.
    async fn bounce(
        &mut self,
        step: &FunnelStep,
        session: &Session,
        time_on_page: u64,
    ) -> Result<(), Cancelled> {
        self.emit(EventType::FunnelReexit, step, session, Some(time_on_page))
            .await;
        let away = sample_secs(self.timing.away_secs.0, self.timing.away_secs.1);
        self.pause(away).await?;
        self.emit(EventType::FunnelReenter, step, session, None).await;
        let settle = sample_secs(self.timing.settle_secs.0, self.timing.settle_secs.1);
        self.pause(settle).await?;
        Ok(())
    }

    async fn emit(
        &mut self,
        event_type: EventType,
        step: &FunnelStep,
        session: &Session,
        time_on_page: Option<u64>,
    ) -> BeaconOutcome {
        let record = EventRecord {
            event_type,
            page: step.id.clone(),
            session_id: session.session_id.clone(),
            source: self.source.clone(),
            time_on_page,
        };
        let outcome = self.sender.send(&record).await;
        if !outcome.accepted {
            log::trace!(
                "beacon {} for {} rejected (status {:?})",
                event_type,
                session.session_id,
                outcome.http_status
            );
        }
        self.metrics.record_outcome(event_type, &outcome);
        outcome
    }

    /// Cancellable suspension; the only blocking primitive a journey uses.
    async fn pause(&mut self, duration: Duration) -> Result<(), Cancelled> {
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancel.wait_for(|stop| *stop) => Err(Cancelled),
        }
    }
}

/// One uniform draw in [0, 1); independent per decision point and
/// intentionally unseeded.
fn roll() -> f64 {
    rand::thread_rng().r#gen()
}

fn sample_secs(min: f64, max: f64) -> Duration {
    let secs = if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    Duration::from_secs_f64(secs.max(0.0))
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
