//! Journey state-machine paths driven against a scripted beacon sender.
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use funnelstorm_engine::{
    BeaconOutcome, BeaconSender, EventRecord, EventType, FunnelModel, FunnelStep, JourneyRunner,
    JourneyTiming, MetricsAggregator, Session, SessionState,
};

/// Accepts everything except the configured event types, and logs every
/// record it sees in arrival order.
struct ScriptedSender {
    reject: HashSet<EventType>,
    latency: Duration,
    log: Mutex<Vec<EventRecord>>,
}

impl ScriptedSender {
    fn accepting() -> Self {
        Self {
            reject: HashSet::new(),
            latency: Duration::from_millis(5),
            log: Mutex::new(Vec::new()),
        }
    }

    fn rejecting(types: impl IntoIterator<Item = EventType>) -> Self {
        Self {
            reject: types.into_iter().collect(),
            latency: Duration::from_millis(5),
            log: Mutex::new(Vec::new()),
        }
    }

    fn events(&self) -> Vec<(EventType, String)> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|record| (record.event_type, record.page.clone()))
            .collect()
    }

    fn records(&self) -> Vec<EventRecord> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl BeaconSender for ScriptedSender {
    async fn send(&self, event: &EventRecord) -> BeaconOutcome {
        self.log.lock().unwrap().push(event.clone());
        if self.reject.contains(&event.event_type) {
            BeaconOutcome::from_status(503, self.latency)
        } else {
            BeaconOutcome::from_status(200, self.latency)
        }
    }
}

struct Harness {
    sender: Arc<ScriptedSender>,
    metrics: Arc<MetricsAggregator>,
    runner: JourneyRunner,
    _cancel_tx: watch::Sender<bool>,
}

fn harness(steps: Vec<FunnelStep>, sender: ScriptedSender) -> Harness {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let sender = Arc::new(sender);
    let metrics = Arc::new(MetricsAggregator::new());
    let runner = JourneyRunner::new(
        Arc::new(FunnelModel::new(steps).unwrap()),
        Arc::clone(&sender) as Arc<dyn BeaconSender>,
        Arc::clone(&metrics),
        JourneyTiming::new(3.0, 1.0),
        "journey-test".to_string(),
        cancel_rx,
    );
    Harness {
        sender,
        metrics,
        runner,
        _cancel_tx: cancel_tx,
    }
}

#[tokio::test(start_paused = true)]
async fn single_step_session_completes_with_one_enter_and_one_exit() {
    let steps = vec![FunnelStep::new("only", 0.0, 0.0)];
    let mut h = harness(steps, ScriptedSender::accepting());

    let mut session = Session::new("fs-1".to_string(), true);
    let state = h.runner.run(&mut session).await;

    assert_eq!(state, SessionState::Completed);
    assert_eq!(
        h.sender.events(),
        vec![
            (EventType::FunnelEnter, "only".to_string()),
            (EventType::FunnelExit, "only".to_string()),
        ]
    );
    let exit = &h.sender.records()[1];
    assert_eq!(exit.time_on_page, Some(0));
}

#[tokio::test(start_paused = true)]
async fn guaranteed_drop_off_never_reaches_the_next_step() {
    let steps = vec![
        FunnelStep::new("website", 0.0, 0.0).with_drop_off(1.0),
        FunnelStep::new("tutorial", 0.0, 0.0),
    ];
    let mut h = harness(steps, ScriptedSender::accepting());

    let mut session = Session::new("fs-2".to_string(), true);
    let state = h.runner.run(&mut session).await;

    assert_eq!(state, SessionState::Dropped);
    assert_eq!(session.current_step, 0);
    assert_eq!(
        h.sender.events(),
        vec![
            (EventType::FunnelEnter, "website".to_string()),
            (EventType::FunnelExit, "website".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn rejected_enter_aborts_after_exactly_one_event() {
    let steps = vec![
        FunnelStep::new("website", 0.0, 0.0),
        FunnelStep::new("tutorial", 0.0, 0.0),
    ];
    let mut h = harness(steps, ScriptedSender::rejecting([EventType::FunnelEnter]));

    let mut session = Session::new("fs-3".to_string(), true);
    let state = h.runner.run(&mut session).await;

    assert_eq!(state, SessionState::Aborted);
    assert_eq!(
        h.sender.events(),
        vec![(EventType::FunnelEnter, "website".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn exit_rejection_is_tolerated_and_the_journey_continues() {
    let steps = vec![
        FunnelStep::new("website", 0.0, 0.0),
        FunnelStep::new("tutorial", 0.0, 0.0),
    ];
    let mut h = harness(steps, ScriptedSender::rejecting([EventType::FunnelExit]));

    let mut session = Session::new("fs-4".to_string(), true);
    let state = h.runner.run(&mut session).await;

    assert_eq!(state, SessionState::Completed);
    assert_eq!(
        h.sender.events(),
        vec![
            (EventType::FunnelEnter, "website".to_string()),
            (EventType::FunnelExit, "website".to_string()),
            (EventType::FunnelEnter, "tutorial".to_string()),
            (EventType::FunnelExit, "tutorial".to_string()),
        ]
    );
    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.event(EventType::FunnelExit).failed, 2);
    assert_eq!(snapshot.event(EventType::FunnelEnter).accepted, 2);
}

#[tokio::test(start_paused = true)]
async fn full_visit_preserves_causal_event_order() {
    // Dwell 6s with a 3s heartbeat cadence: exactly one heartbeat, after the
    // first increment. Bounce is certain, completion fires on the terminal
    // step.
    let steps = vec![
        FunnelStep::new("webinar", 6.0, 6.0).with_bounce(1.0),
        FunnelStep::new("congrats", 0.0, 0.0).with_completion_marker(),
    ];
    let mut h = harness(steps, ScriptedSender::accepting());

    let mut session = Session::new("fs-5".to_string(), true);
    let state = h.runner.run(&mut session).await;

    assert_eq!(state, SessionState::Completed);
    assert_eq!(
        h.sender.events(),
        vec![
            (EventType::FunnelEnter, "webinar".to_string()),
            (EventType::Heartbeat, "webinar".to_string()),
            (EventType::FunnelReexit, "webinar".to_string()),
            (EventType::FunnelReenter, "webinar".to_string()),
            (EventType::FunnelExit, "webinar".to_string()),
            (EventType::FunnelEnter, "congrats".to_string()),
            (EventType::FunnelComplete, "congrats".to_string()),
            (EventType::FunnelExit, "congrats".to_string()),
        ]
    );

    // The bounce reexit and the final exit both carry the sampled dwell; the
    // bounce never extends time-on-page accounting.
    let records = h.sender.records();
    let reexit = records
        .iter()
        .find(|r| r.event_type == EventType::FunnelReexit)
        .unwrap();
    let exit = records
        .iter()
        .find(|r| r.event_type == EventType::FunnelExit && r.page == "webinar")
        .unwrap();
    assert_eq!(reexit.time_on_page, Some(6000));
    assert_eq!(exit.time_on_page, Some(6000));
}

#[tokio::test(start_paused = true)]
async fn visited_steps_increase_strictly_with_no_skips() {
    let steps = vec![
        FunnelStep::new("website", 0.0, 0.0),
        FunnelStep::new("tutorial", 0.0, 0.0),
        FunnelStep::new("webinar", 0.0, 0.0),
        FunnelStep::new("contract", 0.0, 0.0),
    ];
    let order: Vec<String> = steps.iter().map(|s| s.id.clone()).collect();
    let mut h = harness(steps, ScriptedSender::accepting());

    let mut session = Session::new("fs-6".to_string(), true);
    let state = h.runner.run(&mut session).await;
    assert_eq!(state, SessionState::Completed);

    let entered: Vec<String> = h
        .sender
        .records()
        .iter()
        .filter(|r| r.event_type == EventType::FunnelEnter)
        .map(|r| r.page.clone())
        .collect();
    assert_eq!(entered, order);
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_dwell_aborts_without_a_final_exit() {
    let steps = vec![FunnelStep::new("webinar", 3600.0, 3600.0)];
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let sender = Arc::new(ScriptedSender::accepting());
    let metrics = Arc::new(MetricsAggregator::new());
    let mut runner = JourneyRunner::new(
        Arc::new(FunnelModel::new(steps).unwrap()),
        Arc::clone(&sender) as Arc<dyn BeaconSender>,
        Arc::clone(&metrics),
        JourneyTiming::new(3.0, 1.0),
        "journey-test".to_string(),
        cancel_rx,
    );

    let handle = tokio::spawn(async move {
        let mut session = Session::new("fs-7".to_string(), true);
        runner.run(&mut session).await
    });

    // Let the journey enter and settle into its dwell sleep, then pull the
    // plug before the dwell can elapse.
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    cancel_tx.send(true).unwrap();

    let state = handle.await.unwrap();
    assert_eq!(state, SessionState::Aborted);
    let events = sender.events();
    assert_eq!(events, vec![(EventType::FunnelEnter, "webinar".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn metrics_conserve_across_a_mixed_run() {
    let steps = vec![
        FunnelStep::new("website", 0.0, 0.0),
        FunnelStep::new("tutorial", 0.0, 0.0),
    ];
    let mut h = harness(steps, ScriptedSender::rejecting([EventType::FunnelExit]));

    for i in 0..10 {
        let mut session = Session::new(format!("fs-c{i}"), true);
        h.runner.run(&mut session).await;
    }

    let snapshot = h.metrics.snapshot();
    for stats in &snapshot.events {
        assert_eq!(stats.accepted + stats.failed, stats.attempted());
    }
    assert_eq!(snapshot.event(EventType::FunnelEnter).attempted(), 20);
    assert_eq!(snapshot.event(EventType::FunnelExit).failed, 20);
    assert_eq!(snapshot.total_attempted(), 40);
}
