//! Session entity and id generation.
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Lifecycle state of one simulated journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Entering,
    Dwelling,
    Bounced,
    Exiting,
    Dropped,
    Completed,
    Aborted,
}

impl SessionState {
    /// Terminal states free the population slot.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Dropped | Self::Completed | Self::Aborted)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Entering => "ENTERING",
            Self::Dwelling => "DWELLING",
            Self::Bounced => "BOUNCED",
            Self::Exiting => "EXITING",
            Self::Dropped => "DROPPED",
            Self::Completed => "COMPLETED",
            Self::Aborted => "ABORTED",
        };
        f.write_str(label)
    }
}

/// One simulated user journey. Created by the scheduler, mutated only by the
/// journey state machine driving it.
#[derive(Debug)]
pub struct Session {
    pub session_id: String,
    /// Index into the funnel model's ordered steps.
    pub current_step: usize,
    pub state: SessionState,
    pub started_at: Instant,
    /// Marks a one-shot journey: the owning task retires after this session
    /// instead of starting another iteration.
    pub one_shot: bool,
}

impl Session {
    #[must_use]
    pub fn new(session_id: String, one_shot: bool) -> Self {
        Self {
            session_id,
            current_step: 0,
            state: SessionState::Entering,
            started_at: Instant::now(),
            one_shot,
        }
    }
}

/// Produces session ids that are unique for the process lifetime: a random
/// per-run nonce plus a monotonic counter, so ids never collide across
/// concurrently-active sessions and are never reused.
#[derive(Debug)]
pub struct SessionIdGen {
    prefix: String,
    counter: AtomicU64,
}

impl SessionIdGen {
    #[must_use]
    pub fn new(source: &str) -> Self {
        let nonce: u32 = rand::thread_rng().r#gen();
        Self {
            prefix: format!("{source}-{nonce:08x}"),
            counter: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }

    /// Sessions issued so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}
