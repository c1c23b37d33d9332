//! Beacon event wire types and the transport seam.
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Interaction kinds a journey can report to the tracking service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    FunnelEnter,
    FunnelExit,
    FunnelReenter,
    FunnelReexit,
    Heartbeat,
    FunnelComplete,
}

impl EventType {
    /// Every event type, in reporting order.
    pub const ALL: [Self; 6] = [
        Self::FunnelEnter,
        Self::FunnelExit,
        Self::FunnelReenter,
        Self::FunnelReexit,
        Self::Heartbeat,
        Self::FunnelComplete,
    ];

    /// Number of distinct event types (counter array width).
    pub const COUNT: usize = Self::ALL.len();

    /// Wire name, identical to the serde representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FunnelEnter => "funnel_enter",
            Self::FunnelExit => "funnel_exit",
            Self::FunnelReenter => "funnel_reenter",
            Self::FunnelReexit => "funnel_reexit",
            Self::Heartbeat => "heartbeat",
            Self::FunnelComplete => "funnel_complete",
        }
    }

    /// Stable index into per-event counter arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::FunnelEnter => 0,
            Self::FunnelExit => 1,
            Self::FunnelReenter => 2,
            Self::FunnelReexit => 3,
            Self::Heartbeat => 4,
            Self::FunnelComplete => 5,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One beacon payload, serialized as the tracking service expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Step id, used as the wire "page" value.
    pub page: String,
    pub session_id: String,
    /// Journey-profile tag identifying the traffic generator.
    pub source: String,
    /// Accumulated dwell for exit-family events, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_on_page: Option<u64>,
}

/// Result of one beacon call as seen by the engine.
///
/// The engine never inspects response bodies; acceptance is purely a status
/// classification made by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconOutcome {
    pub accepted: bool,
    pub http_status: Option<u16>,
    pub latency: Duration,
    pub transport_error: Option<String>,
}

impl BeaconOutcome {
    /// Outcome for a call that reached the service and got a status back.
    #[must_use]
    pub fn from_status(status: u16, latency: Duration) -> Self {
        Self {
            accepted: (200..300).contains(&status),
            http_status: Some(status),
            latency,
            transport_error: None,
        }
    }

    /// Outcome for a connection or timeout failure.
    #[must_use]
    pub fn transport_failure(error: impl Into<String>, latency: Duration) -> Self {
        Self {
            accepted: false,
            http_status: None,
            latency,
            transport_error: Some(error.into()),
        }
    }

    /// Latency in whole milliseconds, saturating.
    #[must_use]
    pub fn latency_ms(&self) -> u64 {
        u64::try_from(self.latency.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Transport boundary: accepts an event record, performs the network call,
/// and reports what happened. Implementations carry their own bounded
/// timeout; a timed-out call comes back as a transport failure, never a hang.
#[async_trait]
pub trait BeaconSender: Send + Sync {
    async fn send(&self, event: &EventRecord) -> BeaconOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_indices_are_dense_and_unique() {
        let mut seen = [false; EventType::COUNT];
        for ty in EventType::ALL {
            assert!(!seen[ty.index()], "duplicate index for {ty}");
            seen[ty.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn record_serializes_to_wire_shape() {
        let record = EventRecord {
            event_type: EventType::FunnelEnter,
            page: "website".to_string(),
            session_id: "fs-1".to_string(),
            source: "funnelstorm".to_string(),
            time_on_page: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "funnel_enter");
        assert_eq!(json["page"], "website");
        assert_eq!(json["session_id"], "fs-1");
        assert!(json.get("time_on_page").is_none());
    }

    #[test]
    fn record_includes_time_on_page_when_present() {
        let record = EventRecord {
            event_type: EventType::FunnelExit,
            page: "tutorial".to_string(),
            session_id: "fs-2".to_string(),
            source: "funnelstorm".to_string(),
            time_on_page: Some(12_500),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "funnel_exit");
        assert_eq!(json["time_on_page"], 12_500);
    }

    #[test]
    fn status_classification_matches_http_semantics() {
        assert!(BeaconOutcome::from_status(200, Duration::from_millis(5)).accepted);
        assert!(BeaconOutcome::from_status(204, Duration::from_millis(5)).accepted);
        assert!(!BeaconOutcome::from_status(429, Duration::from_millis(5)).accepted);
        assert!(!BeaconOutcome::from_status(500, Duration::from_millis(5)).accepted);

        let failed = BeaconOutcome::transport_failure("connection refused", Duration::ZERO);
        assert!(!failed.accepted);
        assert!(failed.http_status.is_none());
        assert_eq!(failed.transport_error.as_deref(), Some("connection refused"));
    }
}
