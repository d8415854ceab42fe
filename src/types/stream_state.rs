use std::fmt;

use serde::{Deserialize, Serialize};

/// The state of a session's single streaming slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// Ready for the next submit.
    Idle,

    /// A request is out; nothing has been decoded yet.
    AwaitingFirstByte,

    /// Text is arriving.
    Streaming,

    /// The user stopped the exchange.
    Cancelled,

    /// The inactivity window expired.
    TimedOut,

    /// The transport failed.
    Errored,

    /// The server finished the response.
    Completed,
}

impl StreamState {
    /// Returns true while a request is in flight.
    pub fn is_active(self) -> bool {
        matches!(self, StreamState::AwaitingFirstByte | StreamState::Streaming)
    }

    /// Returns true for the states an exchange passes through on its way back to `Idle`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamState::Cancelled
                | StreamState::TimedOut
                | StreamState::Errored
                | StreamState::Completed
        )
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Idle => "idle",
            StreamState::AwaitingFirstByte => "awaiting first byte",
            StreamState::Streaming => "streaming",
            StreamState::Cancelled => "cancelled",
            StreamState::TimedOut => "timed out",
            StreamState::Errored => "errored",
            StreamState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Which inactivity window expired.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPhase {
    /// Nothing arrived after the request was sent.
    FirstByte,

    /// The stream started but then stalled.
    Stalled,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutPhase::FirstByte => f.write_str("first byte"),
            TimeoutPhase::Stalled => f.write_str("stalled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_and_terminal_are_disjoint() {
        let all = [
            StreamState::Idle,
            StreamState::AwaitingFirstByte,
            StreamState::Streaming,
            StreamState::Cancelled,
            StreamState::TimedOut,
            StreamState::Errored,
            StreamState::Completed,
        ];
        for state in all {
            assert!(!(state.is_active() && state.is_terminal()), "{state}");
        }
        assert!(!StreamState::Idle.is_active());
        assert!(!StreamState::Idle.is_terminal());
    }

    #[test]
    fn state_serialization() {
        let json = serde_json::to_value(StreamState::AwaitingFirstByte).unwrap();
        assert_eq!(json, serde_json::json!("awaiting_first_byte"));
    }
}
