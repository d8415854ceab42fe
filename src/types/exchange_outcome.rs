use crate::error::Error;
use crate::types::{StreamState, TimeoutPhase, TurnStatus};

/// How a single submit/stream exchange ended.
#[derive(Debug, Clone)]
pub enum ExchangeOutcome {
    /// The server finished and produced text.
    Completed,

    /// The server finished without producing any text.
    Empty,

    /// The user stopped the exchange.
    Cancelled,

    /// No data arrived within the inactivity window.
    TimedOut(TimeoutPhase),

    /// The transport failed.
    Errored(Error),
}

impl ExchangeOutcome {
    /// The terminal state the session passed through for this outcome.
    pub fn state(&self) -> StreamState {
        match self {
            ExchangeOutcome::Completed | ExchangeOutcome::Empty => StreamState::Completed,
            ExchangeOutcome::Cancelled => StreamState::Cancelled,
            ExchangeOutcome::TimedOut(_) => StreamState::TimedOut,
            ExchangeOutcome::Errored(_) => StreamState::Errored,
        }
    }

    /// The status recorded on the assistant turn.
    pub fn turn_status(&self) -> TurnStatus {
        match self {
            ExchangeOutcome::Completed => TurnStatus::Complete,
            ExchangeOutcome::Empty => TurnStatus::Empty,
            ExchangeOutcome::Cancelled => TurnStatus::Cancelled,
            ExchangeOutcome::TimedOut(_) => TurnStatus::TimedOut,
            ExchangeOutcome::Errored(_) => TurnStatus::Failed,
        }
    }

    /// A short name for logs and statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            ExchangeOutcome::Completed => "completed",
            ExchangeOutcome::Empty => "empty",
            ExchangeOutcome::Cancelled => "cancelled",
            ExchangeOutcome::TimedOut(TimeoutPhase::FirstByte) => "timed_out_first_byte",
            ExchangeOutcome::TimedOut(TimeoutPhase::Stalled) => "timed_out_stalled",
            ExchangeOutcome::Errored(_) => "errored",
        }
    }

    /// Returns true if the exchange produced an answer.
    pub fn is_completed(&self) -> bool {
        matches!(self, ExchangeOutcome::Completed)
    }

    /// Returns true if the exchange was stopped by the user.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExchangeOutcome::Cancelled)
    }

    /// Returns true if the exchange timed out.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, ExchangeOutcome::TimedOut(_))
    }

    /// Returns true if the exchange failed.
    pub fn is_errored(&self) -> bool {
        matches!(self, ExchangeOutcome::Errored(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_completion_is_recorded_distinctly() {
        let outcome = ExchangeOutcome::Empty;
        assert_eq!(outcome.state(), StreamState::Completed);
        assert_eq!(outcome.turn_status(), TurnStatus::Empty);
        assert!(!outcome.is_completed());
    }

    #[test]
    fn timeouts_never_map_to_errored() {
        for phase in [TimeoutPhase::FirstByte, TimeoutPhase::Stalled] {
            let outcome = ExchangeOutcome::TimedOut(phase);
            assert_eq!(outcome.state(), StreamState::TimedOut);
            assert_eq!(outcome.turn_status(), TurnStatus::TimedOut);
            assert!(!outcome.is_errored());
        }
    }

    #[test]
    fn errored_carries_failed_status() {
        let outcome = ExchangeOutcome::Errored(Error::api(500, "boom"));
        assert_eq!(outcome.state(), StreamState::Errored);
        assert_eq!(outcome.turn_status(), TurnStatus::Failed);
        assert_eq!(outcome.kind(), "errored");
    }
}
