//! Logging trait for chat session activity.
//!
//! This module provides the [`SessionLogger`] trait that allows users to capture every
//! exchange a [`ChatSession`](crate::chat::ChatSession) runs, and [`JsonLinesLogger`],
//! which writes one JSON object per event to any writer.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use time::OffsetDateTime;

use crate::decoder::MalformedTail;
use crate::types::{ChatRequest, ExchangeOutcome, StreamState, Turn};

/// A trait for logging chat session activity.
///
/// Every hook receives the id of the exchange it belongs to.  Ids increase by one per
/// accepted submit and are never reused within a session.
///
/// # Example
///
/// ```rust,ignore
/// use shishan::{SessionLogger, ChatRequest, StreamState};
///
/// struct StderrLogger;
///
/// impl SessionLogger for StderrLogger {
///     fn log_request(&self, exchange: u64, request: &ChatRequest) {
///         eprintln!("[{exchange}] -> {}", request.user_message);
///     }
///
///     fn log_transition(&self, exchange: u64, from: StreamState, to: StreamState) {
///         eprintln!("[{exchange}] {from} -> {to}");
///     }
/// }
/// ```
pub trait SessionLogger: Send + Sync {
    /// Log a request just before it is handed to the transport.
    fn log_request(&self, exchange: u64, request: &ChatRequest);

    /// Log a decoded increment of the answer.
    fn log_chunk(&self, exchange: u64, text: &str) {
        _ = exchange;
        _ = text;
    }

    /// Log a state machine transition.
    fn log_transition(&self, exchange: u64, from: StreamState, to: StreamState);

    /// Log bytes left over when a stream ended inside a character.
    fn log_malformed_tail(&self, exchange: u64, tail: &MalformedTail) {
        _ = exchange;
        _ = tail;
    }

    /// Log the finalized assistant turn of an exchange.
    fn log_outcome(&self, exchange: u64, outcome: &ExchangeOutcome, turn: &Turn) {
        _ = exchange;
        _ = outcome;
        _ = turn;
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum LogEvent<'a> {
    Request {
        request: &'a ChatRequest,
    },
    Chunk {
        text: &'a str,
    },
    Transition {
        from: StreamState,
        to: StreamState,
    },
    MalformedTail {
        bytes: &'a [u8],
    },
    Outcome {
        outcome: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        turn: &'a Turn,
    },
}

#[derive(Serialize)]
struct LogLine<'a> {
    #[serde(with = "crate::utils::time")]
    at: OffsetDateTime,
    exchange: u64,
    #[serde(flatten)]
    event: LogEvent<'a>,
}

/// A [`SessionLogger`] that writes newline-delimited JSON.
///
/// Write failures are ignored; logging never interrupts a chat.
pub struct JsonLinesLogger<W: Write + Send> {
    writer: Mutex<W>,
    include_chunks: bool,
}

impl<W: Write + Send> JsonLinesLogger<W> {
    /// Creates a logger over `writer` that records every event, including chunks.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            include_chunks: true,
        }
    }

    /// Skips per-chunk events, which dominate the log for long answers.
    pub fn without_chunks(mut self) -> Self {
        self.include_chunks = false;
        self
    }

    /// Consumes the logger and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, exchange: u64, event: LogEvent<'_>) {
        let line = LogLine {
            at: OffsetDateTime::now_utc(),
            exchange,
            event,
        };
        let Ok(mut json) = serde_json::to_vec(&line) else {
            return;
        };
        json.push(b'\n');
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writer.write_all(&json);
        let _ = writer.flush();
    }
}

impl<W: Write + Send> SessionLogger for JsonLinesLogger<W> {
    fn log_request(&self, exchange: u64, request: &ChatRequest) {
        self.write(exchange, LogEvent::Request { request });
    }

    fn log_chunk(&self, exchange: u64, text: &str) {
        if self.include_chunks {
            self.write(exchange, LogEvent::Chunk { text });
        }
    }

    fn log_transition(&self, exchange: u64, from: StreamState, to: StreamState) {
        self.write(exchange, LogEvent::Transition { from, to });
    }

    fn log_malformed_tail(&self, exchange: u64, tail: &MalformedTail) {
        self.write(
            exchange,
            LogEvent::MalformedTail {
                bytes: tail.bytes(),
            },
        );
    }

    fn log_outcome(&self, exchange: u64, outcome: &ExchangeOutcome, turn: &Turn) {
        let error = match outcome {
            ExchangeOutcome::Errored(err) => Some(err.to_string()),
            _ => None,
        };
        self.write(
            exchange,
            LogEvent::Outcome {
                outcome: outcome.kind(),
                error,
                turn,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::TurnStatus;
    use serde_json::Value;

    fn lines(logger: JsonLinesLogger<Vec<u8>>) -> Vec<Value> {
        let bytes = logger.into_inner();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn writes_one_object_per_event() {
        let logger = JsonLinesLogger::new(Vec::new());
        logger.log_request(1, &ChatRequest::new("你好"));
        logger.log_transition(1, StreamState::Idle, StreamState::AwaitingFirstByte);
        logger.log_chunk(1, "Hi");

        let lines = lines(logger);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["event"], "request");
        assert_eq!(lines[0]["exchange"], 1);
        assert_eq!(lines[0]["request"]["userMessage"], "你好");
        assert_eq!(lines[1]["event"], "transition");
        assert_eq!(lines[1]["from"], "idle");
        assert_eq!(lines[1]["to"], "awaiting_first_byte");
        assert_eq!(lines[2]["text"], "Hi");
        assert!(lines[2]["at"].is_string());
    }

    #[test]
    fn chunks_can_be_skipped() {
        let logger = JsonLinesLogger::new(Vec::new()).without_chunks();
        logger.log_chunk(4, "ignored");
        logger.log_transition(4, StreamState::Streaming, StreamState::Completed);
        let lines = lines(logger);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["event"], "transition");
    }

    #[test]
    fn outcome_includes_error_detail() {
        let logger = JsonLinesLogger::new(Vec::new());
        let mut turn = Turn::pending_assistant("请求失败，请稍后再试");
        turn.status = TurnStatus::Failed;
        logger.log_outcome(2, &ExchangeOutcome::Errored(Error::api(503, "down")), &turn);

        let lines = lines(logger);
        assert_eq!(lines[0]["outcome"], "errored");
        assert_eq!(lines[0]["error"], "HTTP error: status 503: down");
        assert_eq!(lines[0]["turn"]["status"], "failed");
    }
}
