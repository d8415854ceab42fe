//! Tunable behavior of a chat session.
//!
//! Each policy is a small value type with defaults that match the production web client;
//! [`ChatConfig`](super::ChatConfig) bundles them.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;
use crate::types::TimeoutPhase;

/// Default wait for the first chunk of an answer.
pub const DEFAULT_FIRST_BYTE_TIMEOUT: Duration = Duration::from_secs(180);

/// Default wait between chunks once an answer has started.
pub const DEFAULT_BETWEEN_CHUNKS_TIMEOUT: Duration = Duration::from_secs(90);

/// Default number of characters rendered between flushes.
pub const DEFAULT_FLUSH_CHARS: usize = 20;

/// Inactivity windows for an exchange.
///
/// The first window is long because the server may search and think before it writes
/// anything; once text flows, a shorter gap means the stream stalled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Maximum wait from submit to the first chunk.
    pub first_byte: Duration,
    /// Maximum wait between two chunks.
    pub between_chunks: Duration,
}

impl TimeoutPolicy {
    /// Creates a policy from the two windows.
    pub fn new(first_byte: Duration, between_chunks: Duration) -> Self {
        Self {
            first_byte,
            between_chunks,
        }
    }

    /// The window that applies in `phase`.
    pub fn window(&self, phase: TimeoutPhase) -> Duration {
        match phase {
            TimeoutPhase::FirstByte => self.first_byte,
            TimeoutPhase::Stalled => self.between_chunks,
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FIRST_BYTE_TIMEOUT, DEFAULT_BETWEEN_CHUNKS_TIMEOUT)
    }
}

/// How often a growing answer is flushed to the renderer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Flush once at least this many characters arrived since the last flush.
    pub min_chars: usize,
}

impl FlushPolicy {
    /// Flush after at least `min_chars` new characters.
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    /// Flush after every increment.
    pub fn every_chunk() -> Self {
        Self::new(0)
    }

    /// Returns true when `pending_chars` characters are enough to flush.
    pub fn should_flush(&self, pending_chars: usize) -> bool {
        pending_chars > 0 && pending_chars >= self.min_chars
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_CHARS)
    }
}

/// Which prior turns accompany a request.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum HistoryPolicy {
    /// Send every completed turn of the session.
    #[default]
    Full,
    /// Send only the new user message.
    LatestOnly,
}

impl fmt::Display for HistoryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryPolicy::Full => f.write_str("full"),
            HistoryPolicy::LatestOnly => f.write_str("latest"),
        }
    }
}

impl FromStr for HistoryPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" | "all" => Ok(HistoryPolicy::Full),
            "latest" | "latest-only" | "latest_only" | "none" => Ok(HistoryPolicy::LatestOnly),
            other => Err(Error::validation(
                format!("unknown history policy {other:?} (expected 'full' or 'latest')"),
                Some("history".to_string()),
            )),
        }
    }
}

/// User-visible strings written into the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notices {
    /// Placeholder shown until the first chunk arrives.
    pub thinking: String,
    /// Appended when the user stops an answer.
    pub stopped: String,
    /// Replaces the answer when the request fails.
    pub failed: String,
    /// Appended when nothing arrives within the first-byte window.
    pub first_byte_timeout: String,
    /// Appended when an answer stalls.
    pub stalled: String,
    /// Shown when an empty message is submitted.
    pub empty_input: String,
    /// Shown when a message is submitted while an answer is streaming.
    pub too_fast: String,
}

impl Notices {
    /// The annotation for a timeout in `phase`.
    pub fn timeout(&self, phase: TimeoutPhase) -> &str {
        match phase {
            TimeoutPhase::FirstByte => &self.first_byte_timeout,
            TimeoutPhase::Stalled => &self.stalled,
        }
    }
}

impl Default for Notices {
    fn default() -> Self {
        Self {
            thinking: "思考中...".to_string(),
            stopped: "(已停止生成)".to_string(),
            failed: "请求失败，请稍后再试".to_string(),
            first_byte_timeout: "响应超时：服务器处理时间过长，请稍后重试".to_string(),
            stalled: "响应中断：长时间未收到新数据".to_string(),
            empty_input: "输入不能为空".to_string(),
            too_fast: "发送过快".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_defaults() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.window(TimeoutPhase::FirstByte), Duration::from_secs(180));
        assert_eq!(policy.window(TimeoutPhase::Stalled), Duration::from_secs(90));
    }

    #[test]
    fn flush_threshold() {
        let policy = FlushPolicy::default();
        assert!(!policy.should_flush(0));
        assert!(!policy.should_flush(19));
        assert!(policy.should_flush(20));

        let eager = FlushPolicy::every_chunk();
        assert!(!eager.should_flush(0));
        assert!(eager.should_flush(1));
    }

    #[test]
    fn history_policy_parsing() {
        assert_eq!("full".parse::<HistoryPolicy>().unwrap(), HistoryPolicy::Full);
        assert_eq!(
            " Latest ".parse::<HistoryPolicy>().unwrap(),
            HistoryPolicy::LatestOnly
        );
        assert_eq!(
            "latest-only".parse::<HistoryPolicy>().unwrap(),
            HistoryPolicy::LatestOnly
        );
        let err = "sometimes".parse::<HistoryPolicy>().unwrap_err();
        assert!(err.is_validation());
        assert_eq!(HistoryPolicy::LatestOnly.to_string(), "latest");
        assert_eq!(HistoryPolicy::default(), HistoryPolicy::Full);
    }

    #[test]
    fn notices_by_phase() {
        let notices = Notices::default();
        assert_eq!(notices.timeout(TimeoutPhase::FirstByte), notices.first_byte_timeout);
        assert_eq!(notices.timeout(TimeoutPhase::Stalled), "响应中断：长时间未收到新数据");
    }
}
