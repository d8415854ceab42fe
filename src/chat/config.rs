//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::chat::policy::{FlushPolicy, HistoryPolicy, Notices, TimeoutPolicy};
use crate::error::{Error, Result};

/// Command-line arguments for the shishan-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Endpoint that answers chat requests.
    #[arrrg(optional, "Chat endpoint URL (default: $SHISHAN_ENDPOINT or http://localhost:5001/getMessageWeb)", "URL")]
    pub endpoint: Option<String>,

    /// Which prior turns to send with each request.
    #[arrrg(optional, "History sent with each request: full or latest (default: full)", "POLICY")]
    pub history: Option<String>,

    /// Seconds to wait for the first chunk of an answer.
    #[arrrg(optional, "Seconds to wait for the first chunk (default: 180)", "SECS")]
    pub first_byte_timeout: Option<u64>,

    /// Seconds to wait between chunks.
    #[arrrg(optional, "Seconds to wait between chunks (default: 90)", "SECS")]
    pub idle_timeout: Option<u64>,

    /// Seconds to wait for the TCP/TLS connection.
    #[arrrg(optional, "Seconds to wait for the connection (default: 30)", "SECS")]
    pub connect_timeout: Option<u64>,

    /// Characters to accumulate between flushes.
    #[arrrg(optional, "Characters rendered between flushes (default: 20)", "CHARS")]
    pub flush_chars: Option<u32>,

    /// File that receives a JSON-lines log of every exchange.
    #[arrrg(optional, "Append a JSON-lines session log to FILE", "FILE")]
    pub log_file: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Endpoint override; `None` defers to the environment and then the default.
    pub endpoint: Option<String>,

    /// Connection timeout for the HTTP client; `None` uses the client default.
    pub connect_timeout: Option<Duration>,

    /// Inactivity windows for each exchange.
    pub timeouts: TimeoutPolicy,

    /// Render flush cadence.
    pub flush: FlushPolicy,

    /// Which prior turns accompany a request.
    pub history: HistoryPolicy,

    /// User-visible notices written into the transcript.
    pub notices: Notices,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Path of the JSON-lines session log, if any.
    pub log_path: Option<PathBuf>,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Timeouts: 180 s to the first chunk, 90 s between chunks
    /// - Flush: every 20 characters
    /// - History: full
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            endpoint: None,
            connect_timeout: None,
            timeouts: TimeoutPolicy::default(),
            flush: FlushPolicy::default(),
            history: HistoryPolicy::default(),
            notices: Notices::default(),
            use_color: true,
            log_path: None,
        }
    }

    /// Sets the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets both inactivity windows.
    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Sets the flush cadence.
    pub fn with_flush(mut self, flush: FlushPolicy) -> Self {
        self.flush = flush;
        self
    }

    /// Sets the history policy.
    pub fn with_history(mut self, history: HistoryPolicy) -> Self {
        self.history = history;
        self
    }

    /// Replaces the user-visible notices.
    pub fn with_notices(mut self, notices: Notices) -> Self {
        self.notices = notices;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the session log path.
    pub fn with_log_path(mut self, path: Option<PathBuf>) -> Self {
        self.log_path = path;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = Error;

    fn try_from(args: ChatArgs) -> Result<Self> {
        let defaults = TimeoutPolicy::default();
        let timeouts = TimeoutPolicy::new(
            args.first_byte_timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.first_byte),
            args.idle_timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.between_chunks),
        );
        if timeouts.first_byte.is_zero() || timeouts.between_chunks.is_zero() {
            return Err(Error::validation(
                "timeouts must be at least one second",
                Some("timeout".to_string()),
            ));
        }
        let history = match args.history {
            Some(history) => history.parse()?,
            None => HistoryPolicy::default(),
        };

        Ok(ChatConfig {
            endpoint: args.endpoint,
            connect_timeout: args.connect_timeout.map(Duration::from_secs),
            timeouts,
            flush: args
                .flush_chars
                .map(|chars| FlushPolicy::new(chars as usize))
                .unwrap_or_default(),
            history,
            use_color: !args.no_color,
            log_path: args.log_file.map(PathBuf::from),
            ..ChatConfig::new()
        })
    }
}
