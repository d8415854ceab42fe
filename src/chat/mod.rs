//! Chat application module for streamed conversations with the assistant.
//!
//! This module provides the conversation state machine and the pieces a front end
//! needs around it:
//!
//! - Streaming answers rendered as they arrive
//! - Cancellation from any thread through a [`CancelHandle`]
//! - Inactivity timeouts before the first chunk and between chunks
//! - Slash commands for session control
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`policy`]: timeout, flush, and history policies plus user-visible notices
//! - [`session`]: the session state machine and conversation history
//! - [`commands`]: slash command parsing

pub mod commands;
pub mod config;
pub mod policy;
pub mod session;

pub use crate::render::{HtmlRenderer, PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use policy::{FlushPolicy, HistoryPolicy, Notices, TimeoutPolicy};
pub use session::{CancelHandle, ChatHistory, ChatSession, Exchange, SessionStats};
