//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the chat session without sending a message
//! to the assistant.

use std::time::Duration;

use crate::chat::policy::HistoryPolicy;

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the assistant.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Start a new conversation, stopping any answer in flight.
    New,

    /// Print the turns of the conversation.
    ShowHistory,

    /// Change which prior turns are sent with each request.
    History(HistoryPolicy),

    /// Set the wait for the first chunk of an answer.
    FirstByteTimeout(Duration),

    /// Set the wait between chunks.
    IdleTimeout(Duration),

    /// Set the number of characters rendered between flushes.
    Flush(usize),

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Display session statistics (turn count, outcomes, bytes received).
    Stats,

    /// Show the current configuration.
    ShowConfig,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a valid command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use shishan::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/timeout idle 30").is_some());
/// assert!(parse_command("图书馆几点开门？").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "new" | "clear" | "reset" => ChatCommand::New,
        "history" => match argument {
            None => ChatCommand::ShowHistory,
            Some(arg) => match arg.parse::<HistoryPolicy>() {
                Ok(policy) => ChatCommand::History(policy),
                Err(_) => ChatCommand::Invalid("/history expects 'full' or 'latest'".to_string()),
            },
        },
        "timeout" => parse_timeout_command(argument),
        "flush" => match argument.map(|arg| arg.parse::<usize>()) {
            Some(Ok(chars)) => ChatCommand::Flush(chars),
            Some(Err(_)) => {
                ChatCommand::Invalid("/flush expects a character count".to_string())
            }
            None => ChatCommand::Invalid("/flush requires a value".to_string()),
        },
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "stats" | "status" => ChatCommand::Stats,
        "config" => ChatCommand::ShowConfig,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn parse_timeout_command(argument: Option<&str>) -> ChatCommand {
    let Some(arg) = argument else {
        return ChatCommand::Invalid("/timeout requires 'first <secs>' or 'idle <secs>'".to_string());
    };

    let mut parts = arg.split_whitespace();
    let which = parts.next().unwrap_or_default().to_lowercase();
    let secs = match parts.next().map(parse_seconds) {
        Some(Ok(secs)) => secs,
        Some(Err(err)) => return ChatCommand::Invalid(format!("/timeout {which} {err}")),
        None => return ChatCommand::Invalid(format!("/timeout {which} requires seconds")),
    };
    match which.as_str() {
        "first" | "first_byte" | "first-byte" => ChatCommand::FirstByteTimeout(secs),
        "idle" | "between" | "stall" => ChatCommand::IdleTimeout(secs),
        _ => ChatCommand::Invalid("Unrecognized /timeout window (use first or idle)".to_string()),
    }
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    match value.parse::<u64>() {
        Ok(0) | Err(_) => Err("expects a positive number of seconds".to_string()),
        Ok(secs) => Ok(Duration::from_secs(secs)),
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /new                   Start a new conversation (alias: /clear)
  /history               Show the conversation so far
  /history full|latest   Send all prior turns, or only the new message
  /timeout first <secs>  Set the wait for the first chunk (default 180)
  /timeout idle <secs>   Set the wait between chunks (default 90)
  /flush <chars>         Set characters rendered between flushes (default 20)
  /stats                 Show session statistics
  /config                Show current configuration
  /help                  Show this help message
  /quit                  Exit the chat

Press Ctrl-C while an answer is streaming to stop it."#
}
