//! Interactive chat application for conversing with ShishanGPT.
//!
//! This binary provides a streaming REPL over the assistant's chat endpoint.
//!
//! # Usage
//!
//! ```bash
//! # Talk to the local development server
//! shishan-chat
//!
//! # Point at another deployment
//! shishan-chat --endpoint http://10.0.0.7:5001/getMessageWeb
//!
//! # Send only the latest message, and keep a log of every exchange
//! shishan-chat --history latest --log-file chat.jsonl
//!
//! # Disable colors (useful for piping output)
//! shishan-chat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/new` - Start a new conversation
//! - `/history full|latest` - Choose what context is sent
//! - `/timeout first|idle <secs>` - Adjust inactivity windows
//! - `/stats` - Show session statistics
//! - `/quit` - Exit the application
//!
//! Ctrl-C stops the answer that is streaming; at the prompt it does nothing.

use std::fs::OpenOptions;
use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use shishan::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, FlushPolicy, PlainTextRenderer, Renderer,
    TimeoutPolicy, help_text, parse_command,
};
use shishan::{ChatClient, JsonLinesLogger, Role};

type Session = ChatSession<ChatClient, PlainTextRenderer>;

/// Main entry point for the shishan-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("shishan-chat [OPTIONS]");
    let config = ChatConfig::try_from(args)?;

    let client = ChatClient::with_options(config.endpoint.clone(), config.connect_timeout)?;
    let endpoint = client.endpoint().to_string();
    let renderer = PlainTextRenderer::with_color(config.use_color);
    let log_path = config.log_path.clone();
    let mut session = ChatSession::new(client, renderer, config);
    if let Some(path) = log_path {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        session = session.with_logger(Arc::new(JsonLinesLogger::new(file)));
    }
    let mut rl = DefaultEditor::new()?;

    // Ctrl+C stops whatever answer is in flight.
    let cancel = session.cancel_handle();
    ctrlc::set_handler(move || {
        cancel.cancel();
    })?;

    println!("ShishanGPT ({endpoint})");
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                // Check for slash commands
                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::New => {
                            session.new_session();
                            session.renderer_mut().print_info("Started a new conversation.");
                        }
                        ChatCommand::ShowHistory => {
                            print_history(&session);
                        }
                        ChatCommand::History(policy) => {
                            session.set_history_policy(policy);
                            session
                                .renderer_mut()
                                .print_info(&format!("History policy set to {policy}"));
                        }
                        ChatCommand::FirstByteTimeout(window) => {
                            let timeouts = session.config().timeouts;
                            session.set_timeouts(TimeoutPolicy::new(window, timeouts.between_chunks));
                            session.renderer_mut().print_info(&format!(
                                "First-chunk timeout set to {}s",
                                window.as_secs()
                            ));
                        }
                        ChatCommand::IdleTimeout(window) => {
                            let timeouts = session.config().timeouts;
                            session.set_timeouts(TimeoutPolicy::new(timeouts.first_byte, window));
                            session.renderer_mut().print_info(&format!(
                                "Between-chunk timeout set to {}s",
                                window.as_secs()
                            ));
                        }
                        ChatCommand::Flush(chars) => {
                            session.set_flush_policy(FlushPolicy::new(chars));
                            session
                                .renderer_mut()
                                .print_info(&format!("Flushing every {chars} characters"));
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Stats => {
                            print_stats(&session);
                        }
                        ChatCommand::ShowConfig => {
                            print_config(&session, &endpoint);
                        }
                        ChatCommand::Invalid(message) => {
                            session.renderer_mut().print_error(&message);
                        }
                    }
                    continue;
                }

                // Regular message - send to the assistant
                println!("ShishanGPT:");
                match session.send(line).await {
                    Ok(_) => {}
                    // Rejections were already shown as notices.
                    Err(e) if e.is_validation() || e.is_busy() => {}
                    Err(e) => session.renderer_mut().print_error(&e.to_string()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                session
                    .renderer_mut()
                    .print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

fn print_history(session: &Session) {
    let turns = session.history().turns();
    if turns.is_empty() {
        println!("    (no turns yet)");
        return;
    }
    for turn in turns {
        let speaker = match turn.role {
            Role::User => "You",
            Role::Assistant => "ShishanGPT",
        };
        println!("    {speaker} [{:?}]:", turn.status);
        for line in turn.content.lines() {
            println!("      {line}");
        }
    }
}

fn print_stats(session: &Session) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      State: {}", stats.state);
    println!("      Turns: {}", stats.turn_count);
    println!("      Exchanges: {}", stats.exchanges);
    println!(
        "      Outcomes: {} completed, {} empty, {} stopped, {} timed out, {} failed",
        stats.completed, stats.empty, stats.cancelled, stats.timed_out, stats.errored
    );
    println!("      Bytes received: {}", stats.bytes_received);
    if stats.malformed_tails > 0 {
        println!("      Malformed stream tails: {}", stats.malformed_tails);
    }
}

fn print_config(session: &Session, endpoint: &str) {
    let stats = session.stats();
    let config = session.config();
    println!("    Current Configuration:");
    println!("      Endpoint: {endpoint}");
    println!("      History: {}", stats.history_policy);
    println!(
        "      Timeouts: {}s to first chunk, {}s between chunks",
        stats.timeouts.first_byte.as_secs(),
        stats.timeouts.between_chunks.as_secs()
    );
    println!("      Flush: every {} characters", stats.flush.min_chars);
    println!("      Color: {}", if config.use_color { "on" } else { "off" });
    match config.log_path {
        Some(ref path) => println!("      Session log: {}", path.display()),
        None => println!("      Session log: (disabled)"),
    }
}
