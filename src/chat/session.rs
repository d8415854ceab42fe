//! Core chat session management.
//!
//! A [`ChatSession`] owns one conversation and drives the streaming state machine:
//!
//! ```text
//! Idle -> AwaitingFirstByte -> Streaming -> Completed -> Idle
//!               |                  |
//!               +------------------+--> Cancelled | TimedOut | Errored -> Idle
//! ```
//!
//! There are two ways to drive it.  [`ChatSession::send`] runs a whole exchange on the
//! current task.  The step methods ([`submit`](ChatSession::submit),
//! [`on_chunk`](ChatSession::on_chunk), [`on_end`](ChatSession::on_end),
//! [`on_error`](ChatSession::on_error), [`on_timeout`](ChatSession::on_timeout),
//! [`cancel`](ChatSession::cancel)) let a caller that owns its own event loop feed events
//! in one at a time.  Every step method takes the [`Exchange`] ticket returned by
//! `submit`, so events that belong to a finished request are ignored.

use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::chat::config::ChatConfig;
use crate::chat::policy::{FlushPolicy, HistoryPolicy, Notices, TimeoutPolicy};
use crate::client_logger::SessionLogger;
use crate::decoder::StreamDecoder;
use crate::error::{Error, Result};
use crate::observability::{
    EXCHANGE_CANCELLED, EXCHANGE_COMPLETED, EXCHANGE_DURATION, EXCHANGE_EMPTY, EXCHANGE_ERRORED,
    EXCHANGE_TIMED_OUT, SESSION_REJECTED_BUSY, SESSION_REJECTED_EMPTY, SESSION_STALE_EVENTS,
    SESSION_SUBMITS, STREAM_BYTES, STREAM_CHUNKS, STREAM_MALFORMED_TAILS, STREAM_TTFB,
};
use crate::render::Renderer;
use crate::transport::Transport;
use crate::types::{
    ChatRequest, ExchangeOutcome, HistoryEntry, Role, StreamState, TimeoutPhase, Turn,
};

//////////////////////////////////////////// History ///////////////////////////////////////////

/// The turns of one conversation, in submit order.
///
/// Turns alternate user, assistant, user, assistant.  Only the last turn can be pending,
/// and only a pending turn's content ever changes.
#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
    turns: Vec<Turn>,
}

impl ChatHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns true if no turn was recorded.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The most recent turn.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// The prior exchanges worth sending as context.
    ///
    /// An exchange is included only when its answer completed with text, so the result
    /// alternates user/assistant and never contains placeholders or failure notices.
    pub fn context(&self) -> Vec<HistoryEntry> {
        self.turns
            .chunks(2)
            .filter(|pair| {
                matches!(pair, [user, assistant]
                    if user.role == Role::User
                        && assistant.role == Role::Assistant
                        && assistant.is_context())
            })
            .flat_map(|pair| pair.iter().map(HistoryEntry::from))
            .collect()
    }

    fn begin(&mut self, user_text: &str, placeholder: &str) {
        self.turns.push(Turn::user(user_text));
        self.turns.push(Turn::pending_assistant(placeholder));
    }

    fn pending_mut(&mut self) -> Option<&mut Turn> {
        self.turns.last_mut().filter(|turn| turn.is_pending())
    }

    fn clear(&mut self) {
        self.turns.clear();
    }
}

///////////////////////////////////////// Cancellation /////////////////////////////////////////

/// A cloneable handle that stops whichever request a session currently has in flight.
///
/// Hand one to a Ctrl-C handler or a "stop" button.  Cancelling while nothing is in
/// flight does nothing.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    armed: Arc<Mutex<Option<CancellationToken>>>,
}

impl CancelHandle {
    /// Signals the in-flight request, if any.  Returns true if a request was signaled.
    pub fn cancel(&self) -> bool {
        let armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        match armed.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Returns true while a request is in flight.
    pub fn is_armed(&self) -> bool {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn arm(&self, token: CancellationToken) {
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn disarm(&self) {
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// The ticket for one accepted submit.
#[derive(Debug, Clone)]
pub struct Exchange {
    id: u64,
    request: ChatRequest,
    token: CancellationToken,
}

impl Exchange {
    /// Session-unique id of this exchange.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The request to hand to the transport.
    pub fn request(&self) -> &ChatRequest {
        &self.request
    }

    /// The token to hand to the transport.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

////////////////////////////////////////////// Stats ///////////////////////////////////////////

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    /// Current state of the session.
    pub state: StreamState,
    /// Number of turns in the conversation.
    pub turn_count: usize,
    /// Accepted submits since the session was created.
    pub exchanges: u64,
    /// Exchanges that completed with text.
    pub completed: u64,
    /// Exchanges that completed without text.
    pub empty: u64,
    /// Exchanges stopped by the user.
    pub cancelled: u64,
    /// Exchanges that hit an inactivity window.
    pub timed_out: u64,
    /// Exchanges that failed.
    pub errored: u64,
    /// Response bytes received.
    pub bytes_received: u64,
    /// Streams that ended inside a character.
    pub malformed_tails: u64,
    /// History sent with each request.
    pub history_policy: HistoryPolicy,
    /// Inactivity windows.
    pub timeouts: TimeoutPolicy,
    /// Render flush cadence.
    pub flush: FlushPolicy,
}

#[derive(Debug, Default)]
struct Tally {
    exchanges: u64,
    completed: u64,
    empty: u64,
    cancelled: u64,
    timed_out: u64,
    errored: u64,
    bytes_received: u64,
    malformed_tails: u64,
}

impl Tally {
    fn record(&mut self, outcome: &ExchangeOutcome) {
        match outcome {
            ExchangeOutcome::Completed => {
                self.completed += 1;
                EXCHANGE_COMPLETED.click();
            }
            ExchangeOutcome::Empty => {
                self.empty += 1;
                EXCHANGE_EMPTY.click();
            }
            ExchangeOutcome::Cancelled => {
                self.cancelled += 1;
                EXCHANGE_CANCELLED.click();
            }
            ExchangeOutcome::TimedOut(_) => {
                self.timed_out += 1;
                EXCHANGE_TIMED_OUT.click();
            }
            ExchangeOutcome::Errored(_) => {
                self.errored += 1;
                EXCHANGE_ERRORED.click();
            }
        }
    }
}

//////////////////////////////////////////// Session ///////////////////////////////////////////

struct InFlight {
    id: u64,
    token: CancellationToken,
    decoder: StreamDecoder,
    buffer: String,
    unflushed_chars: usize,
    received_bytes: bool,
    started: Instant,
}

enum Guard {
    Live,
    Cancelled,
    Stale,
}

enum Opened<B> {
    Body(B),
    Failed(Error),
    Cancelled,
    TimedOut,
}

enum Read<T> {
    Next(Option<Result<T>>),
    Cancelled,
    TimedOut,
}

/// A chat session that manages conversation state and streamed answers.
///
/// The session owns its transport and renderer.  Sessions share nothing, so any number
/// can coexist.
pub struct ChatSession<T: Transport, R: Renderer> {
    transport: T,
    renderer: R,
    config: ChatConfig,
    history: ChatHistory,
    state: StreamState,
    current: Option<InFlight>,
    next_id: u64,
    cancel_handle: CancelHandle,
    logger: Option<Arc<dyn SessionLogger>>,
    tally: Tally,
}

impl<T: Transport, R: Renderer> ChatSession<T, R> {
    /// Creates a new, idle chat session.
    pub fn new(transport: T, renderer: R, config: ChatConfig) -> Self {
        Self {
            transport,
            renderer,
            config,
            history: ChatHistory::new(),
            state: StreamState::Idle,
            current: None,
            next_id: 1,
            cancel_handle: CancelHandle::default(),
            logger: None,
            tally: Tally::default(),
        }
    }

    /// Attaches a logger that observes every exchange.
    pub fn with_logger(mut self, logger: Arc<dyn SessionLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Sends `text` and streams the answer to completion.
    ///
    /// This method:
    /// 1. Appends the user turn and a placeholder answer to history
    /// 2. Opens the request and reads the body chunk by chunk
    /// 3. Renders the growing answer after every chunk
    /// 4. Finalizes the answer when the body ends, the user cancels, a window expires,
    ///    or the transport fails
    ///
    /// Each suspension point races the transport against the request's cancellation
    /// token and the inactivity deadline.  Cancellation wins ties.
    ///
    /// # Errors
    ///
    /// Returns the rejection when `submit` refuses `text`.  Failures after the request
    /// was accepted are reported as [`ExchangeOutcome::Errored`] instead.
    pub async fn send(&mut self, text: &str) -> Result<ExchangeOutcome> {
        let exchange = self.submit(text)?;
        let timeouts = self.config.timeouts;
        let mut deadline = Instant::now() + timeouts.first_byte;

        let opened = tokio::select! {
            biased;
            _ = exchange.token.cancelled() => Opened::Cancelled,
            _ = sleep_until(deadline) => Opened::TimedOut,
            result = self.transport.send(&exchange.request, exchange.token.clone()) => {
                match result {
                    Ok(body) => Opened::Body(body),
                    Err(err) => Opened::Failed(err),
                }
            }
        };
        let mut body = match opened {
            Opened::Body(body) => body,
            Opened::Failed(err) => return settled(self.on_error(&exchange, err)),
            Opened::Cancelled => return settled(self.cancel()),
            Opened::TimedOut => return settled(self.on_timeout(&exchange)),
        };

        loop {
            let read = tokio::select! {
                biased;
                _ = exchange.token.cancelled() => Read::Cancelled,
                _ = sleep_until(deadline) => Read::TimedOut,
                next = body.next() => Read::Next(next),
            };
            match read {
                Read::Next(Some(Ok(bytes))) => {
                    if let Some(outcome) = self.on_chunk(&exchange, &bytes) {
                        return Ok(outcome);
                    }
                    deadline = Instant::now() + timeouts.window(self.timeout_phase());
                }
                Read::Next(Some(Err(err))) => return settled(self.on_error(&exchange, err)),
                Read::Next(None) => return settled(self.on_end(&exchange)),
                Read::Cancelled => return settled(self.cancel()),
                Read::TimedOut => return settled(self.on_timeout(&exchange)),
            }
        }
    }

    /// Starts an exchange for `text`.
    ///
    /// Appends the trimmed user turn and a pending answer showing the thinking notice,
    /// arms the cancel handle, and builds the request according to the history policy.
    ///
    /// # Errors
    ///
    /// Rejects blank input with [`Error::Validation`] and input that arrives while an
    /// answer is streaming with [`Error::Busy`].  A rejected submit changes nothing
    /// except showing the matching notice.
    pub fn submit(&mut self, text: &str) -> Result<Exchange> {
        if self.state.is_active() {
            SESSION_REJECTED_BUSY.click();
            let notice = self.config.notices.too_fast.clone();
            self.renderer.print_info(&notice);
            return Err(Error::busy(notice));
        }
        let text = text.trim();
        if text.is_empty() {
            SESSION_REJECTED_EMPTY.click();
            let notice = self.config.notices.empty_input.clone();
            self.renderer.print_info(&notice);
            return Err(Error::validation(notice, Some("text".to_string())));
        }

        let request = match self.config.history {
            HistoryPolicy::Full => ChatRequest::new(text).with_history(self.history.context()),
            HistoryPolicy::LatestOnly => ChatRequest::new(text),
        };
        let id = self.next_id;
        self.next_id += 1;
        let token = CancellationToken::new();

        self.history.begin(text, &self.config.notices.thinking);
        self.cancel_handle.arm(token.clone());
        self.current = Some(InFlight {
            id,
            token: token.clone(),
            decoder: StreamDecoder::new(),
            buffer: String::new(),
            unflushed_chars: 0,
            received_bytes: false,
            started: Instant::now(),
        });
        self.tally.exchanges += 1;
        SESSION_SUBMITS.click();

        self.transition(StreamState::AwaitingFirstByte);
        if let Some(logger) = &self.logger {
            logger.log_request(id, &request);
        }
        self.renderer.start_response(&self.config.notices.thinking);

        Ok(Exchange { id, request, token })
    }

    /// Feeds one chunk of the response body.
    ///
    /// Returns the outcome if the chunk found the request already cancelled through a
    /// [`CancelHandle`]; the chunk itself is discarded in that case.
    pub fn on_chunk(&mut self, exchange: &Exchange, bytes: &[u8]) -> Option<ExchangeOutcome> {
        match self.guard(exchange) {
            Guard::Stale => return None,
            Guard::Cancelled => return self.cancel(),
            Guard::Live => {}
        }
        STREAM_CHUNKS.click();
        STREAM_BYTES.count(bytes.len() as u64);
        self.tally.bytes_received += bytes.len() as u64;

        let flush = self.config.flush;
        let inflight = self.current.as_mut()?;
        if !inflight.received_bytes && !bytes.is_empty() {
            inflight.received_bytes = true;
            STREAM_TTFB.add(inflight.started.elapsed().as_secs_f64());
        }
        let text = inflight.decoder.feed(bytes);
        if text.is_empty() {
            return None;
        }
        inflight.buffer.push_str(&text);
        inflight.unflushed_chars += text.chars().count();
        let should_flush = flush.should_flush(inflight.unflushed_chars);
        if should_flush {
            inflight.unflushed_chars = 0;
        }
        let buffer = inflight.buffer.clone();

        if self.state == StreamState::AwaitingFirstByte {
            self.transition(StreamState::Streaming);
        }
        if let Some(turn) = self.history.pending_mut() {
            turn.content.clone_from(&buffer);
        }
        if let Some(logger) = &self.logger {
            logger.log_chunk(exchange.id, &text);
        }
        self.renderer.render(&buffer);
        if should_flush {
            self.renderer.flush();
        }
        None
    }

    /// Signals the end of the response body.
    ///
    /// A body that ends inside a character is reported but still completes; the
    /// leftover bytes become a replacement character.
    pub fn on_end(&mut self, exchange: &Exchange) -> Option<ExchangeOutcome> {
        match self.guard(exchange) {
            Guard::Stale => return None,
            Guard::Cancelled => return self.cancel(),
            Guard::Live => {}
        }
        let inflight = self.current.as_mut()?;
        if let Some(tail) = inflight.decoder.finish() {
            inflight.buffer.push_str(tail.text());
            STREAM_MALFORMED_TAILS.click();
            self.tally.malformed_tails += 1;
            if let Some(logger) = &self.logger {
                logger.log_malformed_tail(exchange.id, &tail);
            }
            let err = Error::from(tail);
            self.renderer.print_error(&err.to_string());
        }
        let outcome = match self.current.as_ref() {
            Some(inflight) if !inflight.buffer.trim().is_empty() => ExchangeOutcome::Completed,
            _ => ExchangeOutcome::Empty,
        };
        Some(self.finalize(outcome))
    }

    /// Reports a transport failure.
    ///
    /// [`Error::Abort`] finalizes as cancelled and [`Error::Timeout`] as timed out; every
    /// other error replaces the answer with the failure notice.
    pub fn on_error(&mut self, exchange: &Exchange, err: Error) -> Option<ExchangeOutcome> {
        match self.guard(exchange) {
            Guard::Stale => return None,
            Guard::Cancelled => return self.cancel(),
            Guard::Live => {}
        }
        match err {
            Error::Abort { .. } => self.cancel(),
            Error::Timeout { phase, .. } => {
                let phase = phase.unwrap_or_else(|| self.timeout_phase());
                Some(self.finalize(ExchangeOutcome::TimedOut(phase)))
            }
            err => Some(self.finalize(ExchangeOutcome::Errored(err))),
        }
    }

    /// Reports that the current inactivity window expired.
    ///
    /// Signals the request's token so the transport releases the connection.
    pub fn on_timeout(&mut self, exchange: &Exchange) -> Option<ExchangeOutcome> {
        match self.guard(exchange) {
            Guard::Stale => return None,
            Guard::Cancelled => return self.cancel(),
            Guard::Live => {}
        }
        exchange.token.cancel();
        let phase = self.timeout_phase();
        Some(self.finalize(ExchangeOutcome::TimedOut(phase)))
    }

    /// Stops the in-flight answer.
    ///
    /// Keeps whatever text arrived and appends the stopped notice.  Does nothing when
    /// idle, so calling it twice is the same as calling it once.
    pub fn cancel(&mut self) -> Option<ExchangeOutcome> {
        let inflight = self.current.as_ref()?;
        inflight.token.cancel();
        Some(self.finalize(ExchangeOutcome::Cancelled))
    }

    /// Stops any in-flight answer and forgets the conversation.
    pub fn new_session(&mut self) {
        self.cancel();
        self.history.clear();
    }

    /// The conversation so far.
    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// The current state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Returns true while an answer is in flight.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// A handle that cancels the in-flight request from another task or thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel_handle.clone()
    }

    /// The active configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The renderer.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// The renderer, for printing outside an exchange.
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Sets which prior turns accompany the next request.
    pub fn set_history_policy(&mut self, policy: HistoryPolicy) {
        self.config.history = policy;
    }

    /// Sets the inactivity windows for the next request.
    pub fn set_timeouts(&mut self, timeouts: TimeoutPolicy) {
        self.config.timeouts = timeouts;
    }

    /// Sets the render flush cadence.
    pub fn set_flush_policy(&mut self, flush: FlushPolicy) {
        self.config.flush = flush;
    }

    /// The user-visible notices.
    pub fn notices(&self) -> &Notices {
        &self.config.notices
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            state: self.state,
            turn_count: self.history.len(),
            exchanges: self.tally.exchanges,
            completed: self.tally.completed,
            empty: self.tally.empty,
            cancelled: self.tally.cancelled,
            timed_out: self.tally.timed_out,
            errored: self.tally.errored,
            bytes_received: self.tally.bytes_received,
            malformed_tails: self.tally.malformed_tails,
            history_policy: self.config.history,
            timeouts: self.config.timeouts,
            flush: self.config.flush,
        }
    }

    fn guard(&mut self, exchange: &Exchange) -> Guard {
        match &self.current {
            Some(inflight) if inflight.id == exchange.id && self.state.is_active() => {
                if inflight.token.is_cancelled() {
                    Guard::Cancelled
                } else {
                    Guard::Live
                }
            }
            _ => {
                SESSION_STALE_EVENTS.click();
                Guard::Stale
            }
        }
    }

    fn timeout_phase(&self) -> TimeoutPhase {
        match &self.current {
            Some(inflight) if inflight.received_bytes => TimeoutPhase::Stalled,
            _ => TimeoutPhase::FirstByte,
        }
    }

    fn transition(&mut self, to: StreamState) {
        let from = self.state;
        self.state = to;
        if let (Some(logger), Some(inflight)) = (&self.logger, &self.current) {
            logger.log_transition(inflight.id, from, to);
        }
    }

    fn finalize(&mut self, outcome: ExchangeOutcome) -> ExchangeOutcome {
        let notices = &self.config.notices;
        let buffer = self
            .current
            .as_ref()
            .map(|inflight| inflight.buffer.as_str())
            .unwrap_or_default();
        let content = match &outcome {
            ExchangeOutcome::Completed => buffer.to_string(),
            ExchangeOutcome::Empty => notices.thinking.clone(),
            ExchangeOutcome::Cancelled => annotate(buffer, &notices.stopped),
            ExchangeOutcome::TimedOut(phase) => annotate(buffer, notices.timeout(*phase)),
            ExchangeOutcome::Errored(_) => notices.failed.clone(),
        };
        if let ExchangeOutcome::Errored(err) = &outcome {
            self.renderer.print_error(&err.to_string());
        }

        if let Some(turn) = self.history.pending_mut() {
            turn.content.clone_from(&content);
            turn.status = outcome.turn_status();
        }
        self.renderer.render(&content);
        self.renderer.flush();
        self.renderer.finish_response();

        self.transition(outcome.state());
        if let Some(inflight) = &self.current {
            EXCHANGE_DURATION.add(inflight.started.elapsed().as_secs_f64());
            if let (Some(logger), Some(turn)) = (&self.logger, self.history.last()) {
                logger.log_outcome(inflight.id, &outcome, turn);
            }
        }
        self.transition(StreamState::Idle);
        self.tally.record(&outcome);
        self.cancel_handle.disarm();
        self.current = None;
        outcome
    }
}

fn annotate(partial: &str, notice: &str) -> String {
    if partial.is_empty() {
        notice.to_string()
    } else {
        format!("{partial}\n\n{notice}")
    }
}

fn settled(outcome: Option<ExchangeOutcome>) -> Result<ExchangeOutcome> {
    outcome.ok_or_else(|| Error::abort("exchange was superseded"))
}
