// Public modules
pub mod chat_request;
pub mod exchange_outcome;
pub mod stream_state;
pub mod turn;

// Re-exports
pub use chat_request::{ChatRequest, HistoryEntry};
pub use exchange_outcome::ExchangeOutcome;
pub use stream_state::{StreamState, TimeoutPhase};
pub use turn::{Role, Turn, TurnStatus};
