use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Who authored a turn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User role.
    User,

    /// Assistant role.
    Assistant,
}

/// How a turn ended up in the history.
///
/// User turns are always `Complete`.  Assistant turns start out `Pending` and move to one of
/// the other states exactly once, at which point the turn no longer changes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// The assistant is still producing this turn.
    Pending,

    /// The turn holds a real answer (or user input).
    Complete,

    /// The stream ended without producing any text; the content is only the placeholder.
    Empty,

    /// The user stopped generation; the content carries the stop annotation.
    Cancelled,

    /// No data arrived in time; the content carries the timeout annotation.
    TimedOut,

    /// The request failed; the content is the failure notice.
    Failed,
}

impl TurnStatus {
    /// Returns true once the turn can no longer change.
    pub fn is_final(self) -> bool {
        !matches!(self, TurnStatus::Pending)
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    /// The author of the turn.
    pub role: Role,

    /// The text of the turn.  For assistant turns this is Markdown.
    pub content: String,

    /// When the turn was created.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,

    /// Lifecycle status of the turn.
    pub status: TurnStatus,
}

impl Turn {
    /// Create a completed user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: OffsetDateTime::now_utc(),
            status: TurnStatus::Complete,
        }
    }

    /// Create an in-progress assistant turn showing `placeholder`.
    pub fn pending_assistant(placeholder: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: placeholder.into(),
            created_at: OffsetDateTime::now_utc(),
            status: TurnStatus::Pending,
        }
    }

    /// Returns true if this turn is still being streamed.
    pub fn is_pending(&self) -> bool {
        self.status == TurnStatus::Pending
    }

    /// Returns true if this turn should be offered to the model as context.
    ///
    /// Only user input and genuine assistant answers qualify; placeholders, annotations and
    /// failure notices never do.
    pub fn is_context(&self) -> bool {
        self.status == TurnStatus::Complete
    }
}
