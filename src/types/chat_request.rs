use serde::{Deserialize, Serialize};

use crate::types::{Role, Turn};

/// A prior turn sent along with a request as conversational context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// The author of the turn.
    pub role: Role,

    /// The text of the turn.
    pub content: String,
}

impl From<&Turn> for HistoryEntry {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

/// The JSON body POSTed to the chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The message the user just submitted.
    pub user_message: String,

    /// Prior turns, oldest first.  Omitted when the session only sends the latest message.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub history: Option<Vec<HistoryEntry>>,
}

impl ChatRequest {
    /// Create a request carrying only the latest message.
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            history: None,
        }
    }

    /// Attach prior turns to the request.
    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = Some(history);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn latest_only_request_omits_history() {
        let request = ChatRequest::new("学校图书馆几点关门？");
        let json = to_value(&request).unwrap();
        assert_eq!(json, json!({"userMessage": "学校图书馆几点关门？"}));
    }

    #[test]
    fn request_with_history() {
        let request = ChatRequest::new("and tomorrow?").with_history(vec![
            HistoryEntry::from(&Turn::user("hours today?")),
            HistoryEntry {
                role: Role::Assistant,
                content: "9 to 5".to_string(),
            },
        ]);

        let json = to_value(&request).unwrap();
        assert_eq!(
            json,
            json!({
                "userMessage": "and tomorrow?",
                "history": [
                    {"role": "user", "content": "hours today?"},
                    {"role": "assistant", "content": "9 to 5"}
                ]
            })
        );
    }

    #[test]
    fn request_deserialization_without_history() {
        let request: ChatRequest =
            serde_json::from_value(json!({"userMessage": "hello"})).unwrap();
        assert_eq!(request, ChatRequest::new("hello"));
    }
}
