// src/models/chat.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry of the conversation, in the wire shape the chat completion
/// endpoint expects.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// In-memory conversation history for a single WebSocket connection.
///
/// Starts from the system prompt alone and grows by one user and one
/// assistant entry per exchange. Dropped with the connection, so a
/// reconnect always starts fresh.
#[derive(Debug)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            turns: vec![ChatTurn {
                role: Role::System,
                content: system_prompt.to_string(),
            }],
        }
    }

    pub fn push_user(&mut self, content: String) {
        self.turns.push(ChatTurn {
            role: Role::User,
            content,
        });
    }

    pub fn push_assistant(&mut self, content: String) {
        self.turns.push(ChatTurn {
            role: Role::Assistant,
            content,
        });
    }

    pub fn entries(&self) -> &[ChatTurn] {
        &self.turns
    }
}

#[derive(Debug, Serialize, FromRow)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pdf_id: Option<Uuid>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_opens_with_the_system_prompt() {
        let transcript = Transcript::new("You are a helpful assistant.");

        assert_eq!(transcript.entries().len(), 1);
        assert_eq!(transcript.entries()[0].role, Role::System);
        assert_eq!(
            transcript.entries()[0].content,
            "You are a helpful assistant."
        );
    }

    #[test]
    fn test_transcript_grows_by_two_entries_per_exchange() {
        let mut transcript = Transcript::new("system");

        for i in 0..3 {
            transcript.push_user(format!("question {}", i));
            transcript.push_assistant(format!("answer {}", i));
        }

        // 1 system entry plus a user/assistant pair for each exchange
        assert_eq!(transcript.entries().len(), 7);
    }

    #[test]
    fn test_transcript_keeps_turns_in_order() {
        let mut transcript = Transcript::new("system");
        transcript.push_user("first".to_string());
        transcript.push_assistant("second".to_string());
        transcript.push_user("third".to_string());

        let roles: Vec<Role> = transcript.entries().iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );

        let contents: Vec<&str> = transcript
            .entries()
            .iter()
            .map(|t| t.content.as_str())
            .collect();
        assert_eq!(contents, vec!["system", "first", "second", "third"]);
    }

    #[test]
    fn test_roles_serialize_lowercase() {
        let turn = ChatTurn {
            role: Role::Assistant,
            content: "hello".to_string(),
        };
        let value = serde_json::to_value(&turn).unwrap();

        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"], "hello");
    }

    #[test]
    fn test_each_transcript_starts_fresh() {
        let mut first = Transcript::new("system");
        first.push_user("carried over?".to_string());

        let second = Transcript::new("system");
        assert_eq!(second.entries().len(), 1);
    }
}
