//! Chat conversation aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One turn in a conversation. Assistant turns carry the chunk ids that
/// grounded the answer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: MessageRole::User,
            content: content.to_string(),
            timestamp: Utc::now(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(content: &str, sources: Vec<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.to_string(),
            timestamp: Utc::now(),
            sources,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When set, retrieval is filtered to this edital's chunks
    #[serde(default)]
    pub edital_uuid: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn create(user_id: &str, edital_uuid: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: "Nova Conversa".to_string(),
            created_at: now,
            updated_at: now,
            edital_uuid,
            messages: Vec::new(),
        }
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Most recent `limit` messages in chronological order
    pub fn history(&self, limit: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }

    /// Title from the first user message, truncated at 50 chars
    pub fn generate_title(&self) -> String {
        let first_user = self
            .messages
            .iter()
            .find(|m| m.role == MessageRole::User);

        match first_user {
            Some(msg) => {
                let content = msg.content.trim();
                if content.chars().count() > 50 {
                    let cut: String = content.chars().take(50).collect();
                    format!("{}...", cut)
                } else {
                    content.to_string()
                }
            }
            None => "Nova Conversa".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_conversation_is_empty() {
        let conv = Conversation::create("pesquisador@ufpb.br", None);
        assert_eq!(conv.title, "Nova Conversa");
        assert!(conv.messages.is_empty());
        assert!(conv.edital_uuid.is_none());
    }

    #[test]
    fn test_title_truncates_at_50_chars() {
        let mut conv = Conversation::create("user@example.com", None);
        let long = "Quais são os requisitos de elegibilidade para empresas de base tecnológica?";
        conv.add_message(ChatMessage::user(long));

        let title = conv.generate_title();
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), 53);
    }

    #[test]
    fn test_title_short_message_unchanged() {
        let mut conv = Conversation::create("user@example.com", None);
        conv.add_message(ChatMessage::user("prazo"));
        assert_eq!(conv.generate_title(), "prazo");
    }

    #[test]
    fn test_history_limit() {
        let mut conv = Conversation::create("user@example.com", None);
        for i in 0..15 {
            conv.add_message(ChatMessage::user(&format!("pergunta {i}")));
        }
        let recent = conv.history(10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "pergunta 5");
    }

    #[test]
    fn test_assistant_message_carries_sources() {
        let msg = ChatMessage::assistant(
            "O prazo é 30/12/2025.",
            vec!["abc_chunk_1".into(), "abc_chunk_5".into()],
        );
        assert_eq!(msg.sources.len(), 2);
        assert_eq!(msg.role, MessageRole::Assistant);
    }
}
