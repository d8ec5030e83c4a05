//! RAG send-message path and conversation management

use crate::context::{build_context, system_prompt};
use crate::expansion::expand_query;
use chrono::{DateTime, Utc};
use fomentos_common::config::ChatConfig;
use fomentos_common::db::models::{ChatMessage, Conversation, MessageRole};
use fomentos_common::db::Repository;
use fomentos_common::errors::{AppError, Result};
use fomentos_common::llm::{ChatCompletions, LlmMessage};
use fomentos_common::vector::{ScoredChunk, VectorService};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Returned by the send-message path
#[derive(Clone, Debug, Serialize)]
pub struct SendMessageResult {
    pub conversation_id: String,
    pub message: String,
    pub sources: Vec<String>,
    pub chunks_used: usize,
    pub timestamp: DateTime<Utc>,
}

/// Shown when retrieval or generation breaks; the HTTP request still
/// succeeds
const FALLBACK_ANSWER: &str =
    "Desculpe, ocorreu um erro ao processar sua pergunta. Por favor, tente novamente.";

/// Over-fetch multiplier to compensate for post-filtering
const RETRIEVAL_OVERSAMPLE: usize = 4;

/// Conversation turns carried into generation
const HISTORY_LIMIT: usize = 10;

pub struct ChatEngine {
    chat: Arc<ChatCompletions>,
    vector: Arc<VectorService>,
    repo: Repository,
    config: ChatConfig,
}

impl ChatEngine {
    pub fn new(
        chat: Arc<ChatCompletions>,
        vector: Arc<VectorService>,
        repo: Repository,
        config: ChatConfig,
    ) -> Self {
        Self {
            chat,
            vector,
            repo,
            config,
        }
    }

    /// Create an empty conversation titled "Nova Conversa"
    pub async fn create_conversation(
        &self,
        user_id: &str,
        edital_uuid: Option<String>,
    ) -> Result<Conversation> {
        let conversation = Conversation::create(user_id, edital_uuid);
        self.repo.create_conversation(&conversation).await?;
        info!(conversation_id = %conversation.id, user_id, "Conversation created");
        Ok(conversation)
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Conversation> {
        self.repo
            .find_conversation(id)
            .await?
            .ok_or_else(|| AppError::ConversationNotFound { id: id.to_string() })
    }

    pub async fn list_conversations(
        &self,
        user_id: &str,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<Conversation>> {
        self.repo.list_conversations(user_id, skip, limit).await
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<bool> {
        self.repo.delete_conversation(id).await
    }

    /// Answer one user message with retrieval-grounded generation and
    /// persist both turns.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        user_message: &str,
        edital_uuid: Option<&str>,
    ) -> Result<SendMessageResult> {
        let mut conversation = self.get_conversation(conversation_id).await?;

        let expanded = expand_query(user_message);
        info!(
            conversation_id,
            original = user_message,
            expanded = %expanded,
            "Query expansion"
        );

        // Explicit filter wins over the conversation-level one
        let filter = edital_uuid
            .map(String::from)
            .or_else(|| conversation.edital_uuid.clone());

        // Over-fetch, then keep only chunks under the distance threshold.
        // Negative distances (near-perfect matches) always survive.
        let retrieved = match self
            .vector
            .search(
                &expanded,
                self.config.top_k_chunks * RETRIEVAL_OVERSAMPLE,
                filter.as_deref(),
            )
            .await
        {
            Ok(chunks) => Some(chunks),
            Err(e) => {
                warn!(conversation_id, error = %e, "Retrieval failed");
                None
            }
        };

        let (answer, sources, chunks_used) = match retrieved {
            Some(chunks) => {
                let filtered = apply_distance_filter(
                    chunks,
                    self.config.distance_threshold,
                    self.config.top_k_chunks,
                );
                let sources: Vec<String> = filtered.iter().map(|c| c.id.clone()).collect();
                let context = build_context(&filtered, self.config.max_context_length);

                let history: Vec<ChatMessage> =
                    conversation.history(HISTORY_LIMIT).to_vec();

                match self.generate(&context, &history, user_message).await {
                    Ok(answer) => {
                        let used = filtered.len();
                        (answer, sources, used)
                    }
                    Err(e) => {
                        warn!(conversation_id, error = %e, "Generation failed");
                        (FALLBACK_ANSWER.to_string(), sources, filtered.len())
                    }
                }
            }
            None => (FALLBACK_ANSWER.to_string(), Vec::new(), 0),
        };

        conversation.add_message(ChatMessage::user(user_message));
        let assistant = ChatMessage::assistant(&answer, sources.clone());
        let timestamp = assistant.timestamp;
        conversation.add_message(assistant);

        // First full exchange names the conversation
        if conversation.messages.len() == 2 {
            conversation.title = conversation.generate_title();
        }

        self.repo.update_conversation(&conversation).await?;
        metrics::counter!("fomentos_chat_messages_total").increment(1);
        info!(conversation_id, chunks_used, "Answer generated");

        Ok(SendMessageResult {
            conversation_id: conversation_id.to_string(),
            message: answer,
            sources,
            chunks_used,
            timestamp,
        })
    }

    async fn generate(
        &self,
        context: &str,
        history: &[ChatMessage],
        user_message: &str,
    ) -> Result<String> {
        let mut messages = vec![LlmMessage::system(system_prompt(context))];

        for turn in history {
            match turn.role {
                MessageRole::User => messages.push(LlmMessage::user(turn.content.clone())),
                MessageRole::Assistant => {
                    messages.push(LlmMessage::assistant(turn.content.clone()))
                }
            }
        }

        messages.push(LlmMessage::user(user_message));

        self.chat
            .complete(&messages, self.config.temperature, Some(2000))
            .await
    }
}

/// Keep chunks strictly under the distance threshold, then cap at top-k.
/// Negative distances always pass.
fn apply_distance_filter(
    chunks: Vec<ScoredChunk>,
    threshold: f32,
    top_k: usize,
) -> Vec<ScoredChunk> {
    let mut filtered: Vec<ScoredChunk> = chunks
        .into_iter()
        .filter(|chunk| {
            if chunk.distance < threshold {
                true
            } else {
                warn!(
                    chunk_id = %chunk.id,
                    distance = chunk.distance,
                    threshold,
                    "Chunk discarded by distance threshold"
                );
                false
            }
        })
        .collect();

    filtered.truncate(top_k);
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn chunk(id: &str, distance: f32) -> ScoredChunk {
        ScoredChunk {
            id: id.into(),
            text: "trecho".into(),
            metadata: Map::new(),
            distance,
        }
    }

    #[test]
    fn test_threshold_keeps_negative_distances() {
        let chunks = vec![
            chunk("a_chunk_1", -0.2),
            chunk("a_chunk_2", 0.4),
            chunk("a_chunk_3", 1.5),
            chunk("a_chunk_4", 2.1),
        ];
        let kept = apply_distance_filter(chunks, 1.5, 5);
        let ids: Vec<&str> = kept.iter().map(|c| c.id.as_str()).collect();
        // 1.5 is not < 1.5; the negative match is the strongest
        assert_eq!(ids, vec!["a_chunk_1", "a_chunk_2"]);
    }

    #[test]
    fn test_top_k_cap_after_filtering() {
        let chunks: Vec<ScoredChunk> = (0..20)
            .map(|i| chunk(&format!("e_chunk_{i}"), 0.1 * i as f32))
            .collect();
        let kept = apply_distance_filter(chunks, 1.5, 5);
        assert_eq!(kept.len(), 5);
    }
}
