//! RAG chat handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use fomentos_chat::SendMessageResult;
use fomentos_common::db::models::{ChatMessage, Conversation, MessageRole};
use fomentos_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{AuthUser, Pagination};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub edital_uuid: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
    #[serde(default)]
    pub edital_uuid: Option<String>,
}

#[derive(Serialize)]
pub struct ChatMessageResponse {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sources: Vec<String>,
}

impl From<&ChatMessage> for ChatMessageResponse {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: match msg.role {
                MessageRole::User => "user".to_string(),
                MessageRole::Assistant => "assistant".to_string(),
            },
            content: msg.content.clone(),
            timestamp: msg.timestamp,
            sources: msg.sources.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct ConversationResponse {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edital_uuid: Option<String>,
    pub messages: Vec<ChatMessageResponse>,
}

impl From<&Conversation> for ConversationResponse {
    fn from(conv: &Conversation) -> Self {
        Self {
            id: conv.id.clone(),
            user_id: conv.user_id.clone(),
            title: conv.title.clone(),
            created_at: conv.created_at,
            updated_at: conv.updated_at,
            edital_uuid: conv.edital_uuid.clone(),
            messages: conv.messages.iter().map(ChatMessageResponse::from).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationResponse>,
    pub total: usize,
}

/// A caller may only touch their own conversations
fn check_owner(conversation: &Conversation, auth: &AuthUser) -> Result<()> {
    if conversation.user_id != auth.email {
        return Err(AppError::AccessDenied {
            message: "conversation belongs to another user".to_string(),
        });
    }
    Ok(())
}

/// Create an empty conversation
pub async fn create_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>)> {
    let conversation = state
        .chat
        .create_conversation(&auth.email, request.edital_uuid)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ConversationResponse::from(&conversation)),
    ))
}

/// Send a message and receive the RAG-grounded answer
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResult>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
    })?;

    let conversation = state.chat.get_conversation(&id).await?;
    check_owner(&conversation, &auth)?;

    let result = state
        .chat
        .send_message(&id, &request.message, request.edital_uuid.as_deref())
        .await?;

    Ok(Json(result))
}

/// One conversation with full history
pub async fn get_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>> {
    let conversation = state.chat.get_conversation(&id).await?;
    check_owner(&conversation, &auth)?;
    Ok(Json(ConversationResponse::from(&conversation)))
}

/// The caller's conversations, most recently active first
pub async fn list_conversations(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<ConversationListResponse>> {
    let conversations = state
        .chat
        .list_conversations(&auth.email, pagination.skip, pagination.limit)
        .await?;

    let conversations: Vec<ConversationResponse> =
        conversations.iter().map(ConversationResponse::from).collect();

    Ok(Json(ConversationListResponse {
        total: conversations.len(),
        conversations,
    }))
}

#[derive(Serialize)]
pub struct DeleteConversationResponse {
    pub deleted: bool,
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DeleteConversationResponse>> {
    let conversation = state.chat.get_conversation(&id).await?;
    check_owner(&conversation, &auth)?;

    let deleted = state.chat.delete_conversation(&id).await?;
    Ok(Json(DeleteConversationResponse { deleted }))
}
