//! Chat endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::services::chat::MAX_CONVERSATIONS;
use crate::types::{ChatRequest, ChatResponse, ConversationResponse};

#[derive(Debug, Deserialize)]
pub struct ConversationParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

/// POST /chats - ask a question, grounded in stored documents
pub async fn chat(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    tracing::info!(
        "Chat from user {} (conversation: {:?})",
        current.user().id,
        request.conversation_id
    );
    state
        .chat()
        .process_chat(current.user(), request)
        .await
        .map(Json)
}

/// GET /chats/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<ConversationParams>,
) -> Result<Json<Vec<ConversationResponse>>> {
    if params.limit > MAX_CONVERSATIONS {
        return Err(Error::validation(format!(
            "limit must be at most {}",
            MAX_CONVERSATIONS
        )));
    }
    state
        .chat()
        .list_conversations(current.user(), params.limit, params.offset)
        .map(Json)
}

/// GET /chats/conversations/:id
pub async fn get_conversation(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<ConversationResponse>> {
    state.chat().get_conversation(id, current.user()).map(Json)
}
