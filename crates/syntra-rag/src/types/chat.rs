//! Conversations, messages and their document references

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message author
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Bot,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Bot => "bot",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "bot" => ChatRole::Bot,
            _ => ChatRole::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Chat {
    pub id: i64,
    pub conversation_id: i64,
    pub role: ChatRole,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Stored reference from a bot message to a chunk
#[derive(Debug, Clone)]
pub struct ChatReference {
    pub id: i64,
    pub chat_id: i64,
    pub document_id: i64,
    pub chunk_id: i64,
    pub relevance_score: f32,
    pub quote: String,
    pub page_number: Option<i64>,
}

/// Reference to insert
#[derive(Debug, Clone)]
pub struct NewChatReference {
    pub document_id: i64,
    pub chunk_id: i64,
    pub relevance_score: f32,
    pub quote: String,
    pub page_number: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReferenceResponse {
    pub id: i64,
    pub document_id: i64,
    pub chunk_id: i64,
    pub relevance_score: f32,
    pub quote: String,
    pub page_number: Option<i64>,
    pub document_title: String,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: i64,
    pub conversation_id: i64,
    pub role: ChatRole,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub references: Vec<ChatReferenceResponse>,
}

impl ChatResponse {
    pub fn new(chat: Chat, references: Vec<ChatReferenceResponse>) -> Self {
        Self {
            id: chat.id,
            conversation_id: chat.conversation_id,
            role: chat.role,
            message: chat.message,
            created_at: chat.created_at,
            references,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub id: i64,
    pub title: String,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub chats: Vec<ChatResponse>,
}

impl ConversationResponse {
    pub fn new(conversation: Conversation, chats: Vec<ChatResponse>) -> Self {
        Self {
            id: conversation.id,
            title: conversation.title,
            is_pinned: conversation.is_pinned,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            chats,
        }
    }
}
