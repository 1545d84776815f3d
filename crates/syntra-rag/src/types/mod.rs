//! Core types for the journal backend

pub mod auth;
pub mod chat;
pub mod chunk;
pub mod document;
pub mod user;

pub use auth::{Claims, LoginForm, RefreshTokenRequest, Token, TokenType};
pub use chat::{
    Chat, ChatReference, ChatReferenceResponse, ChatRequest, ChatResponse, ChatRole,
    Conversation, ConversationResponse, NewChatReference,
};
pub use chunk::{ChunkType, ChunkVectors, DocumentChunk, NewChunk};
pub use document::{
    Document, DocumentListItem, DocumentListResponse, DocumentResponse, DocumentType,
    DocumentUpdate, ExtractedMetadata, ListFilter, ProcessingStatus,
};
pub use user::{User, UserCreate, UserResponse, UserRole};
