//! RAG chat: retrieval over stored chunks, answer generation and references

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::retrieval::{rank_chunks, ScoredChunk};
use crate::storage::Database;
use crate::types::{
    ChatRequest, ChatResponse, ChatRole, Conversation, ConversationResponse, DocumentChunk,
    NewChatReference, User,
};

/// Chunks retrieved per question
pub const TOP_K: usize = 5;

/// Answer stored when generation fails
pub const FALLBACK_ANSWER: &str =
    "I apologize, but I encountered an error processing your request.";

/// Characters of a chunk kept as the reference quote
const QUOTE_CHARS: usize = 200;

/// Words of the first message used as conversation title
const TITLE_WORDS: usize = 5;

/// Maximum conversations per listing page
pub const MAX_CONVERSATIONS: i64 = 100;

pub struct ChatService {
    db: Arc<Database>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
}

impl ChatService {
    pub fn new(
        db: Arc<Database>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        Self { db, embedder, llm }
    }

    /// Answer a message inside a new or existing conversation
    pub async fn process_chat(&self, user: &User, request: ChatRequest) -> Result<ChatResponse> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(Error::validation("Message cannot be empty"));
        }

        let conversation = match request.conversation_id {
            Some(id) => self
                .db
                .get_conversation(id, user.id)?
                .ok_or_else(|| Error::not_found("Conversation not found"))?,
            None => self
                .db
                .create_conversation(user.id, &conversation_title(message))?,
        };

        self.db.insert_chat(conversation.id, ChatRole::User, message)?;

        let retrieved = self.retrieve(message, user.is_admin()).await?;
        tracing::debug!(
            "Conversation {}: {} chunks retrieved",
            conversation.id,
            retrieved.len()
        );

        let contexts: Vec<&str> = retrieved.iter().map(|(c, _)| c.content.as_str()).collect();
        let prompt = PromptBuilder::build_chat_prompt(&contexts, message);

        let answer = match self.llm.generate(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!("Chat generation failed ({}): {}", self.llm.name(), e);
                FALLBACK_ANSWER.to_string()
            }
        };

        let bot_chat = self.db.insert_chat(conversation.id, ChatRole::Bot, &answer)?;

        for (chunk, score) in &retrieved {
            self.db.insert_reference(
                bot_chat.id,
                &NewChatReference {
                    document_id: chunk.document_id,
                    chunk_id: chunk.id,
                    relevance_score: score.similarity,
                    quote: chunk.content.chars().take(QUOTE_CHARS).collect(),
                    page_number: chunk.page_number,
                },
            )?;
        }

        self.db.touch_conversation(conversation.id)?;

        let references = self.db.references_for_chat(bot_chat.id)?;
        Ok(ChatResponse::new(bot_chat, references))
    }

    /// Top chunks for the message with their scores, best first
    async fn retrieve(
        &self,
        message: &str,
        include_private: bool,
    ) -> Result<Vec<(DocumentChunk, ScoredChunk)>> {
        let query = match self.embedder.embed(message).await {
            Ok(Some(query)) => query,
            Ok(None) => return Ok(Vec::new()),
            Err(e) => {
                tracing::warn!("Query embedding failed, answering without context: {}", e);
                return Ok(Vec::new());
            }
        };

        let vectors = self.db.chunk_vectors(include_private)?;
        let ranked = rank_chunks(&query, &vectors, TOP_K);
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = ranked.iter().map(|s| s.chunk_id).collect();
        let mut chunks: HashMap<i64, DocumentChunk> = self
            .db
            .get_chunks(&ids)?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        Ok(ranked
            .into_iter()
            .filter_map(|score| chunks.remove(&score.chunk_id).map(|c| (c, score)))
            .collect())
    }

    /// A user's conversations with their messages, most recent first
    pub fn list_conversations(
        &self,
        user: &User,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ConversationResponse>> {
        let limit = limit.clamp(1, MAX_CONVERSATIONS);
        let offset = offset.max(0);

        self.db
            .list_conversations(user.id, limit, offset)?
            .into_iter()
            .map(|c| self.with_chats(c))
            .collect()
    }

    pub fn get_conversation(&self, id: i64, user: &User) -> Result<ConversationResponse> {
        let conversation = self
            .db
            .get_conversation(id, user.id)?
            .ok_or_else(|| Error::not_found("Conversation not found"))?;
        self.with_chats(conversation)
    }

    fn with_chats(&self, conversation: Conversation) -> Result<ConversationResponse> {
        let chats = self.db.chats_for_conversation(conversation.id)?;
        Ok(ConversationResponse::new(conversation, chats))
    }
}

fn conversation_title(message: &str) -> String {
    message
        .split_whitespace()
        .take(TITLE_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkType, DocumentType, NewChunk, ProcessingStatus, UserRole};
    use async_trait::async_trait;

    /// Maps text onto a 2-d vector: "soil" words point one way, the rest the other
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
            if text.to_lowercase().contains("soil") {
                Ok(Some(vec![1.0, 0.1]))
            } else {
                Ok(Some(vec![0.1, 1.0]))
            }
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    struct EchoLlm {
        fail: bool,
    }

    #[async_trait]
    impl LlmProvider for EchoLlm {
        async fn generate(&self, prompt: &str) -> Result<String> {
            if self.fail {
                return Err(Error::llm("offline"));
            }
            Ok(format!("answer over {} chars", prompt.len()))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(!self.fail)
        }

        fn name(&self) -> &str {
            "echo"
        }

        fn model(&self) -> &str {
            "echo-1"
        }
    }

    fn setup(fail_llm: bool) -> (Arc<Database>, ChatService, User, User) {
        let db = Arc::new(Database::in_memory().unwrap());
        let admin = db.create_user("admin@example.org", "admin", "hash", UserRole::Admin).unwrap();
        let user = db.create_user("reader@example.org", "reader", "hash", UserRole::User).unwrap();

        let public = db
            .insert_document("Soil study", DocumentType::Journal, false, ProcessingStatus::Completed)
            .unwrap();
        let private = db
            .insert_document("Private soil", DocumentType::Report, true, ProcessingStatus::Completed)
            .unwrap();

        let soil_chunk = |content: &str| NewChunk {
            content: content.to_string(),
            token_count: 4,
            embedding: Some(vec![1.0, 0.1]),
            chunk_metadata: serde_json::json!({}),
            page_number: Some(2),
            chunk_type: ChunkType::Paragraph,
            ..Default::default()
        };
        db.replace_chunks(public.id, &[soil_chunk("Soil moisture drives yield.")]).unwrap();
        db.replace_chunks(private.id, &[soil_chunk("Confidential soil samples.")]).unwrap();

        let service = ChatService::new(
            Arc::clone(&db),
            Arc::new(KeywordEmbedder),
            Arc::new(EchoLlm { fail: fail_llm }),
        );
        (db, service, admin, user)
    }

    fn request(message: &str, conversation_id: Option<i64>) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            conversation_id,
        }
    }

    #[tokio::test]
    async fn test_new_conversation_with_references() {
        let (db, service, admin, _) = setup(false);
        let response = service
            .process_chat(&admin, request("What does soil moisture change in crops?", None))
            .await
            .unwrap();

        assert_eq!(response.role, ChatRole::Bot);
        assert!(response.message.starts_with("answer over"));
        assert_eq!(response.references.len(), 2);
        assert!(response.references.iter().all(|r| r.page_number == Some(2)));
        assert!(response.references[0].relevance_score > 0.99);

        let conversation = db.get_conversation(response.conversation_id, admin.id).unwrap().unwrap();
        assert_eq!(conversation.title, "What does soil moisture change");
    }

    #[tokio::test]
    async fn test_private_chunks_hidden_from_users() {
        let (_, service, _, user) = setup(false);
        let response = service
            .process_chat(&user, request("soil question", None))
            .await
            .unwrap();

        assert_eq!(response.references.len(), 1);
        assert_eq!(response.references[0].document_title, "Soil study");
    }

    #[tokio::test]
    async fn test_llm_failure_uses_fallback() {
        let (_, service, _, user) = setup(true);
        let response = service
            .process_chat(&user, request("soil question", None))
            .await
            .unwrap();
        assert_eq!(response.message, FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_foreign_conversation_is_not_found() {
        let (_, service, admin, user) = setup(false);
        let first = service
            .process_chat(&admin, request("soil question", None))
            .await
            .unwrap();

        let err = service
            .process_chat(&user, request("follow up", Some(first.conversation_id)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_history_includes_both_messages() {
        let (_, service, _, user) = setup(false);
        let response = service
            .process_chat(&user, request("soil question", None))
            .await
            .unwrap();

        let conversation = service.get_conversation(response.conversation_id, &user).unwrap();
        assert_eq!(conversation.chats.len(), 2);
        assert_eq!(conversation.chats[0].role, ChatRole::User);
        assert_eq!(conversation.chats[1].references.len(), 1);

        let listed = service.list_conversations(&user, 500, 0).unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_conversation_title_first_words() {
        assert_eq!(conversation_title("one two three four five six"), "one two three four five");
        assert_eq!(conversation_title("  short  "), "short");
    }
}
