//! SQLite persistence for users, documents, chunks and conversations
//!
//! One connection behind a mutex; WAL mode and foreign keys are enabled at open.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::retrieval::{decode_vector, encode_vector};
use crate::types::{
    Chat, ChatReference, ChatReferenceResponse, ChatResponse, ChatRole, ChunkType, ChunkVectors,
    Conversation, Document, DocumentChunk, DocumentType, DocumentUpdate, ExtractedMetadata,
    ListFilter, NewChatReference, NewChunk, ProcessingStatus, User, UserRole,
};

const USER_COLUMNS: &str =
    "id, email, username, password, role, is_active, created_at, updated_at";

const DOCUMENT_COLUMNS: &str = "id, title, creator, keywords, description, publisher, \
     contributor, publication_date, type, format, identifier, source, language, relation, \
     coverage, rights, doi, abstract, citation_count, file_path, processing_status, \
     processing_error, is_private, is_metadata_complete, created_at, updated_at";

const CHUNK_COLUMNS: &str = "id, document_id, chunk_index, content, token_count, embedding, \
     possibly_questions, possibly_question_embedding, chunk_metadata, page_number, \
     section_title, chunk_type";

const CONVERSATION_COLUMNS: &str = "id, user_id, title, is_pinned, created_at, updated_at";

/// SQLite database handle
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (tests and ephemeral runs)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Internal(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::Internal(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                creator TEXT,
                keywords TEXT,
                description TEXT,
                publisher TEXT,
                contributor TEXT,
                publication_date TEXT,
                type TEXT NOT NULL DEFAULT 'journal',
                format TEXT,
                identifier TEXT,
                source TEXT,
                language TEXT,
                relation TEXT,
                coverage TEXT,
                rights TEXT,
                doi TEXT UNIQUE,
                abstract TEXT,
                citation_count INTEGER NOT NULL DEFAULT 0,
                file_path TEXT,
                processing_status TEXT NOT NULL DEFAULT 'completed',
                processing_error TEXT,
                is_private INTEGER NOT NULL DEFAULT 0,
                is_metadata_complete INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_title ON documents(title);
            CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(processing_status);
            CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at);

            CREATE TABLE IF NOT EXISTS document_chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                token_count INTEGER NOT NULL DEFAULT 0,
                embedding BLOB,
                possibly_questions TEXT,
                possibly_question_embedding BLOB,
                chunk_metadata TEXT,
                page_number INTEGER,
                section_title TEXT,
                chunk_type TEXT NOT NULL DEFAULT 'paragraph',
                created_at TEXT NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON document_chunks(document_id);

            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                is_pinned INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, updated_at);

            CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_chats_conversation ON chats(conversation_id);

            CREATE TABLE IF NOT EXISTS chat_references (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                document_id INTEGER NOT NULL,
                chunk_id INTEGER NOT NULL,
                relevance_score REAL NOT NULL,
                quote TEXT NOT NULL,
                page_number INTEGER,
                FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
                FOREIGN KEY (chunk_id) REFERENCES document_chunks(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_chat_references_chat ON chat_references(chat_id);
        "#,
        )
        .map_err(|e| Error::Internal(format!("Failed to run migrations: {}", e)))?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    /// Cheap connectivity check for `/health`
    pub fn ping(&self) -> bool {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    // ==================== Users ====================

    /// Insert a user
    ///
    /// A duplicate email or username becomes a conflict, so a registration
    /// racing past the caller's checks still gets a client error.
    pub fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User> {
        let conn = self.conn.lock();
        let now = now_string();

        conn.execute(
            "INSERT INTO users (email, username, password, role, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            params![email, username, password_hash, role.as_str(), now],
        )
        .map_err(user_conflict)?;

        let id = conn.last_insert_rowid();
        let user = conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            row_to_user,
        )?;
        Ok(user)
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        self.query_user("id = ?1", Value::Integer(id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.query_user("email = ?1", Value::Text(email.to_string()))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.query_user("username = ?1", Value::Text(username.to_string()))
    }

    fn query_user(&self, predicate: &str, value: Value) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, predicate),
                params![value],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Change a user's role
    pub fn set_user_role(&self, id: i64, role: UserRole) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn.execute(
            "UPDATE users SET role = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, role.as_str(), now_string()],
        )?;
        Ok(count > 0)
    }

    // ==================== Documents ====================

    /// Insert a freshly uploaded document
    pub fn insert_document(
        &self,
        title: &str,
        doc_type: DocumentType,
        is_private: bool,
        status: ProcessingStatus,
    ) -> Result<Document> {
        let conn = self.conn.lock();
        let now = now_string();

        conn.execute(
            "INSERT INTO documents (title, type, format, is_private, processing_status, created_at, updated_at)
             VALUES (?1, ?2, 'application/pdf', ?3, ?4, ?5, ?5)",
            params![title, doc_type.as_str(), is_private, status.as_str(), now],
        )?;

        let id = conn.last_insert_rowid();
        let doc = conn.query_row(
            &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
            params![id],
            row_to_document,
        )?;
        Ok(doc)
    }

    /// Get a document by id
    pub fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let doc = conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
                params![id],
                row_to_document,
            )
            .optional()?;
        Ok(doc)
    }

    /// Apply a partial update; returns the updated document
    pub fn update_document(&self, id: i64, update: &DocumentUpdate) -> Result<Option<Document>> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(title) = &update.title {
            sets.push("title");
            values.push(Value::Text(title.clone()));
        }
        if let Some(doc_type) = update.doc_type {
            sets.push("type");
            values.push(Value::Text(doc_type.as_str().to_string()));
        }
        if let Some(is_private) = update.is_private {
            sets.push("is_private");
            values.push(Value::Integer(is_private as i64));
        }
        if let Some(date) = &update.publication_date {
            sets.push("publication_date");
            values.push(opt_text(date.map(|d| d.format("%Y-%m-%d").to_string())));
        }

        let text_fields: [(&str, &Option<Option<String>>); 12] = [
            ("creator", &update.creator),
            ("keywords", &update.keywords),
            ("description", &update.description),
            ("publisher", &update.publisher),
            ("contributor", &update.contributor),
            ("source", &update.source),
            ("language", &update.language),
            ("relation", &update.relation),
            ("coverage", &update.coverage),
            ("rights", &update.rights),
            ("doi", &update.doi),
            ("abstract", &update.abstract_text),
        ];
        for (column, field) in text_fields {
            if let Some(value) = field {
                sets.push(column);
                values.push(opt_text(value.clone()));
            }
        }

        if !sets.is_empty() {
            let assignments: Vec<String> = sets
                .iter()
                .enumerate()
                .map(|(i, column)| format!("{} = ?{}", column, i + 1))
                .collect();
            let sql = format!(
                "UPDATE documents SET {}, updated_at = ?{} WHERE id = ?{}",
                assignments.join(", "),
                values.len() + 1,
                values.len() + 2
            );
            values.push(Value::Text(now_string()));
            values.push(Value::Integer(id));

            let conn = self.conn.lock();
            conn.execute(&sql, params_from_iter(values.iter()))
                .map_err(|e| match e {
                    rusqlite::Error::SqliteFailure(f, _)
                        if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        Error::Conflict("DOI already exists".to_string())
                    }
                    other => Error::Database(other),
                })?;
        }

        self.get_document(id)
    }

    /// Persist extracted metadata for a document
    pub fn update_document_metadata(
        &self,
        id: i64,
        meta: &ExtractedMetadata,
        is_complete: bool,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE documents SET
                title = COALESCE(?2, title),
                creator = ?3,
                keywords = ?4,
                description = ?5,
                publisher = ?6,
                contributor = ?7,
                publication_date = ?8,
                format = COALESCE(?9, format),
                identifier = ?10,
                source = ?11,
                language = ?12,
                relation = ?13,
                doi = ?14,
                abstract = ?15,
                citation_count = ?16,
                is_metadata_complete = ?17,
                updated_at = ?18,
                coverage = COALESCE(?19, coverage)
             WHERE id = ?1",
            params![
                id,
                meta.title,
                meta.creator,
                meta.keywords,
                meta.description,
                meta.publisher,
                meta.contributor,
                meta.publication_date,
                meta.format,
                meta.identifier,
                meta.source,
                meta.language,
                meta.relation,
                meta.doi,
                meta.abstract_text,
                meta.citation_count,
                is_complete,
                now_string(),
                meta.coverage,
            ],
        )?;
        Ok(())
    }

    /// Set processing status and error message
    pub fn set_processing_status(
        &self,
        id: i64,
        status: ProcessingStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE documents SET processing_status = ?2, processing_error = ?3, updated_at = ?4
             WHERE id = ?1",
            params![id, status.as_str(), error, now_string()],
        )?;
        Ok(())
    }

    /// Record the object name of the stored PDF
    pub fn set_file_path(&self, id: i64, file_path: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE documents SET file_path = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, file_path, now_string()],
        )?;
        Ok(())
    }

    /// Delete a document and, by cascade, its chunks and references
    pub fn delete_document(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    /// Filtered, paginated listing, newest first; returns (total, page)
    pub fn list_documents(&self, filter: &ListFilter) -> Result<(i64, Vec<Document>)> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(doc_type) = filter.doc_type {
            values.push(Value::Text(doc_type.as_str().to_string()));
            clauses.push(format!("type = ?{}", values.len()));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            values.push(Value::Text(format!("%{}%", search.to_lowercase())));
            let n = values.len();
            clauses.push(format!(
                "(LOWER(title) LIKE ?{n} OR LOWER(COALESCE(creator, '')) LIKE ?{n} \
                 OR LOWER(COALESCE(keywords, '')) LIKE ?{n})"
            ));
        }
        if !filter.include_private {
            clauses.push("is_private = 0".to_string());
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let conn = self.conn.lock();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM documents {}", where_sql),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let mut page_values = values.clone();
        page_values.push(Value::Integer(filter.per_page));
        page_values.push(Value::Integer(filter.offset()));
        let sql = format!(
            "SELECT {} FROM documents {} ORDER BY created_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
            DOCUMENT_COLUMNS,
            where_sql,
            page_values.len() - 1,
            page_values.len()
        );

        let mut stmt = conn.prepare(&sql)?;
        let docs = stmt
            .query_map(params_from_iter(page_values.iter()), row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((total, docs))
    }

    /// Number of chunks stored for a document
    pub fn count_chunks(&self, document_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM document_chunks WHERE document_id = ?1",
            params![document_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Id of the document holding a DOI, if any
    pub fn find_document_by_doi(&self, doi: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        let id = conn
            .query_row(
                "SELECT id FROM documents WHERE doi = ?1",
                params![doi],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Documents currently in any of the given states, oldest first
    pub fn documents_with_status(&self, statuses: &[ProcessingStatus]) -> Result<Vec<Document>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<String> = (1..=statuses.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "SELECT {} FROM documents WHERE processing_status IN ({}) ORDER BY created_at ASC",
            DOCUMENT_COLUMNS,
            placeholders.join(", ")
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let docs = stmt
            .query_map(
                params_from_iter(statuses.iter().map(|s| s.as_str())),
                row_to_document,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(docs)
    }

    // ==================== Chunks ====================

    /// Replace all chunks of a document in one transaction
    pub fn replace_chunks(&self, document_id: i64, chunks: &[NewChunk]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let now = now_string();

        tx.execute(
            "DELETE FROM document_chunks WHERE document_id = ?1",
            params![document_id],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO document_chunks (
                    document_id, chunk_index, content, token_count, embedding,
                    possibly_questions, possibly_question_embedding, chunk_metadata,
                    page_number, section_title, chunk_type, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;

            for chunk in chunks {
                let questions = chunk
                    .possibly_questions
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                stmt.execute(params![
                    document_id,
                    chunk.chunk_index,
                    chunk.content,
                    chunk.token_count,
                    chunk.embedding.as_deref().map(encode_vector),
                    questions,
                    chunk.possibly_question_embedding.as_deref().map(encode_vector),
                    chunk.chunk_metadata.to_string(),
                    chunk.page_number,
                    chunk.section_title,
                    chunk.chunk_type.as_str(),
                    now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(chunks.len())
    }

    /// Vectors of all chunks visible to the caller
    pub fn chunk_vectors(&self, include_private: bool) -> Result<Vec<ChunkVectors>> {
        let sql = if include_private {
            "SELECT c.id, c.document_id, c.embedding, c.possibly_question_embedding
             FROM document_chunks c"
        } else {
            "SELECT c.id, c.document_id, c.embedding, c.possibly_question_embedding
             FROM document_chunks c JOIN documents d ON d.id = c.document_id
             WHERE d.is_private = 0"
        };

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let vectors = stmt
            .query_map([], |row| {
                let embedding: Option<Vec<u8>> = row.get(2)?;
                let question: Option<Vec<u8>> = row.get(3)?;
                Ok(ChunkVectors {
                    chunk_id: row.get(0)?,
                    document_id: row.get(1)?,
                    embedding: embedding.map(|b| decode_vector(&b)),
                    question_embedding: question.map(|b| decode_vector(&b)),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(vectors)
    }

    /// Load chunks by id, in the order given
    pub fn get_chunks(&self, ids: &[i64]) -> Result<Vec<DocumentChunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM document_chunks WHERE id = ?1",
            CHUNK_COLUMNS
        ))?;

        let mut chunks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(chunk) = stmt.query_row(params![id], row_to_chunk).optional()? {
                chunks.push(chunk);
            }
        }
        Ok(chunks)
    }

    /// All chunks of a document in index order
    pub fn chunks_for_document(&self, document_id: i64) -> Result<Vec<DocumentChunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM document_chunks WHERE document_id = ?1 ORDER BY chunk_index",
            CHUNK_COLUMNS
        ))?;
        let chunks = stmt
            .query_map(params![document_id], row_to_chunk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    // ==================== Conversations ====================

    pub fn create_conversation(&self, user_id: i64, title: &str) -> Result<Conversation> {
        let conn = self.conn.lock();
        let now = now_string();
        conn.execute(
            "INSERT INTO conversations (user_id, title, is_pinned, created_at, updated_at)
             VALUES (?1, ?2, 0, ?3, ?3)",
            params![user_id, title, now],
        )?;
        let id = conn.last_insert_rowid();
        let conversation = conn.query_row(
            &format!("SELECT {} FROM conversations WHERE id = ?1", CONVERSATION_COLUMNS),
            params![id],
            row_to_conversation,
        )?;
        Ok(conversation)
    }

    /// Conversation owned by the given user
    pub fn get_conversation(&self, id: i64, user_id: i64) -> Result<Option<Conversation>> {
        let conn = self.conn.lock();
        let conversation = conn
            .query_row(
                &format!(
                    "SELECT {} FROM conversations WHERE id = ?1 AND user_id = ?2",
                    CONVERSATION_COLUMNS
                ),
                params![id, user_id],
                row_to_conversation,
            )
            .optional()?;
        Ok(conversation)
    }

    /// A user's conversations, most recently active first
    pub fn list_conversations(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM conversations WHERE user_id = ?1
             ORDER BY updated_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            CONVERSATION_COLUMNS
        ))?;
        let conversations = stmt
            .query_map(params![user_id, limit, offset], row_to_conversation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(conversations)
    }

    /// Bump `updated_at`
    pub fn touch_conversation(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
            params![id, now_string()],
        )?;
        Ok(())
    }

    pub fn insert_chat(&self, conversation_id: i64, role: ChatRole, message: &str) -> Result<Chat> {
        let conn = self.conn.lock();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO chats (conversation_id, role, message, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![conversation_id, role.as_str(), message, now.to_rfc3339()],
        )?;
        Ok(Chat {
            id: conn.last_insert_rowid(),
            conversation_id,
            role,
            message: message.to_string(),
            created_at: now,
        })
    }

    pub fn insert_reference(&self, chat_id: i64, reference: &NewChatReference) -> Result<ChatReference> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO chat_references (chat_id, document_id, chunk_id, relevance_score, quote, page_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                chat_id,
                reference.document_id,
                reference.chunk_id,
                reference.relevance_score as f64,
                reference.quote,
                reference.page_number,
            ],
        )?;
        Ok(ChatReference {
            id: conn.last_insert_rowid(),
            chat_id,
            document_id: reference.document_id,
            chunk_id: reference.chunk_id,
            relevance_score: reference.relevance_score,
            quote: reference.quote.clone(),
            page_number: reference.page_number,
        })
    }

    /// References of a chat joined with their document title and file
    pub fn references_for_chat(&self, chat_id: i64) -> Result<Vec<ChatReferenceResponse>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.document_id, r.chunk_id, r.relevance_score, r.quote, r.page_number,
                    d.title, d.file_path
             FROM chat_references r JOIN documents d ON d.id = r.document_id
             WHERE r.chat_id = ?1 ORDER BY r.id",
        )?;
        let refs = stmt
            .query_map(params![chat_id], row_to_reference_response)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(refs)
    }

    /// Messages of a conversation in order, each with its references
    pub fn chats_for_conversation(&self, conversation_id: i64) -> Result<Vec<ChatResponse>> {
        let chats = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, message, created_at
                 FROM chats WHERE conversation_id = ?1 ORDER BY id",
            )?;
            let chats = stmt
                .query_map(params![conversation_id], |row| {
                    let role: String = row.get(2)?;
                    let created_at: String = row.get(4)?;
                    Ok(Chat {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        role: ChatRole::parse(&role),
                        message: row.get(3)?,
                        created_at: parse_timestamp(&created_at),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            chats
        };

        chats
            .into_iter()
            .map(|chat| {
                let refs = self.references_for_chat(chat.id)?;
                Ok(ChatResponse::new(chat, refs))
            })
            .collect()
    }
}

/// Map UNIQUE violations on the users table to the message clients see
fn user_conflict(e: rusqlite::Error) -> Error {
    match e {
        rusqlite::Error::SqliteFailure(f, ref message)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            if message.as_deref().is_some_and(|m| m.contains("users.username")) {
                Error::Conflict("Username already taken".to_string())
            } else {
                Error::Conflict("Email already registered".to_string())
            }
        }
        other => Error::Database(other),
    }
}

fn now_string() -> String {
    Utc::now().to_rfc3339()
}

fn opt_text(value: Option<String>) -> Value {
    value.map(Value::Text).unwrap_or(Value::Null)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let role: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        password_hash: row.get(3)?,
        role: UserRole::parse(&role),
        is_active: row.get(5)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let doc_type: String = row.get(8)?;
    let status: String = row.get(20)?;
    let created_at: String = row.get(24)?;
    let updated_at: String = row.get(25)?;

    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        creator: row.get(2)?,
        keywords: row.get(3)?,
        description: row.get(4)?,
        publisher: row.get(5)?,
        contributor: row.get(6)?,
        publication_date: row.get(7)?,
        doc_type: DocumentType::parse(&doc_type),
        format: row.get(9)?,
        identifier: row.get(10)?,
        source: row.get(11)?,
        language: row.get(12)?,
        relation: row.get(13)?,
        coverage: row.get(14)?,
        rights: row.get(15)?,
        doi: row.get(16)?,
        abstract_text: row.get(17)?,
        citation_count: row.get(18)?,
        file_path: row.get(19)?,
        processing_status: ProcessingStatus::parse(&status),
        processing_error: row.get(21)?,
        is_private: row.get(22)?,
        is_metadata_complete: row.get(23)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<DocumentChunk> {
    let embedding: Option<Vec<u8>> = row.get(5)?;
    let questions: Option<String> = row.get(6)?;
    let question_embedding: Option<Vec<u8>> = row.get(7)?;
    let metadata: Option<String> = row.get(8)?;
    let chunk_type: String = row.get(11)?;

    Ok(DocumentChunk {
        id: row.get(0)?,
        document_id: row.get(1)?,
        chunk_index: row.get(2)?,
        content: row.get(3)?,
        token_count: row.get(4)?,
        embedding: embedding.map(|b| decode_vector(&b)),
        possibly_questions: questions.and_then(|j| serde_json::from_str(&j).ok()),
        possibly_question_embedding: question_embedding.map(|b| decode_vector(&b)),
        chunk_metadata: metadata
            .and_then(|j| serde_json::from_str(&j).ok())
            .unwrap_or(serde_json::Value::Null),
        page_number: row.get(9)?,
        section_title: row.get(10)?,
        chunk_type: ChunkType::parse(&chunk_type),
    })
}

fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        is_pinned: row.get(3)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn row_to_reference_response(row: &rusqlite::Row) -> rusqlite::Result<ChatReferenceResponse> {
    let score: f64 = row.get(3)?;
    Ok(ChatReferenceResponse {
        id: row.get(0)?,
        document_id: row.get(1)?,
        chunk_id: row.get(2)?,
        relevance_score: score as f32,
        quote: row.get(4)?,
        page_number: row.get(5)?,
        document_title: row.get(6)?,
        file_path: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn chunk(index: i64, content: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            chunk_index: index,
            content: content.to_string(),
            token_count: content.split_whitespace().count() as i64,
            embedding: Some(embedding),
            chunk_metadata: json!({"chunk_size": 1}),
            page_number: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_user_roundtrip() {
        let db = Database::in_memory().unwrap();
        let user = db
            .create_user("ada@example.org", "ada", "hash", UserRole::User)
            .unwrap();

        assert_eq!(db.get_user_by_email("ada@example.org").unwrap().unwrap().id, user.id);
        assert_eq!(db.get_user_by_username("ada").unwrap().unwrap().id, user.id);
        assert!(db.get_user_by_id(999).unwrap().is_none());

        assert!(db.set_user_role(user.id, UserRole::Admin).unwrap());
        assert!(db.get_user_by_id(user.id).unwrap().unwrap().is_admin());
    }

    #[test]
    fn test_duplicate_user_is_conflict() {
        let db = Database::in_memory().unwrap();
        db.create_user("ada@example.org", "ada", "hash", UserRole::User)
            .unwrap();

        let err = db
            .create_user("ada@example.org", "other", "hash", UserRole::User)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(err.to_string(), "Email already registered");

        let err = db
            .create_user("new@example.org", "ada", "hash", UserRole::User)
            .unwrap_err();
        assert_eq!(err.to_string(), "Username already taken");
    }

    #[test]
    fn test_list_documents_filters_and_paginates() {
        let db = Database::in_memory().unwrap();
        for i in 0..5 {
            db.insert_document(
                &format!("Graph Paper {}", i),
                DocumentType::Journal,
                false,
                ProcessingStatus::Completed,
            )
            .unwrap();
        }
        db.insert_document("Secret Thesis", DocumentType::Thesis, true, ProcessingStatus::Completed)
            .unwrap();

        let (total, page) = db
            .list_documents(&ListFilter {
                page: 2,
                per_page: 2,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(total, 6);
        assert_eq!(page.len(), 2);

        let (total, _) = db
            .list_documents(&ListFilter {
                search: Some("graph".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(total, 5);

        let (total, docs) = db
            .list_documents(&ListFilter {
                doc_type: Some(DocumentType::Thesis),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(docs[0].title, "Secret Thesis");

        let (total, _) = db
            .list_documents(&ListFilter {
                include_private: false,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(total, 5);
    }

    #[test]
    fn test_partial_update() {
        let db = Database::in_memory().unwrap();
        let doc = db
            .insert_document("Draft", DocumentType::Journal, false, ProcessingStatus::Completed)
            .unwrap();

        let update: DocumentUpdate = serde_json::from_value(json!({
            "title": "Final",
            "publisher": "ACM",
            "date": "2020-05-01"
        }))
        .unwrap();
        let updated = db.update_document(doc.id, &update).unwrap().unwrap();
        assert_eq!(updated.title, "Final");
        assert_eq!(updated.publisher.as_deref(), Some("ACM"));
        assert_eq!(updated.publication_date, NaiveDate::from_ymd_opt(2020, 5, 1));

        let clear: DocumentUpdate = serde_json::from_value(json!({"publisher": null})).unwrap();
        let cleared = db.update_document(doc.id, &clear).unwrap().unwrap();
        assert_eq!(cleared.publisher, None);
        assert_eq!(cleared.title, "Final");
    }

    #[test]
    fn test_duplicate_doi_is_conflict() {
        let db = Database::in_memory().unwrap();
        let a = db
            .insert_document("A", DocumentType::Journal, false, ProcessingStatus::Completed)
            .unwrap();
        let b = db
            .insert_document("B", DocumentType::Journal, false, ProcessingStatus::Completed)
            .unwrap();

        let set_doi: DocumentUpdate =
            serde_json::from_value(json!({"doi": "10.1000/xyz"})).unwrap();
        db.update_document(a.id, &set_doi).unwrap();
        assert!(matches!(
            db.update_document(b.id, &set_doi),
            Err(Error::Conflict(_))
        ));
        assert_eq!(db.find_document_by_doi("10.1000/xyz").unwrap(), Some(a.id));
    }

    #[test]
    fn test_replace_chunks_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let doc = db
            .insert_document("Doc", DocumentType::Journal, false, ProcessingStatus::Processing)
            .unwrap();

        let chunks = vec![chunk(0, "first chunk", vec![1.0, 0.0]), chunk(1, "second", vec![0.0, 1.0])];
        db.replace_chunks(doc.id, &chunks).unwrap();
        db.replace_chunks(doc.id, &chunks).unwrap();

        assert_eq!(db.count_chunks(doc.id).unwrap(), 2);
        let stored = db.chunks_for_document(doc.id).unwrap();
        assert_eq!(stored[1].embedding.as_deref(), Some(&[0.0f32, 1.0][..]));
        assert_eq!(stored[0].chunk_metadata["chunk_size"], 1);
    }

    #[test]
    fn test_private_chunks_hidden() {
        let db = Database::in_memory().unwrap();
        let public = db
            .insert_document("Public", DocumentType::Journal, false, ProcessingStatus::Completed)
            .unwrap();
        let private = db
            .insert_document("Private", DocumentType::Journal, true, ProcessingStatus::Completed)
            .unwrap();
        db.replace_chunks(public.id, &[chunk(0, "a", vec![1.0])]).unwrap();
        db.replace_chunks(private.id, &[chunk(0, "b", vec![1.0])]).unwrap();

        assert_eq!(db.chunk_vectors(true).unwrap().len(), 2);
        let visible = db.chunk_vectors(false).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].document_id, public.id);
    }

    #[test]
    fn test_delete_cascades() {
        let db = Database::in_memory().unwrap();
        let doc = db
            .insert_document("Doc", DocumentType::Journal, false, ProcessingStatus::Completed)
            .unwrap();
        db.replace_chunks(doc.id, &[chunk(0, "a", vec![1.0])]).unwrap();

        assert!(db.delete_document(doc.id).unwrap());
        assert_eq!(db.count_chunks(doc.id).unwrap(), 0);
        assert!(!db.delete_document(doc.id).unwrap());
    }

    #[test]
    fn test_conversation_flow() {
        let db = Database::in_memory().unwrap();
        let user = db.create_user("u@example.org", "user", "h", UserRole::User).unwrap();
        let other = db.create_user("o@example.org", "other", "h", UserRole::User).unwrap();
        let doc = db
            .insert_document("Doc", DocumentType::Journal, false, ProcessingStatus::Completed)
            .unwrap();
        db.replace_chunks(doc.id, &[chunk(0, "a", vec![1.0])]).unwrap();
        let chunk_id = db.chunks_for_document(doc.id).unwrap()[0].id;

        let conv = db.create_conversation(user.id, "What is a graph").unwrap();
        assert!(db.get_conversation(conv.id, other.id).unwrap().is_none());

        db.insert_chat(conv.id, ChatRole::User, "What is a graph?").unwrap();
        let bot = db.insert_chat(conv.id, ChatRole::Bot, "A set of nodes.").unwrap();
        db.insert_reference(
            bot.id,
            &NewChatReference {
                document_id: doc.id,
                chunk_id,
                relevance_score: 0.8,
                quote: "a".to_string(),
                page_number: Some(1),
            },
        )
        .unwrap();

        let chats = db.chats_for_conversation(conv.id).unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[1].references.len(), 1);
        assert_eq!(chats[1].references[0].document_title, "Doc");

        assert_eq!(db.list_conversations(user.id, 10, 0).unwrap().len(), 1);
        assert!(db.list_conversations(other.id, 10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_documents_with_status() {
        let db = Database::in_memory().unwrap();
        db.insert_document("A", DocumentType::Journal, false, ProcessingStatus::Processing)
            .unwrap();
        db.insert_document("B", DocumentType::Journal, false, ProcessingStatus::Completed)
            .unwrap();

        let pending = db
            .documents_with_status(&[ProcessingStatus::Uploading, ProcessingStatus::Processing])
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "A");
        assert!(db.ping());
    }
}
