//! API routes

pub mod auth;
pub mod chats;
pub mod documents;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Multipart framing allowance on top of the PDF size limit
const UPLOAD_OVERHEAD: usize = 1024 * 1024;

/// Build all API routes
pub fn api_routes(max_pdf_size: usize) -> Router<AppState> {
    Router::new()
        // Authentication
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/me", get(auth::me))
        // Documents
        .route(
            "/documents/upload",
            post(documents::upload_document)
                .layer(DefaultBodyLimit::max(max_pdf_size + UPLOAD_OVERHEAD)),
        )
        .route("/documents", get(documents::list_documents))
        .route(
            "/documents/:id",
            get(documents::get_document)
                .patch(documents::update_document)
                .delete(documents::delete_document),
        )
        .route("/documents/:id/download", get(documents::download_document))
        .route("/documents/:id/file", get(documents::document_file))
        .route("/documents/:id/progress", get(documents::document_progress))
        // Chat
        .route("/chats", post(chats::chat))
        .route("/chats/conversations", get(chats::list_conversations))
        .route("/chats/conversations/:id", get(chats::get_conversation))
}
