//! Document upload, listing, metadata editing and file access

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{Error, Result};
use crate::ingestion::{validate::file_stem, validate_pdf, validate_size};
use crate::processing::{Job, JobProgress};
use crate::server::state::AppState;
use crate::types::{
    Document, DocumentListItem, DocumentListResponse, DocumentResponse, DocumentType,
    DocumentUpdate, ListFilter, ProcessingStatus, User,
};

const DEFAULT_PER_PAGE: i64 = 10;
const MAX_PER_PAGE: i64 = 100;

/// Query parameters for upload
#[derive(Debug, Deserialize)]
pub struct UploadParams {
    #[serde(rename = "type", default)]
    pub doc_type: DocumentType,
    #[serde(default)]
    pub is_private: bool,
}

/// Query parameters for listing
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    #[serde(rename = "type")]
    pub doc_type: Option<DocumentType>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub download_url: String,
    pub filename: String,
}

/// Processing state of one document
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub document_id: i64,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub chunk_count: i64,
    /// Live progress while the document is known to the queue
    pub job: Option<JobProgress>,
}

/// Load a document the user may see; private ones are hidden from non-admins
fn visible_document(state: &AppState, id: i64, user: &User) -> Result<Document> {
    state
        .db()
        .get_document(id)?
        .filter(|doc| !doc.is_private || user.is_admin())
        .ok_or_else(|| Error::not_found("Document not found"))
}

/// Body-limit rejections surface as multipart errors; report them as size errors
fn multipart_error(e: MultipartError, max_mb: usize, context: &str) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { max_mb }
    } else {
        Error::validation(format!("{}: {}", context, e))
    }
}

fn document_response(state: &AppState, doc: Document) -> Result<DocumentResponse> {
    let chunk_count = state.db().count_chunks(doc.id)?;
    Ok(DocumentResponse::new(doc, chunk_count))
}

/// POST /documents/upload - store the PDF and queue it for processing
pub async fn upload_document(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Json<DocumentResponse>> {
    current.require_admin()?;
    let max_size = state.config().upload.max_pdf_size;
    let max_mb = state.config().upload.max_mb();

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_mb, "Invalid multipart body"))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().map(|s| s.to_string());
        validate_pdf(filename.as_deref())?;

        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, max_mb, "Failed to read upload"))?;
        upload = Some((filename.unwrap_or_default(), data.to_vec()));
        break;
    }

    let (filename, data) = upload.ok_or_else(|| Error::validation("No file uploaded"))?;
    validate_size(data.len(), max_size)?;
    if data.is_empty() {
        return Err(Error::validation("Uploaded file is empty"));
    }

    let db = state.db();
    let doc = db.insert_document(
        &file_stem(&filename),
        params.doc_type,
        params.is_private,
        ProcessingStatus::Uploading,
    )?;

    let object_name = format!("{}.pdf", Uuid::new_v4());
    if let Err(e) = state
        .store()
        .put(&object_name, data, "application/pdf")
        .await
    {
        tracing::error!("Failed to store upload '{}': {}", filename, e);
        db.delete_document(doc.id)?;
        return Err(e);
    }

    db.set_file_path(doc.id, &object_name)?;
    db.set_processing_status(doc.id, ProcessingStatus::Processing, None)?;
    state
        .job_queue()
        .submit(Job::new(doc.id, object_name.clone()))
        .await?;

    tracing::info!(
        "Uploaded '{}' as document {} ({}), processing queued",
        filename,
        doc.id,
        object_name
    );

    let doc = db
        .get_document(doc.id)?
        .ok_or_else(|| Error::not_found("Document not found"))?;
    Ok(Json(DocumentResponse::new(doc, 0)))
}

/// GET /documents - paginated listing, newest first
pub async fn list_documents(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Json<DocumentListResponse>> {
    let page = params.page.unwrap_or(1);
    let per_page = params.per_page.unwrap_or(DEFAULT_PER_PAGE);
    if page < 1 {
        return Err(Error::validation("page must be at least 1"));
    }
    if !(1..=MAX_PER_PAGE).contains(&per_page) {
        return Err(Error::validation(format!(
            "per_page must be between 1 and {}",
            MAX_PER_PAGE
        )));
    }

    let filter = ListFilter {
        page,
        per_page,
        doc_type: params.doc_type,
        search: params
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        include_private: current.user().is_admin(),
    };

    let (total, documents) = state.db().list_documents(&filter)?;
    let items = documents.into_iter().map(DocumentListItem::from).collect();
    Ok(Json(DocumentListResponse::new(items, total, page, per_page)))
}

/// GET /documents/:id
pub async fn get_document(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<DocumentResponse>> {
    let doc = visible_document(&state, id, current.user())?;
    document_response(&state, doc).map(Json)
}

/// PATCH /documents/:id - partial metadata update
pub async fn update_document(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(update): Json<DocumentUpdate>,
) -> Result<Json<DocumentResponse>> {
    current.require_admin()?;
    let db = state.db();

    if let Some(Some(doi)) = update.doi.as_ref() {
        if let Some(other) = db.find_document_by_doi(doi)? {
            if other != id {
                return Err(Error::Conflict("DOI already exists".to_string()));
            }
        }
    }
    if matches!(update.title.as_deref(), Some(t) if t.trim().is_empty()) {
        return Err(Error::validation("title cannot be empty"));
    }

    let doc = db
        .update_document(id, &update)?
        .ok_or_else(|| Error::not_found("Document not found"))?;
    tracing::info!("Updated metadata of document {}", id);
    document_response(&state, doc).map(Json)
}

/// DELETE /documents/:id - remove the record, its chunks and the stored file
pub async fn delete_document(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>> {
    current.require_admin()?;

    let doc = state
        .db()
        .get_document(id)?
        .ok_or_else(|| Error::not_found("Document not found"))?;

    if let Some(file_path) = doc.file_path.as_deref() {
        match state.store().delete(file_path).await {
            Ok(true) => tracing::debug!("Deleted stored file {}", file_path),
            Ok(false) => tracing::warn!("Stored file {} was already gone", file_path),
            Err(e) => tracing::warn!("Failed to delete stored file {}: {}", file_path, e),
        }
    }

    state.db().delete_document(id)?;
    state.job_queue().forget(id);
    tracing::info!("Deleted document {}", id);

    Ok(Json(DeleteResponse {
        message: "Document deleted successfully".to_string(),
        id,
    }))
}

/// GET /documents/:id/download - presigned or proxied download link
pub async fn download_document(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<DownloadResponse>> {
    let doc = visible_document(&state, id, current.user())?;
    let file_path = doc
        .file_path
        .as_deref()
        .ok_or_else(|| Error::not_found("Document file not found"))?;

    let expiry = Duration::from_secs(state.config().storage.presign_expiry_secs);
    let download_url = state
        .store()
        .presigned_get_url(file_path, expiry)
        .await?
        .unwrap_or_else(|| format!("/documents/{}/file", id));

    Ok(Json(DownloadResponse {
        download_url,
        filename: format!("{}.pdf", doc.title),
    }))
}

/// GET /documents/:id/file - stream the stored PDF
pub async fn document_file(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let doc = visible_document(&state, id, current.user())?;
    let file_path = doc
        .file_path
        .as_deref()
        .ok_or_else(|| Error::not_found("Document file not found"))?;

    let data = state.store().get(file_path).await?;
    let content_type = mime_guess::from_path(file_path)
        .first_or_octet_stream()
        .to_string();
    let disposition = format!(
        "inline; filename=\"{}.pdf\"",
        doc.title
            .replace(|c: char| matches!(c, '"' | '\\' | '\r' | '\n'), "_")
    );

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    ))
}

/// GET /documents/:id/progress
pub async fn document_progress(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<ProgressResponse>> {
    let doc = visible_document(&state, id, current.user())?;
    let chunk_count = state.db().count_chunks(id)?;

    Ok(Json(ProgressResponse {
        document_id: doc.id,
        processing_status: doc.processing_status,
        processing_error: doc.processing_error,
        chunk_count,
        job: state.job_queue().progress(id),
    }))
}
