//! Documents with Dublin Core metadata

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Publication type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    #[default]
    Journal,
    Conference,
    Thesis,
    Report,
    Book,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Journal => "journal",
            DocumentType::Conference => "conference",
            DocumentType::Thesis => "thesis",
            DocumentType::Report => "report",
            DocumentType::Book => "book",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "conference" => DocumentType::Conference,
            "thesis" => DocumentType::Thesis,
            "report" => DocumentType::Report,
            "book" => DocumentType::Book,
            _ => DocumentType::Journal,
        }
    }
}

/// Lifecycle of an uploaded PDF
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Uploading => "uploading",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "uploading" => ProcessingStatus::Uploading,
            "processing" => ProcessingStatus::Processing,
            "failed" => ProcessingStatus::Failed,
            _ => ProcessingStatus::Completed,
        }
    }
}

/// A stored document
#[derive(Debug, Clone)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub creator: Option<String>,
    pub keywords: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub contributor: Option<String>,
    pub publication_date: Option<NaiveDate>,
    pub doc_type: DocumentType,
    pub format: Option<String>,
    pub identifier: Option<String>,
    pub source: Option<String>,
    pub language: Option<String>,
    pub relation: Option<String>,
    pub coverage: Option<String>,
    pub rights: Option<String>,
    pub doi: Option<String>,
    pub abstract_text: Option<String>,
    pub citation_count: i64,
    pub file_path: Option<String>,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub is_private: bool,
    pub is_metadata_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata produced by the extraction pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub keywords: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub contributor: Option<String>,
    pub publication_date: Option<NaiveDate>,
    pub format: Option<String>,
    pub identifier: Option<String>,
    pub source: Option<String>,
    pub language: Option<String>,
    pub relation: Option<String>,
    pub coverage: Option<String>,
    pub doi: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub citation_count: i64,
}

/// Partial update; absent fields are left untouched, explicit nulls clear them
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub creator: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub keywords: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub publisher: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub contributor: Option<Option<String>>,
    #[serde(default, rename = "date", alias = "publication_date", deserialize_with = "double_option")]
    pub publication_date: Option<Option<NaiveDate>>,
    #[serde(rename = "type")]
    pub doc_type: Option<DocumentType>,
    #[serde(default, deserialize_with = "double_option")]
    pub source: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub language: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub relation: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub coverage: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub rights: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub doi: Option<Option<String>>,
    #[serde(default, rename = "abstract", deserialize_with = "double_option")]
    pub abstract_text: Option<Option<String>>,
    pub is_private: Option<bool>,
}

fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl DocumentUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.creator.is_none()
            && self.keywords.is_none()
            && self.description.is_none()
            && self.publisher.is_none()
            && self.contributor.is_none()
            && self.publication_date.is_none()
            && self.doc_type.is_none()
            && self.source.is_none()
            && self.language.is_none()
            && self.relation.is_none()
            && self.coverage.is_none()
            && self.rights.is_none()
            && self.doi.is_none()
            && self.abstract_text.is_none()
            && self.is_private.is_none()
    }
}

/// Full document as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub id: i64,
    pub title: String,
    pub creator: Option<String>,
    pub keywords: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub contributor: Option<String>,
    #[serde(rename = "date")]
    pub publication_date: Option<NaiveDate>,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub format: Option<String>,
    pub identifier: Option<String>,
    pub source: Option<String>,
    pub language: Option<String>,
    pub relation: Option<String>,
    pub coverage: Option<String>,
    pub rights: Option<String>,
    pub doi: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub citation_count: i64,
    pub file_path: Option<String>,
    pub is_private: bool,
    pub is_metadata_complete: bool,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub chunk_count: i64,
}

impl DocumentResponse {
    pub fn new(doc: Document, chunk_count: i64) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            creator: doc.creator,
            keywords: doc.keywords,
            description: doc.description,
            publisher: doc.publisher,
            contributor: doc.contributor,
            publication_date: doc.publication_date,
            doc_type: doc.doc_type,
            format: doc.format,
            identifier: doc.identifier,
            source: doc.source,
            language: doc.language,
            relation: doc.relation,
            coverage: doc.coverage,
            rights: doc.rights,
            doi: doc.doi,
            abstract_text: doc.abstract_text,
            citation_count: doc.citation_count,
            file_path: doc.file_path,
            is_private: doc.is_private,
            is_metadata_complete: doc.is_metadata_complete,
            processing_status: doc.processing_status,
            processing_error: doc.processing_error,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            chunk_count,
        }
    }
}

/// Lightweight list entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentListItem {
    pub id: i64,
    pub title: String,
    pub creator: Option<String>,
    #[serde(rename = "date")]
    pub publication_date: Option<NaiveDate>,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub doi: Option<String>,
    pub is_private: bool,
    pub processing_status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Document> for DocumentListItem {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            creator: doc.creator,
            publication_date: doc.publication_date,
            doc_type: doc.doc_type,
            doi: doc.doi,
            is_private: doc.is_private,
            processing_status: doc.processing_status,
            created_at: doc.created_at,
        }
    }
}

/// Paginated document list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentListItem>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub pages: i64,
}

impl DocumentListResponse {
    pub fn new(documents: Vec<DocumentListItem>, total: i64, page: i64, per_page: i64) -> Self {
        let pages = if total > 0 {
            (total + per_page - 1) / per_page
        } else {
            1
        };
        Self {
            documents,
            total,
            page,
            per_page,
            pages,
        }
    }
}

/// Listing filter
#[derive(Debug, Clone)]
pub struct ListFilter {
    pub page: i64,
    pub per_page: i64,
    pub doc_type: Option<DocumentType>,
    pub search: Option<String>,
    pub include_private: bool,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            doc_type: None,
            search: None,
            include_private: true,
        }
    }
}

impl ListFilter {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_rounds_up() {
        assert_eq!(DocumentListResponse::new(vec![], 0, 1, 20).pages, 1);
        assert_eq!(DocumentListResponse::new(vec![], 20, 1, 20).pages, 1);
        assert_eq!(DocumentListResponse::new(vec![], 21, 1, 20).pages, 2);
    }

    #[test]
    fn test_update_distinguishes_null_from_absent() {
        let update: DocumentUpdate =
            serde_json::from_str(r#"{"publisher": null, "date": "2021-03-04", "title": "New"}"#)
                .unwrap();
        assert_eq!(update.publisher, Some(None));
        assert_eq!(update.creator, None);
        assert_eq!(
            update.publication_date,
            Some(NaiveDate::from_ymd_opt(2021, 3, 4))
        );
        assert_eq!(update.title.as_deref(), Some("New"));
        assert!(!update.is_empty());
    }

    #[test]
    fn test_type_parse_defaults_to_journal() {
        assert_eq!(DocumentType::parse("thesis"), DocumentType::Thesis);
        assert_eq!(DocumentType::parse("unknown"), DocumentType::Journal);
    }
}
