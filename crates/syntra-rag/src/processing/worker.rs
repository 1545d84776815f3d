//! Background worker turning stored PDFs into metadata and embedded chunks

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::ingestion::{
    extract_pages, format_for_database, generate_questions, is_metadata_incomplete,
    llm_metadata::extract_metadata_with_llm, merge_metadata, validate_metadata, SmartChunker,
    TextChunker,
};
use crate::providers::{EmbeddingProvider, FulltextResult, LlmProvider};
use crate::server::state::AppState;
use crate::types::{NewChunk, ProcessingStatus};

use super::job_queue::{Job, JobQueue, JobStatus, ProcessingStage};

/// Chunks embedded concurrently per document
const EMBED_BATCH_SIZE: usize = 4;

/// What the model side produced for one chunk
#[derive(Debug, Default)]
struct ChunkEnrichment {
    embedding: Option<Vec<f32>>,
    questions: Option<Vec<String>>,
    question_embedding: Option<Vec<f32>>,
}

/// Worker for processing documents in the background
#[derive(Clone)]
pub struct DocumentWorker {
    state: AppState,
    workers: usize,
    task_timeout: Duration,
    retry_delay: Duration,
    max_retries: u32,
}

impl DocumentWorker {
    /// Create a new document worker
    pub fn new(state: AppState) -> Self {
        let processing = &state.config().processing;
        let workers = processing.workers.max(1);
        let task_timeout = Duration::from_secs(processing.task_timeout_secs);
        let retry_delay = Duration::from_secs(processing.retry_delay_secs);
        let max_retries = processing.max_retries;

        tracing::info!(
            "Worker configured: {} concurrent documents, {}s timeout, {} retries",
            workers,
            task_timeout.as_secs(),
            max_retries
        );

        Self {
            state,
            workers,
            task_timeout,
            retry_delay,
            max_retries,
        }
    }

    fn job_queue(&self) -> &Arc<JobQueue> {
        self.state.job_queue()
    }

    /// Start processing jobs from the queue
    pub async fn run(self, mut receiver: mpsc::Receiver<Job>) {
        tracing::info!("Document worker started with {} slots", self.workers);
        let semaphore = Arc::new(Semaphore::new(self.workers));

        while let Some(job) = receiver.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!("Worker semaphore closed: {}", e);
                    break;
                }
            };

            let worker = self.clone();
            tokio::spawn(async move {
                worker.handle(job).await;
                drop(permit);
            });
        }

        tracing::info!("Document worker stopped");
    }

    /// Run one job to completion, scheduling a retry on failure
    async fn handle(&self, job: Job) {
        let document_id = job.document_id;
        let queue = self.job_queue();
        queue.start(document_id);

        tracing::info!(
            "Processing document {} (attempt {}/{})",
            document_id,
            job.attempt + 1,
            self.max_retries + 1
        );
        let start_time = Instant::now();

        let result = match timeout(self.task_timeout, self.process(document_id, &job.file_path)).await
        {
            Ok(inner) => inner,
            Err(_) => {
                tracing::error!(
                    "TIMEOUT processing document {} after {}s",
                    document_id,
                    self.task_timeout.as_secs()
                );
                Err(Error::internal(format!(
                    "Processing timeout after {}s",
                    self.task_timeout.as_secs()
                )))
            }
        };

        match result {
            Ok(chunks) => {
                queue.finish(document_id, JobStatus::Complete, None);
                tracing::info!(
                    "Document {} complete: {} chunks in {:.1}s",
                    document_id,
                    chunks,
                    start_time.elapsed().as_secs_f64()
                );
            }
            Err(e) => {
                let message = format!("{}: {}", e.kind(), e);
                tracing::error!("Document {} failed: {}", document_id, message);
                queue.finish(document_id, JobStatus::Failed, Some(message.clone()));

                if matches!(e, Error::NotFound(_)) {
                    queue.forget(document_id);
                    return;
                }

                if let Err(db_err) = self.state.db().set_processing_status(
                    document_id,
                    ProcessingStatus::Failed,
                    Some(&message),
                ) {
                    tracing::error!(
                        "Failed to record failure for document {}: {}",
                        document_id,
                        db_err
                    );
                }

                if job.attempt < self.max_retries {
                    self.schedule_retry(job);
                }
            }
        }
    }

    fn schedule_retry(&self, job: Job) {
        let queue = Arc::clone(self.job_queue());
        let delay = self.retry_delay;
        let next = job.retry();

        tracing::info!(
            "Retrying document {} in {}s (attempt {})",
            next.document_id,
            delay.as_secs(),
            next.attempt + 1
        );

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queue.submit(next).await {
                tracing::error!("Failed to requeue document: {}", e);
            }
        });
    }

    /// Full ingestion pipeline for one stored PDF; returns the chunk count
    pub async fn process(&self, document_id: i64, file_path: &str) -> Result<usize> {
        let state = &self.state;
        let config = state.config();
        let db = state.db();
        let queue = self.job_queue();

        let document = db
            .get_document(document_id)?
            .ok_or_else(|| Error::not_found("Document not found"))?;
        db.set_processing_status(document_id, ProcessingStatus::Processing, None)?;

        // Download
        queue.update_stage(document_id, ProcessingStage::Downloading, "Downloading PDF");
        // A missing object is a storage failure; NotFound means the document is gone
        let pdf = state.store().get(file_path).await.map_err(|e| match e {
            Error::NotFound(_) => Error::storage(format!("Stored file {} is missing", file_path)),
            other => other,
        })?;
        tracing::info!("[{}] Downloaded {} bytes", document_id, pdf.len());

        // GROBID
        queue.update_stage(
            document_id,
            ProcessingStage::ExtractingMetadata,
            "Extracting metadata with GROBID",
        );
        let header = state.grobid().process_header(&pdf).await?;
        let fulltext = match state.grobid().process_fulltext(&pdf).await {
            Ok(fulltext) => fulltext,
            Err(e) => {
                tracing::warn!("[{}] GROBID fulltext failed: {}", document_id, e);
                FulltextResult::default()
            }
        };

        let raw = tokio::task::spawn_blocking(move || extract_pages(&pdf))
            .await
            .map_err(|e| Error::internal(format!("PDF text extraction panicked: {}", e)))?;
        tracing::info!(
            "[{}] Extracted {} pages of raw text, {} sections from GROBID",
            document_id,
            raw.pages.len(),
            fulltext.sections.len()
        );

        let mut meta = format_for_database(&header, &fulltext.references);

        if is_metadata_incomplete(&meta) {
            let source_text = if raw.is_empty() { &fulltext.text } else { &raw.text };
            if let Some(llm_meta) =
                extract_metadata_with_llm(state.llm().as_ref(), source_text, &meta).await
            {
                tracing::info!("[{}] Filled missing metadata with the LLM", document_id);
                meta = merge_metadata(meta, llm_meta);
            }
        }

        let title_source = if raw.is_empty() { &fulltext.text } else { &raw.text };
        let mut meta = validate_metadata(meta, title_source, &document.title);

        if let Some(doi) = meta.doi.as_deref() {
            if let Some(other) = db.find_document_by_doi(doi)? {
                if other != document_id {
                    tracing::warn!(
                        "[{}] DOI {} already belongs to document {}, dropping it",
                        document_id,
                        doi,
                        other
                    );
                    meta.doi = None;
                }
            }
        }

        let is_complete = meta.title.is_some() && meta.creator.is_some();
        db.update_document_metadata(document_id, &meta, is_complete)?;

        // Chunking
        queue.update_stage(document_id, ProcessingStage::Chunking, "Chunking text");
        let chunker = TextChunker::from_config(&config.chunking);
        let mut chunks = SmartChunker::new(chunker.clone()).chunk_sections(
            &fulltext.sections,
            &meta,
            &raw.pages,
        );
        if chunks.is_empty() {
            let body = if fulltext.text.trim().is_empty() {
                &raw.text
            } else {
                &fulltext.text
            };
            tracing::info!("[{}] No usable sections, using legacy chunking", document_id);
            chunks = chunker.legacy_chunks(body, &meta);
        }
        tracing::info!("[{}] Created {} chunks", document_id, chunks.len());

        // Embeddings and questions
        self.enrich_chunks(document_id, &mut chunks, meta.title.as_deref())
            .await;

        queue.update_stage(document_id, ProcessingStage::Storing, "Storing chunks");
        let stored = db.replace_chunks(document_id, &chunks)?;

        db.set_processing_status(document_id, ProcessingStatus::Completed, None)?;
        Ok(stored)
    }

    async fn enrich_chunks(
        &self,
        document_id: i64,
        chunks: &mut [NewChunk],
        document_title: Option<&str>,
    ) {
        let processing = &self.state.config().processing;
        let question_count = if processing.generate_questions {
            processing.questions_per_chunk
        } else {
            0
        };
        let embedder = self.state.embedder().as_ref();
        let llm = self.state.llm().as_ref();
        let queue = self.job_queue();

        let total = chunks.len();
        let mut done = 0;
        queue.update_embedding(document_id, done, total);

        for batch in chunks.chunks_mut(EMBED_BATCH_SIZE) {
            let futures: Vec<_> = batch
                .iter()
                .map(|chunk| enrich_chunk(embedder, llm, chunk, document_title, question_count))
                .collect();
            let results = join_all(futures).await;

            for (chunk, enrichment) in batch.iter_mut().zip(results) {
                if enrichment.embedding.is_none() {
                    tracing::warn!(
                        "[{}] Chunk {} stored without an embedding",
                        document_id,
                        chunk.chunk_index
                    );
                }
                chunk.embedding = enrichment.embedding;
                chunk.possibly_questions = enrichment.questions;
                chunk.possibly_question_embedding = enrichment.question_embedding;
            }

            done += batch.len();
            queue.update_embedding(document_id, done, total);
        }
    }

    /// Requeue documents whose processing never finished
    pub async fn resume_incomplete(state: &AppState) -> Result<usize> {
        let pending = state
            .db()
            .documents_with_status(&[ProcessingStatus::Uploading, ProcessingStatus::Processing])?;

        let mut resumed = 0;
        for document in pending {
            match document.file_path {
                Some(file_path) => {
                    state.job_queue().submit(Job::new(document.id, file_path)).await?;
                    resumed += 1;
                }
                None => {
                    tracing::warn!(
                        "Document {} has no stored file, marking it failed",
                        document.id
                    );
                    state.db().set_processing_status(
                        document.id,
                        ProcessingStatus::Failed,
                        Some("StorageError: upload did not complete"),
                    )?;
                }
            }
        }

        if resumed > 0 {
            tracing::info!("Resumed processing for {} documents", resumed);
        }
        Ok(resumed)
    }
}

/// Embed one chunk and, when asked, generate and embed its questions
async fn enrich_chunk(
    embedder: &dyn EmbeddingProvider,
    llm: &dyn LlmProvider,
    chunk: &NewChunk,
    document_title: Option<&str>,
    question_count: usize,
) -> ChunkEnrichment {
    let mut enrichment = ChunkEnrichment::default();

    match embedder.embed(&chunk.content).await {
        Ok(embedding) => enrichment.embedding = embedding,
        Err(e) => tracing::warn!("Embedding failed for chunk {}: {}", chunk.chunk_index, e),
    }

    if question_count == 0 {
        return enrichment;
    }

    let questions = generate_questions(
        llm,
        &chunk.content,
        chunk.section_title.as_deref(),
        document_title,
        question_count,
    )
    .await;
    if questions.is_empty() {
        return enrichment;
    }

    match embedder.embed(&questions.join(" ")).await {
        Ok(embedding) => enrichment.question_embedding = embedding,
        Err(e) => tracing::warn!(
            "Question embedding failed for chunk {}: {}",
            chunk.chunk_index,
            e
        ),
    }
    enrichment.questions = Some(questions);
    enrichment
}
