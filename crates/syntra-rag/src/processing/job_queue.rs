//! Job queue for background document processing
//!
//! Progress lives in memory and finished entries are evicted after a retention
//! period. The document row's `processing_status` is the durable record, and
//! startup requeues anything left unfinished.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Default for how long finished progress stays visible
const FINISHED_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Processing stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Queued,
    Downloading,
    ExtractingMetadata,
    Chunking,
    Embedding,
    Storing,
    Complete,
    Failed,
}

impl ProcessingStage {
    /// Percent reported when the stage starts
    pub fn base_percent(&self) -> u8 {
        match self {
            ProcessingStage::Queued => 0,
            ProcessingStage::Downloading => 10,
            ProcessingStage::ExtractingMetadata => 30,
            ProcessingStage::Chunking | ProcessingStage::Embedding => 60,
            ProcessingStage::Storing => 95,
            ProcessingStage::Complete => 100,
            ProcessingStage::Failed => 0,
        }
    }
}

/// Job status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

/// Progress information for one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub document_id: i64,
    pub status: JobStatus,
    pub stage: ProcessingStage,
    pub percent: u8,
    pub message: String,
    /// Attempts started so far, including the current one
    pub attempts: u32,
    pub total_chunks: usize,
    pub chunks_embedded: usize,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl JobProgress {
    pub fn new(document_id: i64) -> Self {
        let now = chrono::Utc::now();
        Self {
            document_id,
            status: JobStatus::Pending,
            stage: ProcessingStage::Queued,
            percent: 0,
            message: "Queued for processing".to_string(),
            attempts: 0,
            total_chunks: 0,
            chunks_embedded: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A processing job: one stored PDF to turn into metadata and chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub document_id: i64,
    /// Object name in the object store
    pub file_path: String,
    /// Zero-based retry counter
    pub attempt: u32,
}

impl Job {
    pub fn new(document_id: i64, file_path: impl Into<String>) -> Self {
        Self {
            document_id,
            file_path: file_path.into(),
            attempt: 0,
        }
    }

    /// The same job, one attempt later
    pub fn retry(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// Job queue feeding the document worker
pub struct JobQueue {
    /// Progress per document
    jobs: Arc<DashMap<i64, JobProgress>>,
    /// Channel for sending jobs to workers
    sender: mpsc::Sender<Job>,
    /// Number of concurrent workers
    worker_count: usize,
    /// Jobs submitted but not yet finished
    queue_size: Arc<AtomicUsize>,
    /// Age after which complete or failed progress is dropped
    retention: Duration,
}

impl JobQueue {
    /// Create a new job queue
    pub fn new(worker_count: usize) -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(1000);

        let queue = Self {
            jobs: Arc::new(DashMap::new()),
            sender,
            worker_count,
            queue_size: Arc::new(AtomicUsize::new(0)),
            retention: FINISHED_RETENTION,
        };

        (queue, receiver)
    }

    /// Override how long finished progress is kept
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Submit a job for processing
    pub async fn submit(&self, job: Job) -> Result<()> {
        let document_id = job.document_id;

        let mut progress = self
            .jobs
            .get(&document_id)
            .map(|p| p.clone())
            .unwrap_or_else(|| JobProgress::new(document_id));
        progress.status = JobStatus::Pending;
        progress.stage = ProcessingStage::Queued;
        progress.percent = 0;
        progress.message = if job.attempt == 0 {
            "Queued for processing".to_string()
        } else {
            format!("Queued for retry {}", job.attempt)
        };
        progress.updated_at = chrono::Utc::now();
        self.jobs.insert(document_id, progress);
        self.queue_size.fetch_add(1, Ordering::SeqCst);

        if let Err(e) = self.sender.send(job).await {
            tracing::error!("Failed to submit job for document {}: {}", document_id, e);
            self.finish(document_id, JobStatus::Failed, Some(e.to_string()));
            return Err(Error::internal(format!("Job queue closed: {}", e)));
        }

        tracing::debug!("Queued document {}", document_id);
        Ok(())
    }

    /// Get progress for a document
    pub fn progress(&self, document_id: i64) -> Option<JobProgress> {
        self.jobs.get(&document_id).map(|p| p.clone())
    }

    /// Mark a job as picked up by a worker
    pub fn start(&self, document_id: i64) {
        if let Some(mut progress) = self.jobs.get_mut(&document_id) {
            progress.status = JobStatus::Processing;
            progress.attempts += 1;
            progress.error = None;
            progress.updated_at = chrono::Utc::now();
        }
    }

    /// Move to a new stage
    pub fn update_stage(&self, document_id: i64, stage: ProcessingStage, message: impl Into<String>) {
        if let Some(mut progress) = self.jobs.get_mut(&document_id) {
            progress.stage = stage;
            progress.percent = stage.base_percent();
            progress.message = message.into();
            progress.updated_at = chrono::Utc::now();
        }
    }

    /// Embedding progress, spread over 60..90 percent
    pub fn update_embedding(&self, document_id: i64, done: usize, total: usize) {
        if let Some(mut progress) = self.jobs.get_mut(&document_id) {
            progress.stage = ProcessingStage::Embedding;
            progress.total_chunks = total;
            progress.chunks_embedded = done;
            progress.percent = embedding_percent(done, total);
            progress.message = format!("Generating embeddings for chunk {}/{}", done, total);
            progress.updated_at = chrono::Utc::now();
        }
    }

    /// Record a terminal status
    pub fn finish(&self, document_id: i64, status: JobStatus, error: Option<String>) {
        if let Some(mut progress) = self.jobs.get_mut(&document_id) {
            progress.status = status;
            progress.updated_at = chrono::Utc::now();
            match status {
                JobStatus::Complete => {
                    progress.stage = ProcessingStage::Complete;
                    progress.percent = 100;
                    progress.message = "Processing complete".to_string();
                    progress.error = None;
                }
                JobStatus::Failed => {
                    progress.stage = ProcessingStage::Failed;
                    progress.message = "Processing failed".to_string();
                    progress.error = error;
                }
                JobStatus::Pending | JobStatus::Processing => {}
            }
        }
        if matches!(status, JobStatus::Complete | JobStatus::Failed) {
            let _ = self
                .queue_size
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            self.prune_finished(self.retention);
        }
    }

    /// Evict complete or failed progress last updated at least `max_age` ago
    pub fn prune_finished(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let now = chrono::Utc::now();
        let before = self.jobs.len();

        self.jobs.retain(|_, progress| {
            let finished = matches!(progress.status, JobStatus::Complete | JobStatus::Failed);
            !(finished && now - progress.updated_at >= max_age)
        });

        let evicted = before.saturating_sub(self.jobs.len());
        if evicted > 0 {
            tracing::debug!("Evicted {} finished jobs from progress tracking", evicted);
        }
        evicted
    }

    /// Drop progress for a deleted document
    pub fn forget(&self, document_id: i64) {
        self.jobs.remove(&document_id);
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        let total = self.jobs.len();
        let pending = self.jobs.iter().filter(|j| j.status == JobStatus::Pending).count();
        let processing = self.jobs.iter().filter(|j| j.status == JobStatus::Processing).count();
        let complete = self.jobs.iter().filter(|j| j.status == JobStatus::Complete).count();
        let failed = self.jobs.iter().filter(|j| j.status == JobStatus::Failed).count();

        QueueStats {
            total_jobs: total,
            queued: self.queue_size.load(Ordering::SeqCst),
            pending,
            processing,
            complete,
            failed,
            worker_count: self.worker_count,
        }
    }
}

fn embedding_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 90;
    }
    let span = 30 * done.min(total) / total;
    (60 + span) as u8
}

/// Queue statistics
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub total_jobs: usize,
    pub queued: usize,
    pub pending: usize,
    pub processing: usize,
    pub complete: usize,
    pub failed: usize,
    pub worker_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_submit_tracks_progress() {
        let (queue, mut receiver) = JobQueue::new(2);
        assert_ok!(queue.submit(Job::new(7, "a.pdf")).await);

        let job = receiver.recv().await.unwrap();
        assert_eq!(job, Job::new(7, "a.pdf"));

        let progress = queue.progress(7).unwrap();
        assert_eq!(progress.status, JobStatus::Pending);
        assert_eq!(progress.stage, ProcessingStage::Queued);
        assert_eq!(queue.stats().queued, 1);
    }

    #[tokio::test]
    async fn test_stage_and_finish() {
        let (queue, _receiver) = JobQueue::new(1);
        queue.submit(Job::new(1, "a.pdf")).await.unwrap();
        queue.start(1);
        queue.update_stage(1, ProcessingStage::ExtractingMetadata, "GROBID");
        assert_eq!(queue.progress(1).unwrap().percent, 30);

        queue.update_embedding(1, 5, 10);
        let progress = queue.progress(1).unwrap();
        assert_eq!(progress.percent, 75);
        assert_eq!(progress.chunks_embedded, 5);

        queue.finish(1, JobStatus::Complete, None);
        let progress = queue.progress(1).unwrap();
        assert_eq!(progress.percent, 100);
        assert_eq!(progress.attempts, 1);

        let stats = queue.stats();
        assert_eq!(stats.complete, 1);
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn test_retry_keeps_attempt_count() {
        let (queue, _receiver) = JobQueue::new(1);
        let job = Job::new(3, "b.pdf");
        queue.submit(job.clone()).await.unwrap();
        queue.start(3);
        queue.finish(3, JobStatus::Failed, Some("GrobidError: down".to_string()));
        assert_eq!(queue.progress(3).unwrap().error.as_deref(), Some("GrobidError: down"));

        queue.submit(job.retry()).await.unwrap();
        queue.start(3);
        let progress = queue.progress(3).unwrap();
        assert_eq!(progress.attempts, 2);
        assert_eq!(progress.error, None);
    }

    #[tokio::test]
    async fn test_closed_channel_fails_submit() {
        let (queue, receiver) = JobQueue::new(1);
        drop(receiver);
        assert_err!(queue.submit(Job::new(9, "c.pdf")).await);
        assert_eq!(queue.progress(9).unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_prune_finished_keeps_active_jobs() {
        let (queue, _receiver) = JobQueue::new(1);
        queue.submit(Job::new(1, "a.pdf")).await.unwrap();
        queue.submit(Job::new(2, "b.pdf")).await.unwrap();
        queue.start(1);
        queue.start(2);

        queue.finish(1, JobStatus::Complete, None);
        assert!(queue.progress(1).is_some());

        assert_eq!(queue.prune_finished(Duration::ZERO), 1);
        assert!(queue.progress(1).is_none());
        assert_eq!(queue.progress(2).unwrap().status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_finish_evicts_with_zero_retention() {
        let (queue, _receiver) = JobQueue::new(1);
        let queue = queue.with_retention(Duration::ZERO);
        queue.submit(Job::new(4, "d.pdf")).await.unwrap();
        queue.start(4);

        queue.finish(4, JobStatus::Failed, Some("StorageError: gone".to_string()));
        assert!(queue.progress(4).is_none());
        assert_eq!(queue.stats().queued, 0);
    }

    #[test]
    fn test_embedding_percent_bounds() {
        assert_eq!(embedding_percent(0, 10), 60);
        assert_eq!(embedding_percent(10, 10), 90);
        assert_eq!(embedding_percent(0, 0), 90);
    }
}
