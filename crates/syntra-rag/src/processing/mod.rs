//! Background processing with job queue and progress tracking

mod job_queue;
mod worker;

pub use job_queue::{Job, JobProgress, JobQueue, JobStatus, ProcessingStage, QueueStats};
pub use worker::DocumentWorker;
