//! Job record storage.
//!
//! Each job is written only by the task that owns it; any number of status
//! readers may run concurrently. Terminal records are never overwritten.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use reelmix_models::{Job, JobId};

use crate::error::{WorkerError, WorkerResult};

/// Key-value store of job records.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Store a new job. Fails if the id is already taken.
    async fn insert(&self, job: Job) -> WorkerResult<()>;

    /// Current snapshot of a job.
    async fn get(&self, id: &JobId) -> WorkerResult<Option<Job>>;

    /// Replace an existing record. Fails with [`WorkerError::TerminalJob`]
    /// when the stored record is already terminal.
    async fn save(&self, job: Job) -> WorkerResult<()>;

    /// Number of stored jobs.
    async fn len(&self) -> usize;
}

/// Process-local repository.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: Job) -> WorkerResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(WorkerError::unexpected(format!(
                "job id {} already exists",
                job.id
            )));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> WorkerResult<Option<Job>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn save(&self, job: Job) -> WorkerResult<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            None => Err(WorkerError::JobNotFound(job.id)),
            Some(existing) if existing.is_terminal() => Err(WorkerError::TerminalJob(job.id)),
            Some(existing) => {
                *existing = job;
                Ok(())
            }
        }
    }

    async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelmix_models::{ErrorCategory, JobFailure, JobParameters, JobStatus};

    fn job() -> Job {
        Job::new(JobParameters::new("main.mp4", "s1.mp4"))
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = InMemoryJobRepository::new();
        let job = job();
        let id = job.id.clone();

        repo.insert(job).await.unwrap();
        assert_eq!(repo.len().await, 1);
        assert_eq!(repo.get(&id).await.unwrap().unwrap().status, JobStatus::Queued);
        assert!(repo.get(&JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let repo = InMemoryJobRepository::new();
        let job = job();
        repo.insert(job.clone()).await.unwrap();
        assert!(repo.insert(job).await.is_err());
    }

    #[tokio::test]
    async fn test_save_unknown_job() {
        let repo = InMemoryJobRepository::new();
        assert!(matches!(
            repo.save(job()).await,
            Err(WorkerError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_terminal_record_is_not_overwritten() {
        let repo = InMemoryJobRepository::new();
        let job = job();
        let id = job.id.clone();
        repo.insert(job.clone()).await.unwrap();

        let failed = job
            .start()
            .fail(JobFailure::new(ErrorCategory::RenderFailed, "exit 1"));
        repo.save(failed.clone()).await.unwrap();

        let mut tampered = failed.clone();
        tampered.status = JobStatus::Completed;
        assert!(matches!(
            repo.save(tampered).await,
            Err(WorkerError::TerminalJob(_))
        ));
        assert_eq!(repo.get(&id).await.unwrap().unwrap(), failed);
    }
}
