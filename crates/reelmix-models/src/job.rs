//! Job record and its lifecycle transitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{JobFailure, JobParameters, JobResult, JobStatus};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A composite job.
///
/// Transition methods are no-ops once the job is terminal, so a completed or
/// failed record never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Lifecycle status
    pub status: JobStatus,

    /// Advisory progress (0-100), never decreases
    pub progress: u8,

    /// Input configuration
    pub parameters: JobParameters,

    /// Success payload, present only when completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,

    /// Failure payload, present only when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Processing start timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Terminal transition timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(parameters: JobParameters) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::Queued,
            progress: 0,
            parameters,
            result: None,
            failure: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Start processing the job.
    pub fn start(mut self) -> Self {
        if !self.status.can_transition_to(JobStatus::Processing) {
            return self;
        }
        let now = Utc::now();
        self.status = JobStatus::Processing;
        self.started_at.get_or_insert(now);
        self.updated_at = now;
        self
    }

    /// Raise progress. Lower values are ignored.
    pub fn with_progress(mut self, progress: u8) -> Self {
        if self.is_terminal() {
            return self;
        }
        let progress = progress.min(100);
        if progress > self.progress {
            self.progress = progress;
            self.updated_at = Utc::now();
        }
        self
    }

    /// Mark job as completed.
    pub fn complete(mut self, result: JobResult) -> Self {
        if !self.status.can_transition_to(JobStatus::Completed) {
            return self;
        }
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.completed_at = Some(now);
        self.updated_at = now;
        self
    }

    /// Mark job as failed.
    pub fn fail(mut self, failure: JobFailure) -> Self {
        if !self.status.can_transition_to(JobStatus::Failed) {
            return self;
        }
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.failure = Some(failure);
        self.completed_at = Some(now);
        self.updated_at = now;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCategory;

    fn sample_result() -> JobResult {
        JobResult {
            url: "https://cdn.example.com/x.mp4".into(),
            public_id: "x".into(),
            duration: 20.0,
            schedule: vec![7.0, 14.0, 17.0],
            elapsed_secs: 2.0,
        }
    }

    #[test]
    fn test_job_creation() {
        let job = Job::new(JobParameters::new("main", "s1"));
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert!(job.result.is_none());
        assert!(job.failure.is_none());
        assert_eq!(job.id.as_str().len(), 32);
    }

    #[test]
    fn test_job_state_transitions() {
        let job = Job::new(JobParameters::new("main", "s1"));

        let started = job.start();
        assert_eq!(started.status, JobStatus::Processing);
        assert!(started.started_at.is_some());

        let completed = started.with_progress(50).complete(sample_result());
        assert_eq!(completed.status, JobStatus::Completed);
        assert_eq!(completed.progress, 100);
        assert!(completed.completed_at.is_some());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let job = Job::new(JobParameters::new("main", "s1"))
            .start()
            .with_progress(50)
            .with_progress(20);
        assert_eq!(job.progress, 50);
    }

    #[test]
    fn test_terminal_job_is_immutable() {
        let failure = JobFailure::new(ErrorCategory::RenderFailed, "boom");
        let failed = Job::new(JobParameters::new("main", "s1"))
            .start()
            .fail(failure.clone());

        let after = failed
            .clone()
            .with_progress(99)
            .complete(sample_result())
            .fail(JobFailure::new(ErrorCategory::PublishFailed, "other"));

        assert_eq!(after, failed);
        assert_eq!(after.failure, Some(failure));
        assert!(after.result.is_none());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let job = Job::new(JobParameters::new("main", "s1"));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["parameters"]["primaryAssetRef"], "main");
        assert!(json.get("result").is_none());
        assert!(json.get("createdAt").is_some());
    }
}
