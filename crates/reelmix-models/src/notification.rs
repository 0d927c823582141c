//! Completion notification sent to a job's callback target.

use serde::{Deserialize, Serialize};

use crate::{Job, JobFailure, JobId, JobResult, JobStatus};

/// Message posted to the callback target once a job is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionNotification {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
}

impl CompletionNotification {
    /// Build the notification for a terminal job; `None` while it is still running.
    pub fn from_job(job: &Job) -> Option<Self> {
        if !job.is_terminal() {
            return None;
        }
        Some(Self {
            job_id: job.id.clone(),
            status: job.status,
            result: job.result.clone(),
            error: job.failure.clone(),
        })
    }
}
