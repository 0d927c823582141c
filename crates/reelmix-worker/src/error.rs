//! Worker error types.

use thiserror::Error;

use reelmix_media::MediaError;
use reelmix_models::{ErrorCategory, JobId, ParameterError};
use reelmix_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Duration probe failed: {0}")]
    ProbeFailed(String),

    #[error("Render failed: {message}")]
    RenderFailed {
        message: String,
        /// Tail of the engine's diagnostics
        diagnostics: Option<String>,
    },

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {0} is terminal and can no longer change")]
    TerminalJob(JobId),

    #[error("Callback failed: {0}")]
    CallbackFailed(String),

    #[error("Unexpected failure: {0}")]
    Unexpected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ParameterError> for WorkerError {
    fn from(err: ParameterError) -> Self {
        match err {
            ParameterError::MissingInput(field) => Self::MissingInput(field.to_string()),
            ParameterError::InvalidConfig(msg) => Self::InvalidConfig(msg),
        }
    }
}

impl WorkerError {
    pub fn probe_failed(msg: impl Into<String>) -> Self {
        Self::ProbeFailed(msg.into())
    }

    pub fn render_failed(msg: impl Into<String>, diagnostics: Option<String>) -> Self {
        Self::RenderFailed {
            message: msg.into(),
            diagnostics,
        }
    }

    pub fn publish_failed(msg: impl Into<String>) -> Self {
        Self::PublishFailed(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    /// Map an error from the duration probe stage.
    pub fn from_probe(err: MediaError) -> Self {
        Self::ProbeFailed(describe(&err))
    }

    /// Map an error from the render stage.
    pub fn from_render(err: MediaError) -> Self {
        let diagnostics = err.diagnostics().map(str::to_string);
        Self::RenderFailed {
            message: err.to_string(),
            diagnostics,
        }
    }

    /// Map an error from the schedule calculator.
    pub fn from_schedule(err: MediaError) -> Self {
        match err {
            MediaError::InvalidConfig(msg) => Self::InvalidConfig(msg),
            other => Self::Unexpected(other.to_string()),
        }
    }

    /// Map an error from the asset publisher.
    pub fn from_publish(err: StorageError) -> Self {
        Self::PublishFailed(err.to_string())
    }

    /// Category reported on the failed job.
    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkerError::MissingInput(_) => ErrorCategory::MissingInput,
            WorkerError::InvalidConfig(_) => ErrorCategory::InvalidConfig,
            WorkerError::ProbeFailed(_) => ErrorCategory::DurationProbeFailed,
            WorkerError::RenderFailed { .. } => ErrorCategory::RenderFailed,
            WorkerError::PublishFailed(_) => ErrorCategory::PublishFailed,
            WorkerError::JobNotFound(_)
            | WorkerError::TerminalJob(_)
            | WorkerError::CallbackFailed(_)
            | WorkerError::Unexpected(_)
            | WorkerError::Io(_) => ErrorCategory::UnexpectedFailure,
        }
    }

    /// Details recorded on the failed job.
    pub fn details(&self) -> String {
        match self {
            WorkerError::RenderFailed {
                message,
                diagnostics: Some(tail),
            } => format!("{}\n{}", message, tail),
            other => other.to_string(),
        }
    }
}

fn describe(err: &MediaError) -> String {
    match err.diagnostics() {
        Some(stderr) if !stderr.is_empty() => format!("{}: {}", err, stderr),
        _ => err.to_string(),
    }
}
