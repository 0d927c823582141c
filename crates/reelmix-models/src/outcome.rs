//! Terminal job outcomes: the success payload and the categorized failure.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Error categories surfaced to callers on a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ErrorCategory {
    /// A required asset reference was absent at submission
    MissingInput,
    /// Timing or geometry parameters are out of range
    InvalidConfig,
    /// The duration probe failed or returned an unusable value
    DurationProbeFailed,
    /// The transcoding engine reported failure
    RenderFailed,
    /// The remote asset store rejected or failed the upload
    PublishFailed,
    /// Anything else that surfaced during orchestration
    UnexpectedFailure,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::MissingInput => "MissingInput",
            ErrorCategory::InvalidConfig => "InvalidConfig",
            ErrorCategory::DurationProbeFailed => "DurationProbeFailed",
            ErrorCategory::RenderFailed => "RenderFailed",
            ErrorCategory::PublishFailed => "PublishFailed",
            ErrorCategory::UnexpectedFailure => "UnexpectedFailure",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    /// Public URL of the published composite
    pub url: String,
    /// Identifier assigned by the asset store
    pub public_id: String,
    /// Primary clip duration used for scheduling (seconds)
    pub duration: f64,
    /// Insertion timestamps (seconds)
    pub schedule: Vec<f64>,
    /// Wall time from processing start to publish completion (seconds)
    pub elapsed_secs: f64,
}

/// Payload of a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobFailure {
    pub category: ErrorCategory,
    pub details: String,
}

impl JobFailure {
    pub fn new(category: ErrorCategory, details: impl Into<String>) -> Self {
        Self {
            category,
            details: details.into(),
        }
    }
}
