//! Shared data models for the Reelmix overlay compositor.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their lifecycle status and terminal outcomes
//! - Submission parameters with their defaults
//! - Encoding configuration for the final render
//! - Completion notifications sent to caller callbacks

pub mod encoding;
pub mod job;
pub mod job_status;
pub mod notification;
pub mod outcome;
pub mod params;

// Re-export common types
pub use encoding::EncodingConfig;
pub use job::{Job, JobId};
pub use job_status::JobStatus;
pub use notification::CompletionNotification;
pub use outcome::{ErrorCategory, JobFailure, JobResult};
pub use params::{AssetInputs, JobParameters, ParameterError, ParameterResult};
