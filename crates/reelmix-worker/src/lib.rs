//! Composite job orchestration.
//!
//! This crate provides:
//! - The job orchestrator (submit, status, background pipeline)
//! - A pluggable job repository with an in-memory implementation
//! - Stage seams for probing, rendering, publishing and callbacks
//! - Structured job logging and pipeline metrics

pub mod artifact;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod notifier;
pub mod orchestrator;
pub mod repository;
pub mod stages;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use notifier::HttpNotifier;
pub use orchestrator::{Orchestrator, Stages};
pub use repository::{InMemoryJobRepository, JobRepository};
pub use stages::{
    DurationProbe, FfmpegRenderer, FfprobeDurationProbe, Notifier, Publisher, R2Publisher, Renderer,
};
