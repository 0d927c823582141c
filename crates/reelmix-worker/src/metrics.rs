//! Job pipeline metrics.

use metrics::{counter, histogram};

use reelmix_models::ErrorCategory;

/// Metric name constants for consistency.
pub mod names {
    /// Jobs accepted at submission.
    pub const JOBS_SUBMITTED_TOTAL: &str = "reelmix_jobs_submitted_total";

    /// Jobs that reached `completed`.
    pub const JOBS_COMPLETED_TOTAL: &str = "reelmix_jobs_completed_total";

    /// Jobs that reached `failed`, by error category.
    pub const JOBS_FAILED_TOTAL: &str = "reelmix_jobs_failed_total";

    /// Stage latency in seconds, by stage.
    pub const STAGE_DURATION_SECONDS: &str = "reelmix_stage_duration_seconds";

    /// Callback deliveries, by outcome.
    pub const CALLBACKS_TOTAL: &str = "reelmix_callbacks_total";
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_job_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

pub fn record_job_failed(category: ErrorCategory) {
    counter!(
        names::JOBS_FAILED_TOTAL,
        "category" => category.as_str()
    )
    .increment(1);
}

pub fn record_stage_duration(stage: &'static str, secs: f64) {
    histogram!(
        names::STAGE_DURATION_SECONDS,
        "stage" => stage
    )
    .record(secs);
}

/// Outcome is one of `delivered`, `rejected`, `timeout`.
pub fn record_callback(outcome: &'static str) {
    counter!(
        names::CALLBACKS_TOTAL,
        "outcome" => outcome
    )
    .increment(1);
}
