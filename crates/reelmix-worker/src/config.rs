//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use reelmix_models::JobId;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory for rendered artifacts awaiting upload
    pub work_dir: PathBuf,
    /// Maximum concurrent FFmpeg renders across all jobs
    pub max_concurrent_renders: usize,
    /// FFmpeg is killed after this long
    pub render_timeout: Duration,
    /// FFprobe is killed after this long
    pub probe_timeout: Duration,
    /// Completion callbacks are abandoned after this long
    pub callback_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/reelmix"),
            max_concurrent_renders: 2,
            render_timeout: Duration::from_secs(3600), // 1 hour
            probe_timeout: Duration::from_secs(60),
            callback_timeout: Duration::from_secs(10),
        }
    }
}

fn env_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(key)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            max_concurrent_renders: std::env::var("WORKER_MAX_RENDERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_renders),
            render_timeout: env_secs("WORKER_RENDER_TIMEOUT", 3600),
            probe_timeout: env_secs("WORKER_PROBE_TIMEOUT", 60),
            callback_timeout: env_secs("WORKER_CALLBACK_TIMEOUT", 10),
        }
    }

    /// Local path of a job's rendered composite.
    pub fn artifact_path(&self, job_id: &JobId) -> PathBuf {
        self.work_dir.join(format!("{}.mp4", job_id))
    }
}
