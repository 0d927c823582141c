//! Application state.

use std::sync::Arc;

use reelmix_storage::R2Client;
use reelmix_worker::{
    FfmpegRenderer, FfprobeDurationProbe, HttpNotifier, InMemoryJobRepository, Orchestrator,
    R2Publisher, Stages, WorkerConfig,
};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: Orchestrator,
    /// Checked by the readiness probe; absent when storage is not wired
    pub storage: Option<Arc<R2Client>>,
}

impl AppState {
    pub fn new(config: ApiConfig, orchestrator: Orchestrator, storage: Option<Arc<R2Client>>) -> Self {
        Self {
            config,
            orchestrator,
            storage,
        }
    }

    /// Build production state: R2 from the environment, FFmpeg stages and
    /// an in-memory job store.
    pub fn from_env(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let worker_config = WorkerConfig::from_env();
        let storage = Arc::new(R2Client::from_env()?);

        let stages = Stages {
            probe: Arc::new(FfprobeDurationProbe::new(worker_config.probe_timeout)),
            renderer: Arc::new(FfmpegRenderer),
            publisher: Arc::new(R2Publisher::new(R2Client::clone(&storage))),
            notifier: Arc::new(HttpNotifier::new(worker_config.callback_timeout)?),
        };

        let orchestrator = Orchestrator::new(
            worker_config,
            Arc::new(InMemoryJobRepository::new()),
            stages,
        );

        Ok(Self::new(config, orchestrator, Some(storage)))
    }
}
