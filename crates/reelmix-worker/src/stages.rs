//! Pipeline stage seams and their production implementations.
//!
//! The orchestrator only talks to these traits, so tests can swap in
//! in-process fakes without FFmpeg or network access.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use reelmix_media::{probe_duration, render, RenderOutput, RenderRequest};
use reelmix_models::CompletionNotification;
use reelmix_storage::{PublishedAsset, R2Client};

use crate::error::{WorkerError, WorkerResult};

/// Reads the duration of the primary asset.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn probe(&self, asset: &str) -> WorkerResult<f64>;
}

/// Renders a composite to local disk.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: RenderRequest) -> WorkerResult<RenderOutput>;
}

/// Uploads a rendered composite to the asset store.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        artifact: &Path,
        folder: &str,
        public_id: &str,
    ) -> WorkerResult<PublishedAsset>;
}

/// Delivers completion notifications to a callback target.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, target: &str, notification: &CompletionNotification) -> WorkerResult<()>;
}

/// FFprobe-backed duration probe.
#[derive(Debug, Clone)]
pub struct FfprobeDurationProbe {
    timeout: Duration,
}

impl FfprobeDurationProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn probe(&self, asset: &str) -> WorkerResult<f64> {
        probe_duration(asset, self.timeout)
            .await
            .map_err(WorkerError::from_probe)
    }
}

/// FFmpeg-backed renderer.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRenderer;

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(&self, request: RenderRequest) -> WorkerResult<RenderOutput> {
        let output = request.output.display().to_string();
        render(&request, move |progress| {
            debug!(
                output = %output,
                out_time_ms = progress.out_time_ms,
                speed = progress.speed,
                "Render progress"
            );
        })
        .await
        .map_err(WorkerError::from_render)
    }
}

/// R2-backed publisher.
#[derive(Clone)]
pub struct R2Publisher {
    client: R2Client,
}

impl R2Publisher {
    pub fn new(client: R2Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Publisher for R2Publisher {
    async fn publish(
        &self,
        artifact: &Path,
        folder: &str,
        public_id: &str,
    ) -> WorkerResult<PublishedAsset> {
        self.client
            .publish(artifact, folder, public_id)
            .await
            .map_err(WorkerError::from_publish)
    }
}
