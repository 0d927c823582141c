//! Composite rendering: schedule + graph + inputs into one MP4.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;

use reelmix_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::graph::FilterGraph;
use crate::progress::FfmpegProgress;

/// Everything needed to render one composite.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Primary clip (input 0)
    pub primary: String,
    /// One or two showcase sources (inputs 1 and 2)
    pub showcases: Vec<String>,
    pub graph: FilterGraph,
    pub output: PathBuf,
    pub frame_rate: f64,
    pub encoding: EncodingConfig,
    /// Kill FFmpeg after this long
    pub timeout: Option<Duration>,
}

/// A rendered artifact on local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub elapsed: Duration,
}

/// Assemble the FFmpeg invocation for a request.
pub fn build_render_command(request: &RenderRequest) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(&request.output).input(request.primary.as_str());
    for showcase in &request.showcases {
        cmd = cmd.input(showcase.as_str());
    }
    cmd.filter_graph(&request.graph)
        .frame_rate(request.frame_rate)
        .encoding(&request.encoding)
        .faststart()
}

/// Render the composite and return the artifact.
///
/// The output directory is created if needed. On failure the error carries
/// FFmpeg's exit code and the tail of its diagnostics.
pub async fn render<F>(request: &RenderRequest, progress_callback: F) -> MediaResult<RenderOutput>
where
    F: Fn(FfmpegProgress) + Send + 'static,
{
    if request.showcases.is_empty() || request.showcases.len() > 2 {
        return Err(MediaError::invalid_config(format!(
            "expected one or two showcase sources, got {}",
            request.showcases.len()
        )));
    }
    request.graph.validate()?;

    if let Some(parent) = request.output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    info!(
        "Rendering composite: {} overlays -> {}",
        request.graph.overlay_nodes().count(),
        request.output.display()
    );

    let cmd = build_render_command(request);
    let mut runner = FfmpegRunner::new();
    if let Some(timeout) = request.timeout {
        runner = runner.with_timeout(timeout);
    }

    let started = Instant::now();
    runner.run_with_progress(&cmd, progress_callback).await?;
    let elapsed = started.elapsed();

    let size_bytes = artifact_size(&request.output).await?;
    info!(
        "Composite rendered: {} ({} bytes, {:.1}s)",
        request.output.display(),
        size_bytes,
        elapsed.as_secs_f64()
    );

    Ok(RenderOutput {
        path: request.output.clone(),
        size_bytes,
        elapsed,
    })
}

async fn artifact_size(path: &Path) -> MediaResult<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(meta.len()),
        Ok(_) => Err(MediaError::ffmpeg_failed(
            "FFmpeg produced an empty output file",
            None,
            Some(0),
        )),
        Err(_) => Err(MediaError::FileNotFound(path.to_path_buf())),
    }
}
