//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use reelmix_models::EncodingConfig;

use crate::error::{MediaError, MediaResult};
use crate::graph::FilterGraph;
use crate::progress::FfmpegProgress;

/// Bytes of FFmpeg diagnostics kept for error reports.
pub const STDERR_TAIL_BYTES: usize = 4096;

/// Builder for multi-input FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Inputs in `-i` order; paths or URLs
    inputs: Vec<String>,
    output: PathBuf,
    filter_complex: Option<String>,
    /// `-map` specifiers in order
    maps: Vec<String>,
    output_args: Vec<String>,
    overwrite: bool,
}

impl FfmpegCommand {
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            filter_complex: None,
            maps: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Add an input. Its index is the number of inputs added before it.
    pub fn input(mut self, source: impl Into<String>) -> Self {
        self.inputs.push(source.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the raw filter complex text.
    pub fn filter_complex(mut self, filter: impl Into<String>) -> Self {
        self.filter_complex = Some(filter.into());
        self
    }

    /// Map a stream into the output.
    pub fn map(mut self, spec: impl Into<String>) -> Self {
        self.maps.push(spec.into());
        self
    }

    /// Map a stream that may be absent in the input.
    pub fn map_optional(mut self, spec: impl Into<String>) -> Self {
        self.maps.push(format!("{}?", spec.into()));
        self
    }

    /// Use a compiled graph: its text, its terminal video, and the primary
    /// audio when the primary has any.
    pub fn filter_graph(self, graph: &FilterGraph) -> Self {
        self.filter_complex(graph.to_filter_complex())
            .map(graph.terminal_video().map_spec())
            .map_optional(graph.terminal_audio().map_spec())
    }

    pub fn frame_rate(self, fps: f64) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    pub fn encoding(self, encoding: &EncodingConfig) -> Self {
        self.output_args(encoding.to_ffmpeg_args())
    }

    /// Move the moov atom to the front for progressive playback.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push("error".to_string());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());
        args.push("-nostats".to_string());

        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.clone());
        }

        if let Some(filter) = &self.filter_complex {
            args.push("-filter_complex".to_string());
            args.push(filter.clone());
        }

        for map in &self.maps {
            args.push("-map".to_string());
            args.push(map.clone());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Last bytes of the diagnostic lines FFmpeg wrote to stderr.
#[derive(Debug, Default)]
pub struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
    limit: usize,
}

impl StderrTail {
    pub fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            bytes: 0,
            limit,
        }
    }

    pub fn push(&mut self, line: &str) {
        let line: String = if line.len() > self.limit {
            // Keep the end of an oversized line, on a char boundary.
            let mut start = line.len() - self.limit;
            while !line.is_char_boundary(start) {
                start += 1;
            }
            line[start..].to_string()
        } else {
            line.to_string()
        };

        self.bytes += line.len();
        self.lines.push_back(line);
        // Joined length counts one newline between lines.
        while self.lines.len() > 1 && self.bytes + self.lines.len() - 1 > self.limit {
            if let Some(dropped) = self.lines.pop_front() {
                self.bytes -= dropped.len();
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_string(self) -> String {
        Vec::from(self.lines).join("\n")
    }
}

/// Runner for FFmpeg commands with progress tracking and a timeout.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the process when it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run an FFmpeg command, reporting each progress block to the callback.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        let ffmpeg = check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr was not captured"))?;
        let mut reader = BufReader::new(stderr).lines();

        let reader_handle = tokio::spawn(async move {
            let mut current = FfmpegProgress::default();
            let mut tail = StderrTail::new(STDERR_TAIL_BYTES);

            while let Ok(Some(line)) = reader.next_line().await {
                if FfmpegProgress::is_progress_line(&line) {
                    if current.apply_line(&line) {
                        progress_callback(current.clone());
                    }
                } else if !line.trim().is_empty() {
                    tail.push(&line);
                }
            }
            tail
        });

        let result = self.wait_for_completion(&mut child).await;

        let tail = reader_handle.await.unwrap_or_default();
        let status = result?;
        if status.success() {
            return Ok(());
        }

        let stderr = (!tail.is_empty()).then(|| tail.into_string());
        let message = match status.code() {
            Some(code) => format!("FFmpeg exited with status {}", code),
            None => "FFmpeg terminated by signal".to_string(),
        };
        Err(MediaError::ffmpeg_failed(message, stderr, status.code()))
    }

    /// Wait for the child, killing it once the timeout elapses.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!("FFmpeg timed out after {:?}, killing process", limit);
                    let _ = child.kill().await;
                    return Err(MediaError::Timeout(limit.as_secs()));
                }
            },
            None => child.wait().await?,
        };

        Ok(status)
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
