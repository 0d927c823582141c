//! Duration probing with FFprobe.

use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::command::{check_ffprobe, StderrTail, STDERR_TAIL_BYTES};
use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output, reduced to the container duration.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Read the container duration of an asset in seconds.
///
/// `asset` may be a local path or any URL FFprobe can open.
pub async fn probe_duration(asset: &str, timeout: Duration) -> MediaResult<f64> {
    let ffprobe = check_ffprobe()?;
    debug!(asset = %asset, "Probing duration");

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ])
        .arg(asset)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, output)
        .await
        .map_err(|_| MediaError::Timeout(timeout.as_secs()))??;

    if !output.status.success() {
        return Err(probe_failure(output.status.code(), &output.stderr));
    }

    parse_duration(&output.stdout)
}

/// Failure carrying only the tail of FFprobe's diagnostics.
fn probe_failure(code: Option<i32>, stderr: &[u8]) -> MediaError {
    let mut tail = StderrTail::new(STDERR_TAIL_BYTES);
    for line in String::from_utf8_lossy(stderr).lines() {
        if !line.trim().is_empty() {
            tail.push(line);
        }
    }

    MediaError::FfprobeFailed {
        message: format!("FFprobe exited with status {:?}", code),
        stderr: (!tail.is_empty()).then(|| tail.into_string()),
    }
}

/// Extract a positive, finite duration from FFprobe JSON.
fn parse_duration(stdout: &[u8]) -> MediaResult<f64> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let raw = probe
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| MediaError::invalid_duration("FFprobe reported no duration"))?;

    let duration: f64 = raw
        .trim()
        .parse()
        .map_err(|_| MediaError::invalid_duration(format!("unparseable duration {:?}", raw)))?;

    if !duration.is_finite() || duration <= 0.0 {
        return Err(MediaError::invalid_duration(format!(
            "duration must be positive, got {}",
            duration
        )));
    }
    Ok(duration)
}
