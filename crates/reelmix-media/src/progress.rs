//! Parsing of FFmpeg's `-progress pipe:2` key/value stream.

use serde::{Deserialize, Serialize};

/// Snapshot of an encode, emitted at every `progress=` boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Frames written so far
    pub frame: u64,
    /// Encoding fps
    pub fps: f64,
    /// Output position in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed relative to realtime
    pub speed: f64,
    /// Set once FFmpeg reports `progress=end`
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fold one stderr line into the snapshot.
    ///
    /// Returns true when the line closes a progress block. Lines that are not
    /// progress keys (warnings, errors) are ignored and return false.
    pub fn apply_line(&mut self, line: &str) -> bool {
        let Some((key, value)) = line.trim().split_once('=') else {
            return false;
        };

        match key {
            // Despite the name, out_time_ms is reported in microseconds.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.fps = fps;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                self.is_complete = value == "end";
                return true;
            }
            _ => {}
        }
        false
    }

    /// Whether a stderr line belongs to the progress stream.
    pub fn is_progress_line(line: &str) -> bool {
        matches!(
            line.trim().split_once('=').map(|(k, _)| k),
            Some(
                "frame"
                    | "fps"
                    | "bitrate"
                    | "total_size"
                    | "out_time_us"
                    | "out_time_ms"
                    | "out_time"
                    | "dup_frames"
                    | "drop_frames"
                    | "speed"
                    | "progress"
            )
        ) || line.trim_start().starts_with("stream_")
    }
}
