//! Submission parameters for a composite job.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::EncodingConfig;

/// Default spacing between insertion points (seconds).
pub const DEFAULT_INTERVAL_SECS: f64 = 7.0;
/// Default showcase overlay length (seconds).
pub const DEFAULT_INSERT_LEN_SECS: f64 = 3.0;
/// Default alpha fade duration (seconds).
pub const DEFAULT_FADE_SECS: f64 = 0.5;
/// Default output width (portrait).
pub const DEFAULT_WIDTH: u32 = 720;
/// Default output height (portrait).
pub const DEFAULT_HEIGHT: u32 = 1280;
/// Default output frame rate.
pub const DEFAULT_FRAME_RATE: f64 = 30.0;
/// Default storage folder.
pub const DEFAULT_FOLDER: &str = "reelmix/composites";
/// Highest accepted output frame rate.
pub const MAX_FRAME_RATE: f64 = 240.0;

pub type ParameterResult<T> = Result<T, ParameterError>;

/// Parameter validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("Missing required input: {0}")]
    MissingInput(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ParameterError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Immutable input configuration of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobParameters {
    /// Long primary clip the overlays are composited onto
    #[serde(default)]
    pub primary_asset_ref: Option<String>,

    /// First showcase clip (track A)
    #[serde(default)]
    pub showcase_asset_ref1: Option<String>,

    /// Second showcase clip (track B); track A's clip is reused when absent
    #[serde(default)]
    pub showcase_asset_ref2: Option<String>,

    /// Spacing between insertion points (seconds)
    #[serde(default = "default_interval")]
    pub interval: f64,

    /// Length of each overlay (seconds)
    #[serde(default = "default_insert_len")]
    pub insert_len: f64,

    /// Alpha fade-in/fade-out duration (seconds)
    #[serde(default = "default_fade_sec")]
    pub fade_sec: f64,

    /// Output width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Output height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Output frame rate
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,

    /// Storage folder namespace
    #[serde(default = "default_folder")]
    pub folder: String,

    /// Prefix prepended to the job id to form the published identifier
    #[serde(default)]
    pub public_id_prefix: String,

    /// Endpoint notified once the job reaches a terminal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_target: Option<String>,

    /// Fixed primary duration (seconds); skips the duration probe when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    /// Encoding options for the composite
    #[serde(default)]
    pub encoding: EncodingConfig,
}

fn default_interval() -> f64 {
    DEFAULT_INTERVAL_SECS
}
fn default_insert_len() -> f64 {
    DEFAULT_INSERT_LEN_SECS
}
fn default_fade_sec() -> f64 {
    DEFAULT_FADE_SECS
}
fn default_width() -> u32 {
    DEFAULT_WIDTH
}
fn default_height() -> u32 {
    DEFAULT_HEIGHT
}
fn default_frame_rate() -> f64 {
    DEFAULT_FRAME_RATE
}
fn default_folder() -> String {
    DEFAULT_FOLDER.to_string()
}

impl Default for JobParameters {
    fn default() -> Self {
        Self {
            primary_asset_ref: None,
            showcase_asset_ref1: None,
            showcase_asset_ref2: None,
            interval: DEFAULT_INTERVAL_SECS,
            insert_len: DEFAULT_INSERT_LEN_SECS,
            fade_sec: DEFAULT_FADE_SECS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frame_rate: DEFAULT_FRAME_RATE,
            folder: default_folder(),
            public_id_prefix: String::new(),
            callback_target: None,
            duration: None,
            encoding: EncodingConfig::default(),
        }
    }
}

/// Asset references resolved from validated parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInputs {
    pub primary: String,
    /// One or two distinct showcase sources, track A first.
    pub showcases: Vec<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl JobParameters {
    /// Create parameters with the two mandatory asset references and defaults elsewhere.
    pub fn new(primary: impl Into<String>, showcase: impl Into<String>) -> Self {
        Self {
            primary_asset_ref: Some(primary.into()),
            showcase_asset_ref1: Some(showcase.into()),
            ..Default::default()
        }
    }

    pub fn with_second_showcase(mut self, showcase: impl Into<String>) -> Self {
        self.showcase_asset_ref2 = Some(showcase.into());
        self
    }

    pub fn with_callback(mut self, target: impl Into<String>) -> Self {
        self.callback_target = Some(target.into());
        self
    }

    pub fn with_timing(mut self, interval: f64, insert_len: f64, fade_sec: f64) -> Self {
        self.interval = interval;
        self.insert_len = insert_len;
        self.fade_sec = fade_sec;
        self
    }

    pub fn with_fixed_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Resolve the asset references, failing when a mandatory one is absent.
    ///
    /// Blank strings count as absent.
    pub fn assets(&self) -> ParameterResult<AssetInputs> {
        let primary = non_empty(&self.primary_asset_ref)
            .ok_or(ParameterError::MissingInput("primaryAssetRef"))?;
        let first = non_empty(&self.showcase_asset_ref1)
            .ok_or(ParameterError::MissingInput("showcaseAssetRef1"))?;

        let mut showcases = vec![first.to_string()];
        if let Some(second) = non_empty(&self.showcase_asset_ref2) {
            if second != first {
                showcases.push(second.to_string());
            }
        }

        Ok(AssetInputs {
            primary: primary.to_string(),
            showcases,
        })
    }

    /// Validate timing and geometry before scheduling.
    pub fn validate_timing(&self) -> ParameterResult<()> {
        if !self.interval.is_finite() || self.interval <= 0.0 {
            return Err(ParameterError::invalid_config(format!(
                "interval must be a positive number of seconds, got {}",
                self.interval
            )));
        }
        if !self.insert_len.is_finite() || self.insert_len <= 0.0 {
            return Err(ParameterError::invalid_config(format!(
                "insertLen must be a positive number of seconds, got {}",
                self.insert_len
            )));
        }
        if !self.fade_sec.is_finite() || self.fade_sec < 0.0 || self.fade_sec * 2.0 > self.insert_len
        {
            return Err(ParameterError::invalid_config(format!(
                "fadeSec must be between 0 and insertLen / 2 ({}), got {}",
                self.insert_len / 2.0,
                self.fade_sec
            )));
        }
        if self.width == 0 || self.height == 0 || self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(ParameterError::invalid_config(format!(
                "output geometry must be positive and even, got {}x{}",
                self.width, self.height
            )));
        }
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 || self.frame_rate > MAX_FRAME_RATE
        {
            return Err(ParameterError::invalid_config(format!(
                "frameRate must be in (0, {}], got {}",
                MAX_FRAME_RATE, self.frame_rate
            )));
        }
        if let Some(duration) = self.duration {
            if !duration.is_finite() || duration <= 0.0 {
                return Err(ParameterError::invalid_config(format!(
                    "duration must be a positive number of seconds, got {}",
                    duration
                )));
            }
        }
        Ok(())
    }

    /// Callback target, ignoring blank values.
    pub fn callback_target(&self) -> Option<&str> {
        non_empty(&self.callback_target)
    }
}
