//! Overlay scheduling and FFmpeg execution for composite reels.
//!
//! This crate provides:
//! - Insertion schedule computation
//! - A typed filter-graph model and the overlay graph compiler
//! - FFmpeg command building and progress parsing from `-progress pipe:2`
//! - Duration probing with FFprobe

pub mod command;
pub mod error;
pub mod graph;
pub mod probe;
pub mod progress;
pub mod render;
pub mod schedule;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use graph::{compile_graph, FilterGraph, Geometry, GraphParams, NodeKind, StreamLabel, Track};
pub use probe::probe_duration;
pub use progress::FfmpegProgress;
pub use render::{render, RenderOutput, RenderRequest};
pub use schedule::{compute_schedule, Schedule, MAX_CANDIDATES};
