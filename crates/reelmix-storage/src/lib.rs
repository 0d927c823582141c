//! Cloudflare R2 storage client.
//!
//! This crate provides:
//! - An S3-compatible client configured for R2
//! - Publishing of rendered composites under dated, overwrite-safe keys
//! - A bucket connectivity check for readiness probes

pub mod client;
pub mod error;
pub mod publish;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use publish::{dated_folder, object_key, PublishedAsset, COMPOSITE_CONTENT_TYPE};
