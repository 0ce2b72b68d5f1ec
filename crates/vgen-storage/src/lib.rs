//! S3-compatible object storage.
//!
//! This crate provides:
//! - A thin S3 client for video uploads
//! - Best-effort re-hosting of upstream video URLs into our bucket

pub mod client;
pub mod error;
pub mod rehost;

pub use client::{ObjectStore, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use rehost::VideoRehoster;
