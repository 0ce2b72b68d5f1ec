//! Client for the upstream generative-video API.
//!
//! This crate provides:
//! - Task submission and status queries (signed HTTP requests)
//! - Normalization of heterogeneous upstream response shapes
//! - Classification of upstream error codes

pub mod client;
pub mod error;
pub mod probe;
pub mod signing;

pub use client::{SubmitRequest, UpstreamClient, UpstreamConfig};
pub use error::{UpstreamError, UpstreamResult};
pub use probe::TaskProbe;
