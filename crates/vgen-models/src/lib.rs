//! Shared data models for the Vidgen backend.
//!
//! This crate defines:
//! - Generation task records and their status lifecycle
//! - Request-key (req_key) configuration and candidate resolution
//! - The caller-facing status report shape

pub mod generation;
pub mod report;
pub mod req_key;

pub use generation::{frames_for, GenerationRecord, GenerationStatus, TaskId};
pub use report::{
    StatusReport, PROGRESS_DONE, PROGRESS_GENERATING, PROGRESS_QUEUED, PROGRESS_UNKNOWN,
};
pub use req_key::{FrameMode, KeyConfig, ModelVersion, ReqKey, Resolution};
