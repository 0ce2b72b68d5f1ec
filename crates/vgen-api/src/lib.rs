//! Axum HTTP API server.
//!
//! This crate provides:
//! - Generation submission and status polling endpoints
//! - The task status reconciler (candidate key probing + timeout governor)
//! - Background sweeping of abandoned tasks
//! - Generation history endpoints

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{Reconciler, StaleSweeper};
pub use state::AppState;
