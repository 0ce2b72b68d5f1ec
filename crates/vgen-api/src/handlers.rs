//! HTTP handlers.

pub mod generate;
pub mod health;
pub mod history;
pub mod status;

pub use health::health;
