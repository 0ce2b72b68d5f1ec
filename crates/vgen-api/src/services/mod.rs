//! Background and domain services.

pub mod reconciler;
pub mod sweeper;

pub use reconciler::Reconciler;
pub use sweeper::StaleSweeper;
