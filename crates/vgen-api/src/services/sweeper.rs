//! Background service for failing timed-out generation tasks.
//!
//! The reconciler only times out tasks that a caller still polls. This
//! service sweeps the rest so abandoned tasks do not sit in `processing`
//! forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use vgen_history::HistoryStore;

/// Stale task sweeper service.
pub struct StaleSweeper {
    history: Arc<dyn HistoryStore>,
    timeout: chrono::Duration,
    interval: Duration,
    enabled: bool,
}

impl StaleSweeper {
    /// Create a new sweeper.
    pub fn new(
        history: Arc<dyn HistoryStore>,
        timeout: chrono::Duration,
        interval_secs: u64,
        enabled: bool,
    ) -> Self {
        Self {
            history,
            timeout,
            interval: Duration::from_secs(interval_secs),
            enabled,
        }
    }

    /// Start the background sweep loop.
    ///
    /// This function runs indefinitely and should be spawned as a background task.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Stale task sweeping is disabled");
            return;
        }

        info!("Starting stale task sweeper (interval: {:?})", self.interval);

        let mut ticker = interval(self.interval);

        loop {
            ticker.tick().await;

            if let Err(e) = self.history.sweep_timed_out(self.timeout).await {
                error!("Stale task sweep error: {}", e);
            }
        }
    }

    /// Run a single sweep (for testing or manual invocation).
    pub async fn sweep_once(&self) -> Result<u32, vgen_history::HistoryError> {
        self.history.sweep_timed_out(self.timeout).await
    }
}
