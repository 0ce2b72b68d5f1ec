//! Application state.

use std::sync::Arc;

use tracing::{info, warn};

use vgen_history::{HistoryStore, MemoryHistory, SqliteHistory};
use vgen_models::KeyConfig;
use vgen_storage::{ObjectStore, VideoRehoster};
use vgen_upstream::UpstreamClient;

use crate::config::ApiConfig;
use crate::services::Reconciler;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub history: Arc<dyn HistoryStore>,
    pub upstream: Arc<UpstreamClient>,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let keys = KeyConfig::new(config.model_version);
        let upstream = Arc::new(UpstreamClient::from_env()?);

        let history: Arc<dyn HistoryStore> = match std::env::var("DATABASE_URL") {
            Ok(url) => Arc::new(SqliteHistory::new(&url).await?),
            Err(_) => {
                warn!("DATABASE_URL not set, history will not survive restarts");
                Arc::new(MemoryHistory::new())
            }
        };

        let rehoster = match std::env::var("S3_ENDPOINT_URL") {
            Ok(_) => {
                let store = ObjectStore::from_env()?;
                info!("Video re-hosting enabled");
                Some(Arc::new(VideoRehoster::new(store)?))
            }
            Err(_) => {
                info!("S3_ENDPOINT_URL not set, completed videos keep upstream URLs");
                None
            }
        };

        let reconciler = Arc::new(Reconciler::new(
            keys,
            Arc::clone(&history),
            Arc::clone(&upstream),
            rehoster,
            config.task_timeout(),
        ));

        Ok(Self {
            config,
            history,
            upstream,
            reconciler,
        })
    }
}
