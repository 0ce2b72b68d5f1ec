//! API configuration.

use vgen_models::ModelVersion;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Minutes an active task may live before it is failed
    pub task_timeout_minutes: i64,
    /// Globally configured generation model version
    pub model_version: ModelVersion,
    /// Whether the background stale sweeper runs
    pub sweeper_enabled: bool,
    /// Seconds between sweeper passes
    pub sweep_interval_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            max_body_size: 10 * 1024 * 1024, // 10MB
            environment: "development".to_string(),
            task_timeout_minutes: 5,
            model_version: ModelVersion::default(),
            sweeper_enabled: true,
            sweep_interval_secs: 60,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10 * 1024 * 1024),
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            task_timeout_minutes: std::env::var("TASK_TIMEOUT_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            model_version: std::env::var("VIDEO_MODEL_VERSION")
                .ok()
                .and_then(|s| ModelVersion::parse(&s))
                .unwrap_or_default(),
            sweeper_enabled: std::env::var("ENABLE_STALE_SWEEPER")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            sweep_interval_secs: std::env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Task timeout as a duration.
    pub fn task_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.task_timeout_minutes)
    }
}
