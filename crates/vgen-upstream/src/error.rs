//! Upstream error types and error-code classification.

use thiserror::Error;

/// Result type for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Upstream success code.
pub const CODE_SUCCESS: i64 = 10000;
/// Access denied (credentials rejected).
pub const CODE_ACCESS_DENIED: i64 = 50400;
/// Concurrency/rate limit hit.
pub const CODE_CONCURRENCY_LIMIT: i64 = 50430;

/// Errors returned by the upstream generation API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Upstream concurrency limit; the caller should back off and retry.
    #[error("Upstream concurrency limit: {0}")]
    ConcurrencyLimited(String),

    /// Credentials rejected by upstream.
    #[error("Upstream access denied: {0}")]
    AccessDenied(String),

    /// Generic non-success API code. During candidate probing this usually
    /// means the req_key does not match the task.
    #[error("Upstream API error: code={code}, message={message}")]
    Api { code: i64, message: String },

    /// Transport failure.
    #[error("Upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not match any known shape.
    #[error("Failed to decode upstream response: {0}")]
    Decode(String),

    #[error("Upstream client misconfigured: {0}")]
    Config(String),
}

impl UpstreamError {
    /// Classify a non-success API code into the error taxonomy.
    ///
    /// Codes not called out by the upstream contract are kept generic; the
    /// candidate loop treats them as inconclusive and moves on.
    pub fn from_code(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        if code == CODE_CONCURRENCY_LIMIT || is_concurrency_message(&message) {
            UpstreamError::ConcurrencyLimited(message)
        } else if code == CODE_ACCESS_DENIED || message.contains("Access Denied") {
            UpstreamError::AccessDenied(message)
        } else {
            UpstreamError::Api { code, message }
        }
    }

    /// True when the caller should back off instead of trying other keys.
    pub fn is_concurrency_limit(&self) -> bool {
        matches!(self, UpstreamError::ConcurrencyLimited(_))
    }
}

fn is_concurrency_message(message: &str) -> bool {
    message.contains("Concurrent Limit") || message.to_lowercase().contains("concurrent")
}
