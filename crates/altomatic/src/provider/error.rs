use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("rate limited by provider (retry-after: {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("model returned no textual output")]
    NoContent,

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Whether the orchestrator may retry the job after backing off.
    /// Everything else is terminal for the job.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. } | ProviderError::Network(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::RateLimited { retry_after: None }.is_retryable());
        assert!(ProviderError::Network("timeout".into()).is_retryable());
        assert!(!ProviderError::Auth("bad key".into()).is_retryable());
        assert!(!ProviderError::Http {
            status: 400,
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!ProviderError::NoContent.is_retryable());
        assert!(!ProviderError::MalformedResponse("missing alt".into()).is_retryable());
    }
}
