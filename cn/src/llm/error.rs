//! LLM error types

use std::time::Duration;
use thiserror::Error;

/// Errors from LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited (429), retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Check if this is a rate limit / quota error
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
            || matches!(self, LlmError::ApiError { status: 429, .. })
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => *status == 429 || *status >= 500,
            LlmError::Network(_) => true,
            LlmError::Timeout(_) => true,
            LlmError::InvalidResponse(_) => false,
            LlmError::NotConfigured(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_classification() {
        assert!(
            LlmError::RateLimited {
                retry_after: Duration::from_secs(60)
            }
            .is_rate_limit()
        );
        assert!(
            LlmError::ApiError {
                status: 429,
                message: "too many requests".to_string()
            }
            .is_rate_limit()
        );
        assert!(
            !LlmError::ApiError {
                status: 500,
                message: "server error".to_string()
            }
            .is_rate_limit()
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(
            LlmError::ApiError {
                status: 503,
                message: "overloaded".to_string()
            }
            .is_retryable()
        );
        assert!(LlmError::Timeout(Duration::from_secs(120)).is_retryable());
        assert!(
            !LlmError::ApiError {
                status: 400,
                message: "bad request".to_string()
            }
            .is_retryable()
        );
        assert!(!LlmError::InvalidResponse("empty".to_string()).is_retryable());
        assert!(!LlmError::NotConfigured("no key".to_string()).is_retryable());
    }

    #[test]
    fn test_display_mentions_status_code() {
        // The executor's quota predicate matches on "429" in the message.
        let err = LlmError::RateLimited {
            retry_after: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("429"));
    }
}
