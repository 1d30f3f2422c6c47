//! Error types for cloud provider calls

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// Transport-level failure (connect, timeout, body read)
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("provider returned HTTP {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// A resource referenced mid-fetch disappeared
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Identifier rejected before any call was made
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Response body did not match the expected schema
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// Provider temporarily unreachable
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The graph changed between the calls of one fetch cycle
    #[error("inconsistent resource graph: {0}")]
    Inconsistent(String),
}

impl ProviderError {
    /// Whether the poll loop may retry at the next tick.
    ///
    /// Network failures, timeouts, 408/429 and 5xx are transient. Authentication,
    /// authorization, bad identifiers and undecodable bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(e) => !(e.is_decode() || e.is_builder()),
            Self::Status { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            Self::NotFound(_) | Self::Unavailable(_) | Self::Inconsistent(_) => true,
            Self::InvalidIdentifier(_) | Self::Malformed(_) => false,
        }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Reject identifiers that cannot name a provider resource
pub fn validate_id(id: &str) -> ProviderResult<()> {
    if id.is_empty() || id.contains('/') || id.chars().any(char::is_whitespace) {
        return Err(ProviderError::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ProviderError {
        ProviderError::Status {
            status: code,
            url: "http://provider/loadbalancers/x".to_string(),
            body: String::new(),
        }
    }

    #[test]
    fn test_status_classification() {
        for code in [408, 429, 500, 502, 503, 504] {
            assert!(status(code).is_retryable(), "{code} should be retryable");
        }
        for code in [400, 401, 403, 405, 422] {
            assert!(!status(code).is_retryable(), "{code} should be fatal");
        }
    }

    #[test]
    fn test_other_classification() {
        assert!(ProviderError::NotFound("pool p-1".into()).is_retryable());
        assert!(ProviderError::Unavailable("connection reset".into()).is_retryable());
        assert!(!ProviderError::InvalidIdentifier("".into()).is_retryable());
        assert!(!ProviderError::Malformed("missing listeners".into()).is_retryable());
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("5f1d3c2a-lb").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("a b").is_err());
    }
}
