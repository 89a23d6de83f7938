//! Type definitions for the proxy module

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Maximum size for inbound request bodies in bytes
#[nutype(
    derive(
        Clone,
        Copy,
        Debug,
        Display,
        PartialEq,
        Eq,
        Deserialize,
        Serialize,
        TryFrom,
        AsRef
    ),
    validate(predicate = |size: &usize| *size > 0),
)]
pub struct RequestSizeLimit(usize);

/// Proxy configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Maximum inbound request body size in bytes
    pub max_request_size: RequestSizeLimit,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_request_size: RequestSizeLimit::try_new(10 * 1024 * 1024).expect("10MB is valid"),
        }
    }
}

/// Errors raised while building or executing an outbound call
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid target URL: {0}")]
    InvalidTargetUrl(String),

    #[error("Invalid header: {name}")]
    InvalidHeader { name: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Body collection error: {0}")]
    Body(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] http::Error),

    #[error("Request timeout after {0:?}")]
    RequestTimeout(Duration),
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_config_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(*config.max_request_size.as_ref(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_request_size_limit_must_be_positive() {
        assert!(RequestSizeLimit::try_new(0).is_err());
        assert!(RequestSizeLimit::try_new(1).is_ok());
    }

    #[test]
    fn test_error_messages() {
        let error = ProxyError::InvalidTargetUrl("nope".to_string());
        assert_eq!(error.to_string(), "Invalid target URL: nope");

        let error = ProxyError::RequestTimeout(Duration::from_millis(1500));
        assert!(error.to_string().contains("1.5s"));
    }
}
