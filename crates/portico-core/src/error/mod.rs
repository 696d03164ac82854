//! Error types and result aliases for Portico operations.
//!
//! Provides a unified error type covering discovery, service registration,
//! HTTP and configuration failures. Errors are `Clone` so a single failed
//! shared operation can be handed to every caller that waited on it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Boxed error source that can be shared between waiters
pub type SharedSource = Arc<dyn std::error::Error + Send + Sync>;

/// Unified error type for all Portico operations
#[derive(Error, Debug, Clone)]
pub enum PorticoError {
    // Discovery errors
    #[error("Timed out after {}ms waiting for {awaited}", .waited.as_millis())]
    ReadinessTimeout { awaited: String, waited: Duration },

    // Service registry errors
    #[error("Service '{name}' is not registered")]
    ServiceNotRegistered { name: String },

    #[error("Service '{name}' is already registered")]
    DuplicateService { name: String },

    #[error("Service '{name}' failed to initialize: {reason}")]
    ServiceInit { name: String, reason: String },

    #[error("Service '{name}' is not a {expected}")]
    ServiceTypeMismatch { name: String, expected: &'static str },

    // HTTP errors
    #[error("{message}")]
    HttpStatus {
        status: u16,
        status_text: String,
        message: String,
    },

    #[error("Request timed out after {}ms: {method} {url}", .timeout.as_millis())]
    RequestTimeout {
        method: String,
        url: String,
        timeout: Duration,
    },

    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<SharedSource>,
    },

    #[error("Failed to decode response body: {message}")]
    Decode { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    // Config errors
    #[error("Failed to parse portico.toml: {message}")]
    TomlParse { message: String },

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    // Runtime errors
    #[error("Shared operation did not complete: {message}")]
    Interrupted { message: String },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Arc<std::io::Error>,
    },
}

/// Coarse classification used by callers to branch on failures
/// without matching message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ReadinessTimeout,
    ServiceNotRegistered,
    Service,
    HttpStatus,
    RequestTimeout,
    Transport,
    Decode,
    InvalidRequest,
    Config,
    Interrupted,
    Io,
}

/// Result type alias for Portico operations
pub type PorticoResult<T> = Result<T, PorticoError>;

impl PorticoError {
    /// Create a transport error from any error type
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Create an HTTP status error with the standard message
    pub fn http_status(status: u16, status_text: impl Into<String>) -> Self {
        let status_text = status_text.into();
        Self::HttpStatus {
            status,
            message: format!("HTTP error {}: {}", status, status_text),
            status_text,
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Create a configuration validation error
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PorticoError::ReadinessTimeout { .. } => ErrorKind::ReadinessTimeout,
            PorticoError::ServiceNotRegistered { .. } => ErrorKind::ServiceNotRegistered,
            PorticoError::DuplicateService { .. }
            | PorticoError::ServiceInit { .. }
            | PorticoError::ServiceTypeMismatch { .. } => ErrorKind::Service,
            PorticoError::HttpStatus { .. } => ErrorKind::HttpStatus,
            PorticoError::RequestTimeout { .. } => ErrorKind::RequestTimeout,
            PorticoError::Transport { .. } => ErrorKind::Transport,
            PorticoError::Decode { .. } => ErrorKind::Decode,
            PorticoError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            PorticoError::TomlParse { .. } | PorticoError::ConfigValidation { .. } => {
                ErrorKind::Config
            },
            PorticoError::Interrupted { .. } => ErrorKind::Interrupted,
            PorticoError::Io { .. } => ErrorKind::Io,
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            PorticoError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            PorticoError::ReadinessTimeout { .. }
            | PorticoError::RequestTimeout { .. }
            | PorticoError::Transport { .. } => true,
            PorticoError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Get a user-friendly suggestion for presenting this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            PorticoError::ReadinessTimeout { .. } => {
                Some("Service unavailable, please retry or reload the page")
            },
            PorticoError::ServiceNotRegistered { .. } => {
                Some("Register the service with the service manager before requesting it")
            },
            PorticoError::HttpStatus { .. } => Some("Request failed, check the request and try again"),
            PorticoError::RequestTimeout { .. } | PorticoError::Transport { .. } => {
                Some("Check your network connection and try again")
            },
            PorticoError::TomlParse { .. } | PorticoError::ConfigValidation { .. } => {
                Some("Fix the highlighted setting in portico.toml")
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_kind_distinguishes_http_failures() {
        let status = PorticoError::http_status(404, "Not Found");
        let timeout = PorticoError::RequestTimeout {
            method: "GET".to_string(),
            url: "/games".to_string(),
            timeout: Duration::from_secs(8),
        };
        let transport = PorticoError::transport(
            "connection refused",
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        );

        assert_eq!(status.kind(), ErrorKind::HttpStatus);
        assert_eq!(timeout.kind(), ErrorKind::RequestTimeout);
        assert_eq!(transport.kind(), ErrorKind::Transport);
        assert_eq!(status.status(), Some(404));
        assert_eq!(status.to_string(), "HTTP error 404: Not Found");
    }

    #[test]
    fn test_transport_error_keeps_source() {
        let err = PorticoError::transport(
            "connection reset",
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer"),
        );
        let cloned = err.clone();

        assert_eq!(cloned.source().map(|s| s.to_string()), Some("reset by peer".to_string()));
    }

    #[test]
    fn test_readiness_timeout_message() {
        let err = PorticoError::ReadinessTimeout {
            awaited: "shared HTTP service".to_string(),
            waited: Duration::from_millis(500),
        };

        assert_eq!(err.to_string(), "Timed out after 500ms waiting for shared HTTP service");
        assert!(err.is_retryable());
        assert!(err.suggestion().unwrap().contains("retry"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PorticoError::http_status(503, "Service Unavailable").is_retryable());
        assert!(!PorticoError::http_status(400, "Bad Request").is_retryable());
        assert!(!PorticoError::ServiceNotRegistered { name: "cache".to_string() }.is_retryable());
    }
}
