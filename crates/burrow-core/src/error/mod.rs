//! Error types and result aliases for Burrow operations.
//!
//! Provides a unified error type that covers every failure the proxy core
//! can report to the orchestrator. None of these are fatal to the process.

use thiserror::Error;

/// Unified error type for all Burrow operations
#[derive(Error, Debug)]
pub enum BurrowError {
    // Lookup errors
    #[error("'{resource}' not found")]
    NotFound { resource: String },

    #[error("'{resource}' already exists")]
    Conflict { resource: String },

    // Uplink errors
    #[error("Uplink {host} is offline")]
    Offline { host: String },

    #[error("Bad uplink status code {status} for {url}")]
    BadStatus { status: u16, url: String },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Transfer aborted: {message}")]
    Aborted { message: String },

    // Integrity errors
    #[error("Content length mismatch: expected {expected} bytes, received {actual}")]
    ContentMismatch { expected: u64, actual: u64 },

    // Storage errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Auth errors
    #[error("Uplink auth misconfigured: {reason}")]
    AuthConfig { reason: String },

    // Metadata errors
    #[error("Cannot resolve the latest version of '{name}': it has no versions")]
    EmptyPackage { name: String },

    // Config errors
    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    #[error("Failed to parse registry config: {message} at line {line}, column {column}")]
    TomlParse {
        message: String,
        line: usize,
        column: usize,
    },
}

/// Result type alias for Burrow operations
pub type BurrowResult<T> = Result<T, BurrowError>;

impl BurrowError {
    /// Create a network error from any error type
    pub fn network<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error from any error type
    pub fn internal<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an aborted error
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable by asking another uplink or
    /// serving stale local data
    pub fn is_recoverable(&self) -> bool {
        match self {
            BurrowError::Network { .. }
            | BurrowError::Offline { .. }
            | BurrowError::ContentMismatch { .. } => true,
            BurrowError::BadStatus { status, .. } => *status >= 500 || *status == 304,
            _ => false,
        }
    }

    /// The uplink answered a conditional request with "not modified"
    pub fn is_not_modified(&self) -> bool {
        matches!(self, BurrowError::BadStatus { status: 304, .. })
    }

    /// HTTP status a front-end should answer with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            BurrowError::NotFound { .. } | BurrowError::EmptyPackage { .. } => 404,
            BurrowError::Conflict { .. } => 409,
            BurrowError::Aborted { .. } => 400,
            BurrowError::Offline { .. } => 503,
            BurrowError::BadStatus { .. }
            | BurrowError::Network { .. }
            | BurrowError::ContentMismatch { .. } => 502,
            _ => 500,
        }
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            BurrowError::NotFound { .. } => {
                Some("Check the package name spelling or whether the uplink serves it")
            },
            BurrowError::Offline { .. } => {
                Some("The uplink failed repeatedly; it will be probed again after fail_timeout")
            },
            BurrowError::AuthConfig { .. } => {
                Some("Set auth.token, auth.token_env or the NPM_TOKEN environment variable")
            },
            BurrowError::ContentMismatch { .. } => {
                Some("Discard the transferred tarball and fetch it again")
            },
            BurrowError::Network { .. } => Some("Check connectivity to the uplink and try again"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_modified_detection() {
        let err = BurrowError::BadStatus {
            status: 304,
            url: "https://registry.npmjs.org/lodash".to_string(),
        };
        assert!(err.is_not_modified());
        assert!(err.is_recoverable());

        let err = BurrowError::BadStatus {
            status: 403,
            url: "https://registry.npmjs.org/lodash".to_string(),
        };
        assert!(!err.is_not_modified());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_status_codes() {
        let not_found = BurrowError::NotFound { resource: "lodash".to_string() };
        assert_eq!(not_found.status_code(), 404);

        let conflict = BurrowError::Conflict { resource: "lodash".to_string() };
        assert_eq!(conflict.status_code(), 409);

        let offline = BurrowError::Offline { host: "registry.npmjs.org".to_string() };
        assert_eq!(offline.status_code(), 503);

        let mismatch = BurrowError::ContentMismatch { expected: 10, actual: 4 };
        assert_eq!(mismatch.status_code(), 502);
        assert_eq!(
            mismatch.to_string(),
            "Content length mismatch: expected 10 bytes, received 4"
        );
    }

    #[test]
    fn test_network_error_keeps_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = BurrowError::network("request failed".to_string(), io);
        assert!(err.source().is_some());
        assert!(err.suggestion().is_some());
    }
}
