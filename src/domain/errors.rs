//! Error types for the pipeline boundaries
//!
//! Neither error ever escapes a batch run: they are folded into per-photo
//! outcomes by the chunk executor and the orchestrator.

use std::time::Duration;
use thiserror::Error;

/// Failure to turn a photo reference into image bytes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaterializeError {
    #[error("Photo not found: {0}")]
    NotFound(String),

    #[error("HTTP error {status} while fetching {url}")]
    Http { status: u16, url: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("Empty image body for {0}")]
    EmptyBody(String),
}

impl From<std::io::Error> for MaterializeError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(err.to_string())
        } else {
            Self::Io(err.to_string())
        }
    }
}

/// Call-level failure of the face-comparison API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComparisonError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Comparison API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Comparison API call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed comparison payload: {0}")]
    MalformedPayload(String),

    #[error("Failed to build comparison request: {0}")]
    Request(String),
}

impl ComparisonError {
    /// HTTP status, when the API answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether a later attempt can succeed; a request that cannot be built never will
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Request(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_maps_to_not_found() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.jpg");
        assert!(matches!(MaterializeError::from(err), MaterializeError::NotFound(_)));

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        assert!(matches!(MaterializeError::from(err), MaterializeError::Io(_)));
    }

    #[test]
    fn comparison_error_messages_are_readable() {
        let err = ComparisonError::Status { status: 503, body: "busy".to_string() };
        assert_eq!(err.to_string(), "Comparison API returned status 503: busy");
        assert_eq!(err.status(), Some(503));
        assert_eq!(ComparisonError::Network("reset".into()).status(), None);
    }

    #[test]
    fn only_request_errors_are_final() {
        assert!(ComparisonError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(ComparisonError::Status { status: 502, body: String::new() }.is_retryable());
        assert!(ComparisonError::MalformedPayload("eof".into()).is_retryable());
        assert!(!ComparisonError::Request("bad mime".into()).is_retryable());
    }
}
