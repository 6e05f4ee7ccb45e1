//! Error types for the NPD client

use std::time::Duration;
use thiserror::Error;

use crate::tasks::TaskState;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The service answered with a non-success status
    #[error("Remote call to {path} failed (status {status}): {body}")]
    RemoteCallFailed {
        status: u16,
        path: String,
        /// Raw response body, kept for diagnostics
        body: String,
        /// Request ID for debugging
        request_id: Option<String>,
    },

    /// The response body did not match the expected shape
    #[error("Failed to decode response from {path}: {source}")]
    Deserialization {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest_middleware::Error),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// A resource the poller was waiting on does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Polling ran past its deadline before a terminal state was observed
    #[error("Polling {target} timed out after {elapsed:?} (last state: {last_state:?})")]
    PollTimeout {
        target: String,
        elapsed: Duration,
        last_state: Option<TaskState>,
    },

    /// Polling used up its attempt budget before a terminal state was observed
    #[error("Polling {target} gave up after {attempts} attempts (last state: {last_state:?})")]
    PollExhausted {
        target: String,
        attempts: u32,
        last_state: Option<TaskState>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.into())
    }
}

impl Error {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::RemoteCallFailed { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            Error::ServiceUnavailable(_) => true,
            Error::Configuration(_)
            | Error::Validation(_)
            | Error::Deserialization { .. }
            | Error::Serialization(_)
            | Error::Cancelled
            | Error::NotFound(_)
            | Error::PollTimeout { .. }
            | Error::PollExhausted { .. } => false,
        }
    }

    /// Get the retry delay if applicable
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RemoteCallFailed { status: 429, .. } => Some(Duration::from_secs(5)),
            Error::RemoteCallFailed { status, .. } if *status >= 500 => {
                Some(Duration::from_secs(2))
            }
            Error::Network(_) => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    /// HTTP status of a failed remote call
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::RemoteCallFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Get the request ID if available
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Error::RemoteCallFailed { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// The service rejected a create because the identifier already exists
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(status: u16) -> Error {
        Error::RemoteCallFailed {
            status,
            path: "/datasets".to_string(),
            body: r#"{"detail":"boom"}"#.to_string(),
            request_id: Some("req-1".to_string()),
        }
    }

    #[test]
    fn test_remote_failure_classification() {
        assert!(remote(503).is_retryable());
        assert!(remote(429).is_retryable());
        assert!(!remote(409).is_retryable());
        assert!(remote(409).is_conflict());
        assert_eq!(remote(404).status(), Some(404));
        assert_eq!(remote(500).request_id(), Some("req-1"));
        assert_eq!(remote(429).retry_after(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_local_errors_are_final() {
        assert!(!Error::Cancelled.is_retryable());
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Validation("empty".into()).is_retryable());
        assert_eq!(Error::Configuration("bad".into()).status(), None);
    }

    #[test]
    fn test_display_carries_path_and_body() {
        let message = remote(500).to_string();
        assert!(message.contains("/datasets"));
        assert!(message.contains("500"));
        assert!(message.contains("boom"));
    }
}
