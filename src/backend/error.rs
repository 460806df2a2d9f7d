//! Backend failure classification.
//!
//! Every variant is handled the same way by the pipeline: the turn that hit it
//! falls back to canned text, and the tick fails only if all turns hit one.
//! The split exists for logs and for hosts that want their own retry policy.

use thiserror::Error;

/// Error returned by a single backend request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Connection refused, DNS failure, reset mid-request.
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// The request exceeded its timeout.
    #[error("Backend timed out: {0}")]
    Timeout(String),

    /// The backend answered but not in the expected shape.
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    /// The backend answered with a non-success status.
    #[error("Backend returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },
}

impl BackendError {
    /// Whether the failure happened before any response arrived.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(err.to_string())
        } else if err.is_decode() {
            BackendError::MalformedResponse(err.to_string())
        } else {
            BackendError::Unreachable(err.to_string())
        }
    }
}

/// Keep error bodies short enough for a log line.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(BackendError::Unreachable("x".into()).is_transport());
        assert!(BackendError::Timeout("x".into()).is_transport());
        assert!(!BackendError::MalformedResponse("x".into()).is_transport());
        assert!(!BackendError::Http {
            status: 500,
            body: String::new()
        }
        .is_transport());
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short"), "short");
        let long = "é".repeat(300);
        let cut = truncate_body(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 203);
    }
}
