//! Error taxonomy for backend calls.
//!
//! Status-coded rejections are kept apart from transport failures so callers
//! can route on them: a 404 from the path lookup is a normal branch, while a
//! refused connection never is.

use reqwest::StatusCode;

/// A specialized `Result` type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend answered with a non-success status.
    #[error("Backend returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    /// The request never produced a response (connect, timeout, reset).
    #[error("Transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    /// A success response whose body does not match the expected shape.
    #[error("Malformed payload from {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },

    /// The chat stream reported a failure or was cut off.
    #[error("Chat stream failed: {0}")]
    Stream(String),

    /// The configured base URL cannot be joined with an endpoint path.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

impl BackendError {
    /// Only an exact 404 counts as "no such resource yet".
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }

    /// The response status, when the backend produced one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn malformed(endpoint: &str, message: impl ToString) -> Self {
        BackendError::Malformed {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_404_is_not_found() {
        let not_found = BackendError::Status {
            status: StatusCode::NOT_FOUND,
            message: "No active learning path found".to_string(),
        };
        let unauthorized = BackendError::Status {
            status: StatusCode::UNAUTHORIZED,
            message: "login required".to_string(),
        };
        let gone = BackendError::Status {
            status: StatusCode::GONE,
            message: "gone".to_string(),
        };

        assert!(not_found.is_not_found());
        assert!(!unauthorized.is_not_found());
        assert!(!gone.is_not_found());
        assert!(!BackendError::Stream("reset".to_string()).is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = BackendError::Status {
            status: StatusCode::BAD_REQUEST,
            message: "score and skill are required".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Backend returned 400 Bad Request: score and skill are required"
        );
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));

        let malformed = BackendError::malformed("/api/get-skill", "missing field `level`");
        assert_eq!(
            malformed.to_string(),
            "Malformed payload from /api/get-skill: missing field `level`"
        );
        assert_eq!(malformed.status(), None);
    }
}
