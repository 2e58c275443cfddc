use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt::Display;

/// Application-level errors
///
/// Errors are `Clone` so a single failed model load can be handed to every
/// caller that was waiting on it.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid ratings: {0}")]
    InvalidRating(String),

    #[error("Movie with ID {0} not found")]
    MovieNotFound(u32),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Corrupt artifact: {0}")]
    CorruptArtifact(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Coarse error taxonomy used for status codes and the metrics histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Malformed or out-of-range client input
    Validation,
    /// Unknown movie id
    NotFound,
    /// No model loaded, or the load failed; safe to retry later
    ModelUnavailable,
    /// Unexpected numeric or state failure
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::Internal => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the fault lies with the caller's input
    pub fn is_client_fault(&self) -> bool {
        matches!(self, ErrorKind::Validation | ErrorKind::NotFound)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidInput(_) | AppError::InvalidRating(_) => ErrorKind::Validation,
            AppError::MovieNotFound(_) => ErrorKind::NotFound,
            AppError::ArtifactNotFound(_)
            | AppError::CorruptArtifact(_)
            | AppError::StorageUnavailable(_)
            | AppError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }

    /// Message safe to show to a client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = Json(json!({
            "error": self.public_message(),
            "kind": self.kind().as_str(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_map_to_bad_request() {
        let err = AppError::InvalidRating("no known movies".to_string());
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.kind().is_client_fault());
    }

    #[test]
    fn test_load_failures_are_model_unavailable() {
        for err in [
            AppError::ArtifactNotFound("v9".to_string()),
            AppError::CorruptArtifact("bad".to_string()),
            AppError::StorageUnavailable("disk".to_string()),
        ] {
            assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
            assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
            assert!(!err.kind().is_client_fault());
        }
    }

    #[test]
    fn test_internal_error_message_is_generic() {
        let err = AppError::Internal("NaN in row 12".to_string());
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(err.kind().as_str(), "internal_error");
    }

    #[test]
    fn test_client_faults() {
        assert!(ErrorKind::Validation.is_client_fault());
        assert!(ErrorKind::NotFound.is_client_fault());
        assert!(!ErrorKind::ModelUnavailable.is_client_fault());
        assert!(!ErrorKind::Internal.is_client_fault());
    }

    #[test]
    fn test_movie_not_found_message() {
        let err = AppError::MovieNotFound(4242);
        assert_eq!(err.to_string(), "Movie with ID 4242 not found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
