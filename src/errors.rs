use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{JokeId, JokeLookup};

// --- Store Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Joke not found with ID: {0}")]
    NotFound(JokeId),

    // Raised by the store's own uniqueness constraint at write time
    #[error("Joke already stored for date: {0}")]
    DateConflict(NaiveDate),

    // A conditional write found the joke moved since it was read
    #[error("Joke changed concurrently: {0}")]
    ConcurrentModification(JokeId),

    #[error("Stored joke data is malformed: {0}")]
    DataCorruption(String),

    #[error("Database backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

impl From<aws_smithy_types::error::operation::BuildError> for RepoError {
    fn from(err: aws_smithy_types::error::operation::BuildError) -> Self {
        RepoError::BackendError(anyhow::Error::new(err).context("Failed to build DynamoDB request"))
    }
}

// --- Resolver Errors ---

#[derive(Error, Debug)]
pub enum JokeError {
    #[error("Invalid joke: {0}")]
    InvalidInput(String),

    #[error("Could not find joke by {0}")]
    NotFound(JokeLookup),

    #[error("{0}")]
    Conflict(String),

    #[error("Joke store failure")]
    Repository(#[source] RepoError),
}

impl JokeError {
    pub fn date_taken(date: NaiveDate) -> Self {
        JokeError::Conflict(format!("Joke already exists for specified date: {}", date))
    }

    pub fn date_taken_by_other(date: NaiveDate) -> Self {
        JokeError::Conflict(format!(
            "Another Joke already exists for specified date: {}",
            date
        ))
    }
}

impl From<RepoError> for JokeError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(id) => JokeError::NotFound(JokeLookup::Id(id)),
            RepoError::DateConflict(date) => JokeError::date_taken(date),
            RepoError::ConcurrentModification(id) => JokeError::Conflict(format!(
                "Joke {} was changed by another request, reload it and retry",
                id
            )),
            e => JokeError::Repository(e),
        }
    }
}

// --- Web Layer Error ---

/// Coarse classification used to pick a transport status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Internal,
}

/// Maps an error kind to its HTTP status.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    // Input validation / request parsing errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid joke ID format: {0}")]
    InvalidUuid(#[from] uuid::Error),

    // Resolver outcomes
    #[error("Could not find joke by {0}")]
    JokeNotFound(JokeLookup),
    #[error("{0}")]
    Conflict(String),
    #[error("Could not access joke data")]
    RepositoryError(#[source] RepoError),

    // Configuration / Startup errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidInput(_) | AppError::InvalidUuid(_) => ErrorKind::InvalidInput,
            AppError::JokeNotFound(_) => ErrorKind::NotFound,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::RepositoryError(_)
            | AppError::ConfigError(_)
            | AppError::InitError(_)
            | AppError::InternalServerError(_) => ErrorKind::Internal,
        }
    }
}

impl From<JokeError> for AppError {
    fn from(err: JokeError) -> Self {
        match err {
            JokeError::InvalidInput(msg) => AppError::InvalidInput(msg),
            JokeError::NotFound(lookup) => AppError::JokeNotFound(lookup),
            JokeError::Conflict(msg) => AppError::Conflict(msg),
            JokeError::Repository(e) => AppError::RepositoryError(e),
        }
    }
}

// Malformed bodies and query strings are caller errors like any other invalid input
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

// --- Axum Response Implementation ---

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(self.kind());
        let error_message = match &self {
            AppError::InvalidInput(msg) | AppError::Conflict(msg) => msg.clone(),
            AppError::InvalidUuid(e) => format!("Invalid ID format: {}", e),
            AppError::JokeNotFound(lookup) => format!("Could not find joke by {}", lookup),
            AppError::RepositoryError(e) => {
                tracing::error!(error.source = ?e, "Repository error occurred");
                "Database operation failed".to_string()
            }
            AppError::ConfigError(msg) => {
                tracing::error!("Configuration error: {}", msg);
                "Server configuration error".to_string()
            }
            AppError::InitError(msg) => {
                tracing::error!("Initialization error: {}", msg);
                "Server initialization error".to_string()
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                "An internal server error occurred".to_string()
            }
        };

        if status.is_server_error() {
            tracing::error!(error.message = %error_message, error.detail = %self, "Responding with error");
        } else {
            tracing::debug!(error.message = %error_message, error.status = %status, "Responding with client error");
        }

        let body = Json(serde_json::json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_fixed_per_kind() {
        assert_eq!(status_for(ErrorKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn write_time_date_conflict_becomes_conflict() {
        let date = NaiveDate::from_ymd_opt(2025, 2, 24).unwrap();
        let err: JokeError = RepoError::DateConflict(date).into();
        match err {
            JokeError::Conflict(msg) => assert!(msg.contains("2025-02-24")),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn concurrent_modification_is_conflict() {
        let err: AppError = JokeError::from(RepoError::ConcurrentModification(JokeId::generate())).into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn backend_failure_is_internal() {
        let err: AppError = JokeError::from(RepoError::BackendError(anyhow::anyhow!("boom"))).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
