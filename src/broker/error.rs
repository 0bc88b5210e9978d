//! # Broker Errors
//!
//! Errors returned to broker clients, each carrying its HTTP status.

use crate::storage::StorageError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

const ASYNC_REQUIRED_DESCRIPTION: &str =
    "This service plan requires client support for asynchronous service operations.";
const CONCURRENCY_DESCRIPTION: &str =
    "Another operation for this service instance is in progress.";

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("{0}")]
    BadRequest(String),
    /// The client did not send `accepts_incomplete=true`
    #[error("AsyncRequired")]
    AsyncRequired,
    #[error("{0}")]
    Conflict(String),
    #[error("ConcurrencyError: {0}")]
    ConcurrencyError(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Gone(String),
    #[error("{0}")]
    Internal(String),
}

/// How a missing instance is reported by the calling operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingInstance {
    NotFound,
    Gone,
}

impl BrokerError {
    /// Map a store error for a broker operation
    pub fn from_storage(error: StorageError, missing: MissingInstance) -> Self {
        match error {
            StorageError::NotFound(id) => {
                let message = format!("instance {id} does not exist");
                match missing {
                    MissingInstance::NotFound => BrokerError::NotFound(message),
                    MissingInstance::Gone => BrokerError::Gone(message),
                }
            }
            StorageError::AlreadyExists(id) => {
                BrokerError::Conflict(format!("instance {id} already exists"))
            }
            StorageError::AlreadyInProgress(id) => BrokerError::ConcurrencyError(id),
            StorageError::Deleting(id) => {
                BrokerError::Gone(format!("instance {id} is being deleted"))
            }
            other => BrokerError::Internal(other.to_string()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BrokerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BrokerError::AsyncRequired | BrokerError::ConcurrencyError(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            BrokerError::Conflict(_) => StatusCode::CONFLICT,
            BrokerError::NotFound(_) => StatusCode::NOT_FOUND,
            BrokerError::Gone(_) => StatusCode::GONE,
            BrokerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `error` field of the response body
    pub fn error_code(&self) -> String {
        match self {
            BrokerError::AsyncRequired => "AsyncRequired".to_string(),
            BrokerError::ConcurrencyError(_) => "ConcurrencyError".to_string(),
            BrokerError::BadRequest(message)
            | BrokerError::Conflict(message)
            | BrokerError::NotFound(message)
            | BrokerError::Gone(message)
            | BrokerError::Internal(message) => message.clone(),
        }
    }

    /// `description` field of the response body
    pub fn description(&self) -> Option<&'static str> {
        match self {
            BrokerError::AsyncRequired => Some(ASYNC_REQUIRED_DESCRIPTION),
            BrokerError::ConcurrencyError(_) => Some(CONCURRENCY_DESCRIPTION),
            _ => None,
        }
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.error_code() });
        if let Some(description) = self.description() {
            body["description"] = json!(description);
        }
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_mapping() {
        let cases = [
            (
                StorageError::AlreadyExists("a".to_string()),
                MissingInstance::NotFound,
                StatusCode::CONFLICT,
            ),
            (
                StorageError::AlreadyInProgress("a".to_string()),
                MissingInstance::NotFound,
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                StorageError::Deleting("a".to_string()),
                MissingInstance::NotFound,
                StatusCode::GONE,
            ),
            (
                StorageError::NotFound("a".to_string()),
                MissingInstance::NotFound,
                StatusCode::NOT_FOUND,
            ),
            (
                StorageError::NotFound("a".to_string()),
                MissingInstance::Gone,
                StatusCode::GONE,
            ),
            (
                StorageError::Conflict("a".to_string()),
                MissingInstance::NotFound,
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, missing, status) in cases {
            assert_eq!(BrokerError::from_storage(error, missing).status_code(), status);
        }
    }

    #[test]
    fn test_concurrency_error_body() {
        let error = BrokerError::ConcurrencyError("a".to_string());
        assert_eq!(error.error_code(), "ConcurrencyError");
        assert_eq!(error.description(), Some(CONCURRENCY_DESCRIPTION));
    }
}
