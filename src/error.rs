use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::persistence::PersistenceError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Failed to load tasks: {0}")]
    Load(#[source] PersistenceError),

    #[error("Persistence error: {0}")]
    Persistence(#[source] PersistenceError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bulk operation stopped after {completed} item(s) at {failed_id}: {source}")]
    PartialBulk {
        completed: usize,
        failed_id: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error")]
    InternalServerError,
}

impl From<PersistenceError> for AppError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(id) => AppError::NotFound(id),
            other => AppError::Persistence(other),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<usize>,
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(id) => (StatusCode::NOT_FOUND, format!("Task {} not found", id)),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Load(e) => {
                error!("load error: {}", e);
                (StatusCode::BAD_GATEWAY, "Failed to load tasks".to_string())
            }
            AppError::Persistence(e) => {
                error!("persistence error: {}", e);
                (StatusCode::BAD_GATEWAY, "Storage backend error occurred".to_string())
            }
            AppError::PartialBulk { source, .. } => source.status_and_message(),
            AppError::Config(msg) => {
                error!("configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        let completed = match &self {
            AppError::PartialBulk { completed, .. } => Some(*completed),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message,
            completed,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_error_maps_to_expected_http_statuses() {
        assert_eq!(
            AppError::Validation("Title is required".to_string()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Persistence(PersistenceError::Backend("down".to_string()))
                .into_response()
                .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Load(PersistenceError::Backend("down".to_string()))
                .into_response()
                .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn persistence_not_found_becomes_not_found() {
        let err = AppError::from(PersistenceError::NotFound("abc".to_string()));
        assert!(matches!(err, AppError::NotFound(ref id) if id == "abc"));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn partial_bulk_reports_the_inner_status() {
        let err = AppError::PartialBulk {
            completed: 2,
            failed_id: "c".to_string(),
            source: Box::new(AppError::NotFound("c".to_string())),
        };
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
