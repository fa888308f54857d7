//! Unified API error handling
//!
//! Every endpoint returns `Result<_, ApiError>`; service errors are mapped
//! here into one JSON error shape.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbError;
use crate::service::comments::CommentServiceError;
use crate::service::projects::ProjectServiceError;
use crate::service::reports::ReportError;

/// Standard error response format
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error type/code
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Unique request ID for tracing
    pub request_id: String,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Project not found (404)
    #[error("Project not found: {0}")]
    ProjectNotFound(Uuid),

    /// Question not found (404)
    #[error("Question not found: {0}")]
    QuestionNotFound(String),

    /// Bad request / validation error (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(String),

    /// Classification service error (502)
    #[error("External service error: {0}")]
    ExternalService(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) | ApiError::ProjectNotFound(_) | ApiError::QuestionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error_type = match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::ProjectNotFound(_) => "project_not_found",
            ApiError::QuestionNotFound(_) => "question_not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Database(_) => "database_error",
            ApiError::ExternalService(_) => "external_service_error",
        };

        if status.is_server_error() {
            tracing::error!(
                error_type = error_type,
                status = status.as_u16(),
                message = %self,
                "API error"
            );
        } else {
            tracing::debug!(
                error_type = error_type,
                status = status.as_u16(),
                message = %self,
                "Rejected request"
            );
        }

        HttpResponse::build(status).json(ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            request_id: Uuid::new_v4().to_string(),
        })
    }
}

// ============================================================================
// From conversions for service errors
// ============================================================================

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(id) => ApiError::NotFound(id),
            _ => ApiError::Database(err.to_string()),
        }
    }
}

impl From<CommentServiceError> for ApiError {
    fn from(err: CommentServiceError) -> Self {
        match err {
            CommentServiceError::ProjectNotFound(id) => ApiError::ProjectNotFound(id),
            CommentServiceError::Validation(msg) => ApiError::BadRequest(msg),
            CommentServiceError::Db(e) => e.into(),
        }
    }
}

impl From<ProjectServiceError> for ApiError {
    fn from(err: ProjectServiceError) -> Self {
        match err {
            ProjectServiceError::ProjectNotFound(id) => ApiError::ProjectNotFound(id),
            ProjectServiceError::Validation(msg) => ApiError::BadRequest(msg),
            ProjectServiceError::Generation(msg) => ApiError::ExternalService(msg),
            ProjectServiceError::Db(e) => e.into(),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::ProjectNotFound(id) => ApiError::ProjectNotFound(id),
            ReportError::QuestionNotFound(id) => ApiError::QuestionNotFound(id),
            ReportError::Generation(e) => ApiError::ExternalService(e.to_string()),
            ReportError::Db(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::llm::LlmError;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (ProjectServiceError::Validation("x".into()).into(), StatusCode::BAD_REQUEST),
            (ProjectServiceError::Generation("x".into()).into(), StatusCode::BAD_GATEWAY),
            (CommentServiceError::ProjectNotFound(Uuid::nil()).into(), StatusCode::NOT_FOUND),
            (ReportError::QuestionNotFound("q1".into()).into(), StatusCode::NOT_FOUND),
            (
                ReportError::Generation(LlmError::Timeout(std::time::Duration::from_secs(60))).into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                DbError::Serialization("bad json".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status_code(), expected, "{error}");
        }
    }

    #[test]
    fn test_error_body_shape() {
        let response = ApiError::BadRequest("content must not be empty".into()).error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
