use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::domain::order::OrderError;

// ============================================================================
// Application Error Taxonomy
// ============================================================================
//
// Every failure surfaced to a caller maps to exactly one of these variants,
// and every variant maps to one HTTP status. Nothing is swallowed: store,
// session and storage errors all bubble up through here.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing entity, or an entity not in the state the operation requires.
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("insufficient privileges for this action")]
    PermissionDenied,

    /// Uniqueness violation: duplicate draft, duplicate line item,
    /// duplicate username.
    #[error("{0}")]
    Conflict(String),

    /// A downstream collaborator (notification callback, object storage)
    /// failed or timed out.
    #[error("{0}")]
    Dependency(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("session store error: {0}")]
    Session(#[from] redis::RedisError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable machine-readable code included in every error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_failed",
            Self::Unauthorized => "unauthorized",
            Self::PermissionDenied => "permission_denied",
            Self::Conflict(_) => "conflict",
            Self::Dependency(_) => "dependency_failure",
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => "internal",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Dependency(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }))
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            // Operating outside the required source state is reported the
            // same way as a missing order: the caller asked for a draft (or
            // a formed order) that does not exist.
            OrderError::NotDraft(_) | OrderError::NotFormed(_) => {
                Self::NotFound(err.to_string())
            }
            OrderError::MissingName
            | OrderError::InvalidDosage(_)
            | OrderError::InvalidResolutionTarget(_) => Self::Validation(err.to_string()),
        }
    }
}

/// Postgres unique-constraint violation (SQLSTATE 23505).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

// ============================================================================
// Unit Tests
// ============================================================================
