use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::DomainError;
use persistence::RepositoryError;
use serde::Serialize;
use shared::pagination::PageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Gone(_) => StatusCode::GONE,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, message) = match self {
            ApiError::Unauthorized(msg) => ("unauthorized", msg),
            ApiError::Forbidden(msg) => ("forbidden", msg),
            ApiError::NotFound(msg) => ("not_found", msg),
            ApiError::Conflict(msg) => ("conflict", msg),
            ApiError::Gone(msg) => ("gone", msg),
            ApiError::Validation(msg) => ("validation_error", msg),
            ApiError::RateLimited => (
                "rate_limited",
                "Too many requests. Please try again later.".into(),
            ),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("internal_error", "An internal error occurred".into())
            }
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg),
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".into()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("23505") => ApiError::Conflict("Resource already exists".into()),
                Some("23503") => ApiError::NotFound("Referenced resource not found".into()),
                Some("23514") => ApiError::Validation("Value violates a constraint".into()),
                _ => ApiError::Internal(format!("Database error: {}", db_err)),
            },
            _ => ApiError::Internal(format!("Database error: {}", err)),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field))
                })
            })
            .collect();
        messages.sort();

        let message = if messages.len() == 1 {
            messages.remove(0)
        } else {
            format!("{} validation errors: {}", messages.len(), messages.join("; "))
        };

        ApiError::Validation(message)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Invalid(msg) => ApiError::Validation(msg),
            DomainError::Forbidden(msg) => ApiError::Forbidden(msg),
            DomainError::Gone(msg) => ApiError::Gone(msg),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(e) => e.into(),
            RepositoryError::Rule(e) => e.into(),
            RepositoryError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
        }
    }
}

impl From<PageError> for ApiError {
    fn from(err: PageError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<shared::password::PasswordError> for ApiError {
    fn from(err: shared::password::PasswordError) -> Self {
        ApiError::Internal(format!("Password hashing failed: {}", err))
    }
}
