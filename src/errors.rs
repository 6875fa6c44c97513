use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Error code for malformed, missing or invalid input.
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
/// Error code for a referenced entity that does not exist.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Error code for unexpected failures with no endpoint-specific code.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// Error code for a client over its request quota.
pub const RATE_LIMITED: &str = "RATE_LIMITED";
pub const STATS_ERROR: &str = "STATS_ERROR";
pub const LEADS_ERROR: &str = "LEADS_ERROR";
pub const UPDATE_ERROR: &str = "UPDATE_ERROR";

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Invalid or missing input (HTTP 400). The message is shown to the user.
    Validation(String),
    /// Referenced entity absent (HTTP 404). The message is shown to the user.
    NotFound(String),
    /// Request quota exceeded (HTTP 429).
    RateLimited,
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Internal server error; the detail is logged, never returned.
    InternalError(String),
    /// Internal failure tagged with the error code of the endpoint it happened in.
    WithCode {
        source: Box<AppError>,
        code: &'static str,
    },
}

impl AppError {
    /// The `error.code` this error is reported with.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => VALIDATION_ERROR,
            AppError::NotFound(_) => NOT_FOUND,
            AppError::RateLimited => RATE_LIMITED,
            AppError::DatabaseError(_) | AppError::InternalError(_) => INTERNAL_ERROR,
            AppError::WithCode { source, code } => match source.as_ref() {
                AppError::Validation(_) | AppError::NotFound(_) | AppError::RateLimited => {
                    source.code()
                }
                _ => code,
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::DatabaseError(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::WithCode { source, .. } => source.status(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::RateLimited => write!(f, "Rate limited"),
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithCode { source, code } => write!(f, "{}: {}", code, source),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Renders the error as `{success: false, error: {code, message}}`.
    ///
    /// Validation and not-found messages are returned as-is. Internal failures
    /// are logged with their detail and answered with a generic message.
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = match &self {
            AppError::Validation(msg) | AppError::NotFound(msg) => msg.clone(),
            AppError::RateLimited => "Quá nhiều yêu cầu, vui lòng thử lại sau".to_string(),
            AppError::WithCode { source, .. } => match source.as_ref() {
                AppError::Validation(msg) | AppError::NotFound(msg) => msg.clone(),
                _ => {
                    tracing::error!("{}", self);
                    "Đã xảy ra lỗi máy chủ, vui lòng thử lại sau".to_string()
                }
            },
            _ => {
                tracing::error!("{}", self);
                "Đã xảy ra lỗi máy chủ, vui lòng thử lại sau".to_string()
            }
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

/// Extension trait for tagging failures with an endpoint error code.
pub trait ResultExt<T> {
    /// Report internal failures under `code`. Validation and not-found errors
    /// keep their own code.
    fn error_code(self, code: &'static str) -> Result<T, AppError>;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn error_code(self, code: &'static str) -> Result<T, AppError> {
        self.map_err(|e| match e {
            AppError::WithCode { source, .. } => AppError::WithCode { source, code },
            other => AppError::WithCode {
                source: Box::new(other),
                code,
            },
        })
    }
}
