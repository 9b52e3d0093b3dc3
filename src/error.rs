use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// The file extension is not in any configured format list.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The upload exceeds the configured size cap.
    #[error("Upload too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    /// The request body or form could not be understood.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A field was present but did not validate.
    #[error("Invalid field: {0}")]
    InvalidField(String),

    /// A required field was absent or empty.
    #[error("Missing field: {0}")]
    MissingField(String),

    /// A published file already has the same content hash.
    #[error("Duplicate content")]
    DuplicateContent,

    /// A user with this email already exists.
    #[error("Duplicate email")]
    DuplicateEmail,

    /// The password does not satisfy the strength policy.
    #[error("Weak password")]
    WeakPassword,

    /// The caller is not authenticated.
    #[error("Unauthorised")]
    Unauthorised,

    /// The caller is authenticated but lacks permission.
    #[error("Forbidden")]
    Forbidden,

    /// The request carries no usable session.
    #[error("No session")]
    NoSession,

    /// A user lookup failed.
    #[error("User not found")]
    UserNotFound,

    /// A file lookup failed.
    #[error("File not found")]
    FileNotFound,

    /// The file is not in the state the operation requires.
    #[error("Wrong state: {0}")]
    WrongState(String),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catalog encode/decode error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The short machine-readable tag reported to callers.
    pub fn tag(&self) -> &'static str {
        match self {
            AppError::UnsupportedFormat(_) => "unsupported_format",
            AppError::TooLarge { .. } => "too_large",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::InvalidField(_) => "invalid_field",
            AppError::MissingField(_) => "missing_field",
            AppError::DuplicateContent => "duplicate_content",
            AppError::DuplicateEmail => "duplicate_email",
            AppError::WeakPassword => "weak_password",
            AppError::Unauthorised => "unauthorised",
            AppError::Forbidden => "forbidden",
            AppError::NoSession => "no_session",
            AppError::UserNotFound => "user_not_found",
            AppError::FileNotFound => "file_not_found",
            AppError::WrongState(_) => "wrong_state",
            AppError::Io(_) | AppError::Serialization(_) | AppError::Internal(_) => "error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::InvalidRequest(_)
            | AppError::InvalidField(_)
            | AppError::MissingField(_)
            | AppError::WeakPassword => StatusCode::BAD_REQUEST,
            AppError::DuplicateContent | AppError::DuplicateEmail | AppError::WrongState(_) => {
                StatusCode::CONFLICT
            }
            AppError::Unauthorised | AppError::NoSession => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::UserNotFound | AppError::FileNotFound => StatusCode::NOT_FOUND,
            AppError::Io(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Io(e) => tracing::error!("IO error: {}", e),
            AppError::Serialization(msg) => tracing::error!("Serialization error: {}", msg),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            AppError::Unauthorised | AppError::Forbidden | AppError::NoSession => {
                tracing::warn!("Request rejected: {}", self)
            }
            other => tracing::debug!("Request failed: {}", other),
        }

        let body = match &self {
            AppError::InvalidField(field) | AppError::MissingField(field) => {
                sonic_rs::to_string(&sonic_rs::json!({
                    "error": self.tag(),
                    "field": field,
                }))
            }
            _ => sonic_rs::to_string(&sonic_rs::json!({ "error": self.tag() })),
        }
        .unwrap_or_else(|_| r#"{"error":"error"}"#.to_string());

        (
            status,
            [(http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
