use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

/// Error taxonomy shared by every handler. Bodies are plain text; the
/// status code is the contract.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),
    /// No token / wrong shared secret.
    #[error("{0}")]
    BadRequest(String),
    /// Expired session or bad credentials.
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    /// State or uniqueness violation.
    #[error("{0}")]
    Conflict(String),
    /// Infrastructure failure with a client-facing explanation.
    #[error("{0}")]
    Server(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    /// Translates a persistence uniqueness violation (Postgres 23505) into a
    /// 409; everything else stays an internal error.
    pub fn on_unique(err: sqlx::Error, conflict_msg: impl Into<String>) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.code().as_deref() == Some("23505") {
                return Self::Conflict(conflict_msg.into());
            }
        }
        Self::Internal(err.into())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Server(msg) => {
                error!(error = %msg, "server-side failure");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ApiError::Internal(err) => {
                error!(error = %err, "unhandled internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error has occurred".to_string(),
                )
            }
        };
        (status, body).into_response()
    }
}
