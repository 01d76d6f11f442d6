//! Error types shared by every pipeline stage.
//!
//! # Taxonomy
//! - `Http`: malformed requests, limit violations and non-200 downstream replies.
//!   Carries the status the caller should see.
//! - `MissingOrgId`: a call reached the downstream boundary without a tenant.
//! - `CacheConfig`: the results cache could not be constructed at assembly time.
//! - `Transport`: the downstream executor failed before producing a response.
//! - `DeadlineExceeded`: the request deadline elapsed while waiting on downstream.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Boxed error used at the transport boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced while processing a query range request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error that maps directly onto an HTTP status.
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    /// The execution context carried no tenant identity.
    #[error("no org id")]
    MissingOrgId,

    /// The results cache backend is misconfigured.
    #[error("invalid cache configuration: {0}")]
    CacheConfig(String),

    /// The downstream transport failed.
    #[error("downstream transport error: {0}")]
    Transport(#[source] BoxError),

    /// The request deadline elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    /// Create an error carrying an explicit HTTP status.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Create a 400 Bad Request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::http(StatusCode::BAD_REQUEST, message)
    }

    /// Create a 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::http(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Wrap a transport-level failure.
    pub fn transport(err: impl Into<BoxError>) -> Self {
        Self::Transport(err.into())
    }

    /// The HTTP status carried by this error, if it has one.
    pub fn http_status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Status code reported to clients and used as a metrics label.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Http { status, .. } => *status,
            Self::MissingOrgId => StatusCode::UNAUTHORIZED,
            Self::CacheConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Returns true if a retry might succeed: 5xx replies and anything
    /// that never produced an HTTP status at all.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => status.is_server_error(),
            Self::MissingOrgId | Self::CacheConfig(_) | Self::DeadlineExceeded => false,
            Self::Transport(_) => true,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
