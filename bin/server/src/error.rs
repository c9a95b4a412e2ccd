//! Error types for the HTTP host.
//!
//! `ApiError` maps identity failures to HTTP responses with user-safe
//! messages; the full report is only logged. `ServerError` covers startup.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use keyward_identity::IdentityError;
use rootcause::prelude::Report;
use serde::Serialize;
use std::fmt;

/// Startup failures.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// The accounts seed file could not be read or applied.
    Seed { path: String, details: String },
    /// The listener could not bind.
    Bind { addr: String, details: String },
    /// The server stopped with an error.
    Serve { details: String },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {details}"),
            Self::Seed { path, details } => {
                write!(f, "failed to load accounts from '{path}': {details}")
            }
            Self::Bind { addr, details } => write!(f, "failed to bind '{addr}': {details}"),
            Self::Serve { details } => write!(f, "server error: {details}"),
        }
    }
}

impl std::error::Error for ServerError {}

/// An identity failure returned from a handler.
#[derive(Debug)]
pub struct ApiError(Report<IdentityError>);

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl ApiError {
    #[must_use]
    pub fn kind(&self) -> &IdentityError {
        self.0.current_context()
    }

    /// HTTP status for this failure.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.kind() {
            IdentityError::NotFound { .. } => StatusCode::NOT_FOUND,
            IdentityError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            IdentityError::Forbidden { .. } => StatusCode::FORBIDDEN,
            IdentityError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            IdentityError::PopulationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            IdentityError::Store => StatusCode::BAD_GATEWAY,
            IdentityError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind() {
            IdentityError::NotFound { .. } => "Account not found",
            IdentityError::Unauthorized { .. } => "Account disabled",
            IdentityError::Forbidden { .. } => "Access denied",
            IdentityError::InvalidArgument { .. } => "Invalid request",
            IdentityError::PopulationFailed { .. } => "Session could not be created",
            IdentityError::Store => "Account store unavailable",
            IdentityError::Cancelled => "Request cancelled",
        }
    }
}

impl From<Report<IdentityError>> for ApiError {
    fn from(report: Report<IdentityError>) -> Self {
        Self(report)
    }
}

impl From<IdentityError> for ApiError {
    fn from(error: IdentityError) -> Self {
        Self(Report::from(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, "request rejected");
        }
        (
            status,
            Json(ErrorBody {
                error: self.message(),
            }),
        )
            .into_response()
    }
}
