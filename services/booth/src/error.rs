use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Errors surfaced by the booth services
#[derive(Error, Debug)]
pub enum BoothError {
    /// A required field was missing or empty
    #[error("{0}")]
    BadRequest(String),

    /// Unknown session or download code
    #[error("{0}")]
    NotFound(String),

    /// Object store or external HTTP failure
    #[error("{context}: {source:#}")]
    Upstream {
        context: &'static str,
        source: anyhow::Error,
    },

    /// Store or QR generation failure
    #[error("{context}: {source:#}")]
    Internal {
        context: &'static str,
        source: anyhow::Error,
    },
}

pub type BoothResult<T> = Result<T, BoothError>;

impl BoothError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn upstream(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Upstream { context, source }
    }

    pub fn internal(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Internal { context, source }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BoothError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BoothError::NotFound(_) => StatusCode::NOT_FOUND,
            BoothError::Upstream { .. } | BoothError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            BoothError::BadRequest(_) => "BAD_REQUEST",
            BoothError::NotFound(_) => "NOT_FOUND",
            BoothError::Upstream { .. } => "UPSTREAM_ERROR",
            BoothError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub code: String,
}

impl IntoResponse for BoothError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(error = %self, code = self.code(), "Request failed");
        } else {
            warn!(error = %self, code = self.code(), "Request rejected");
        }

        let message = match &self {
            BoothError::BadRequest(msg) | BoothError::NotFound(msg) => msg.clone(),
            BoothError::Upstream { context, .. } | BoothError::Internal { context, .. } => {
                context.to_string()
            }
        };

        let body = Json(ErrorResponse {
            message,
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}
