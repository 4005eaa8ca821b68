//! Error types for the Formins server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::forms::FormError;
use crate::oracle::OracleError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
///
/// `error` is the short message shown to callers, `details` the underlying
/// cause.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{error}: {details}")]
    InvalidInput { error: String, details: String },

    #[error("{error}: {source}")]
    Oracle {
        error: String,
        #[source]
        source: OracleError,
    },

    #[error("{error}: {details}")]
    Serialization { error: String, details: String },

    #[error("{error}: {details}")]
    Internal { error: String, details: String },
}

impl AppError {
    pub fn bad_request(error: impl Into<String>, details: impl Into<String>) -> Self {
        AppError::InvalidInput {
            error: error.into(),
            details: details.into(),
        }
    }

    pub fn internal(error: impl Into<String>, details: impl Into<String>) -> Self {
        AppError::Internal {
            error: error.into(),
            details: details.into(),
        }
    }

    /// Wrap a pipeline error under a route-level message
    pub fn from_form(error: &str, err: FormError) -> Self {
        let error = error.to_string();
        match err {
            FormError::InvalidDocument(details) | FormError::InvalidValues(details) => {
                AppError::InvalidInput { error, details }
            }
            FormError::Oracle(source) => AppError::Oracle { error, source },
            FormError::Serialization(details) => AppError::Serialization { error, details },
            FormError::Task(details) => AppError::Internal { error, details },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            AppError::Oracle { source, .. } => source.status_code(),
            AppError::Serialization { .. } | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error, details) = match self {
            AppError::InvalidInput { error, details }
            | AppError::Serialization { error, details }
            | AppError::Internal { error, details } => (error, details),
            AppError::Oracle { error, source } => (error, source.to_string()),
        };

        if status.is_server_error() {
            tracing::error!("{}: {}", error, details);
        } else {
            tracing::warn!("{}: {}", error, details);
        }

        (status, Json(ErrorResponse { error, details })).into_response()
    }
}
