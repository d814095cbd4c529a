use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::domain::{ConversionError, TransactionStatus};
use crate::ports::{RateSourceError, RepositoryError};
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    #[error("No valid exchange rate found within 6 months of transaction date")]
    NoValidExchangeRate,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidCurrency(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidStatusTransition { .. } | AppError::ConcurrentModification(_) => {
                StatusCode::CONFLICT
            }
            AppError::NoValidExchangeRate => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable discriminator for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidCurrency(_) => "invalid_currency",
            AppError::NoValidExchangeRate => "no_valid_exchange_rate",
            AppError::InvalidStatusTransition { .. } => "invalid_status_transition",
            AppError::ConcurrentModification(_) => "concurrent_modification",
            AppError::Transport(_) => "transport_error",
            AppError::Database(_) | AppError::Internal(_) => "internal_error",
        }
    }

    /// Transient failures that may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transport(_) | AppError::Database(_))
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => {
                AppError::NotFound(format!("Transaction {} not found", id))
            }
            RepositoryError::InvalidTransition { from, to, .. } => {
                AppError::InvalidStatusTransition { from, to }
            }
            RepositoryError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<RateSourceError> for AppError {
    fn from(err: RateSourceError) -> Self {
        match err {
            RateSourceError::UnknownCurrency(code) => AppError::InvalidCurrency(code),
            RateSourceError::Transport(msg) => AppError::Transport(msg),
        }
    }
}

impl From<ConversionError> for AppError {
    fn from(err: ConversionError) -> Self {
        match err {
            ConversionError::InvalidCurrency => {
                AppError::InvalidCurrency("currency code is required".to_string())
            }
            ConversionError::NoValidExchangeRate => AppError::NoValidExchangeRate,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
