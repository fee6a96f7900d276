use crate::error::SettlementError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Error type returned by every HTTP handler.
///
/// Renders as `{"status": "error", "message": ...}`. Infrastructure
/// failures are logged and replaced by a generic message.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Settlement(err) => match err {
                SettlementError::ValidationError(_)
                | SettlementError::InsufficientFunds { .. }
                | SettlementError::BelowMinimum { .. }
                | SettlementError::SignatureInvalid(_) => StatusCode::BAD_REQUEST,
                SettlementError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                SettlementError::Forbidden(_) => StatusCode::FORBIDDEN,
                SettlementError::NotFound { .. } => StatusCode::NOT_FOUND,
                SettlementError::AlreadyExists(_)
                | SettlementError::InvalidState(_)
                | SettlementError::AlreadyReleased
                | SettlementError::StaleWrite(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Internal error");
            "An internal error occurred".to_string()
        } else {
            match &self {
                AppError::Settlement(err) => err.to_string(),
                AppError::BadRequest(msg) => msg.clone(),
            }
        };

        let body = json!({
            "status": "error",
            "message": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
