use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use querydesk_core::DeskError;
use serde_json::json;

/// Handler error. Every variant renders as `{ "error", "code" }` JSON.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Desk(#[from] DeskError),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Desk(DeskError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            AppError::Desk(DeskError::Unauthorized(_)) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED")
            }
            AppError::Desk(DeskError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Desk(DeskError::Storage { .. }) => {
                tracing::error!(error = %self, "Storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
            }
        };

        // Storage text is shown to the user as-is.
        let message = self.to_string();

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
