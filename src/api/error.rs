use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use tracing::error;

use crate::auth::AuthError;
use crate::reading::ReadingError;

impl ResponseError for ReadingError {
    fn status_code(&self) -> StatusCode {
        match self {
            ReadingError::Validation(_) => StatusCode::BAD_REQUEST,
            ReadingError::NotFound(_) => StatusCode::NOT_FOUND,
            ReadingError::Auth(AuthError::SessionOwnedByAnotherUser) => StatusCode::FORBIDDEN,
            ReadingError::Auth(AuthError::Issue(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ReadingError::Auth(_) => StatusCode::UNAUTHORIZED,
            ReadingError::Provider(_) => StatusCode::BAD_GATEWAY,
            ReadingError::ProviderTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ReadingError::CorruptSession { .. }
            | ReadingError::Storage(_)
            | ReadingError::StoragePoisoned
            | ReadingError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        HttpResponse::build(status).json(json!({
            "success": false,
            "message": self.to_string(),
            "retryable": self.is_retryable(),
        }))
    }
}
