use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{models::ErrorBody, storage::StorageError, store::StoreError};

pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized - Please log in";

/// ApiError
///
/// Every failure an endpoint can surface. Each variant is terminal for the request
/// and renders as `{ statusCode, statusMessage }`.
#[derive(Debug, Error, PartialEq)]
pub enum ApiError {
    #[error("{}", UNAUTHORIZED_MESSAGE)]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Maps a store failure to a 500, substituting `fallback` when the store gave no message.
    pub fn store(err: StoreError, fallback: &str) -> Self {
        let message = err.message().trim();
        if message.is_empty() {
            ApiError::Internal(fallback.to_string())
        } else {
            ApiError::Internal(message.to_string())
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            status_code: self.status_code().as_u16(),
            status_message: self.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidKey => ApiError::BadRequest(err.to_string()),
            StorageError::Upstream(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}
