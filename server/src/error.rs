use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

use prosody_protocol::{
    ErrorResponse, ProtocolError, MSG_GENERATION_FAILED, MSG_METHOD_NOT_ALLOWED, MSG_TEXT_REQUIRED,
};

use crate::model::ModelError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("request body has no text")]
    MissingText,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, MSG_METHOD_NOT_ALLOWED),
            ApiError::MissingText => {
                warn!("Rejected request: {}", self);
                (StatusCode::BAD_REQUEST, MSG_TEXT_REQUIRED)
            }
            // The cause stays in the logs; callers only see the generic message.
            ApiError::Model(_) | ApiError::Protocol(_) => {
                error!("Error calling generative model: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, MSG_GENERATION_FAILED)
            }
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
