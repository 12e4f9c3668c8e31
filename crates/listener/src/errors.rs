//! Errors raised while receiving a webhook.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use events::{DeliveryError, NormalizeError, RelayError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListenerError {
    /// A required provider header is absent or not valid UTF-8.
    #[error("Missing required header '{header}'")]
    MissingHeader { header: &'static str },

    #[error("Webhook signature missing or invalid")]
    InvalidSignature,

    /// The body is empty or not a JSON document.
    #[error("Invalid webhook body: {message}")]
    InvalidBody { message: String },

    #[error(transparent)]
    Malformed(NormalizeError),

    #[error(transparent)]
    Delivery(DeliveryError),

    #[error("Listener I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RelayError> for ListenerError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Normalize(e) => Self::Malformed(e),
            RelayError::Delivery(e) => Self::Delivery(e),
        }
    }
}

impl ListenerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingHeader { .. } | Self::InvalidBody { .. } | Self::Malformed(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::Delivery(_) => StatusCode::BAD_GATEWAY,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ListenerError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
