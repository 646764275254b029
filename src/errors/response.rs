//! The JSON error envelope: `{"error":{"code":<int>,"message":<string>}}`.

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Body of the `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub message: String,
}

/// Canonical error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

impl ErrorResponse {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.as_u16(),
                message: message.into(),
            },
        }
    }

    fn with_default(code: StatusCode, message: impl Into<String>, default: &str) -> Self {
        let message = message.into();
        if message.is_empty() {
            Self::new(code, default)
        } else {
            Self::new(code, message)
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_default(StatusCode::BAD_REQUEST, message, "Bad Request")
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::with_default(StatusCode::UNAUTHORIZED, message, "Unauthorized")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::with_default(StatusCode::FORBIDDEN, message, "Forbidden")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_default(StatusCode::NOT_FOUND, message, "Not Found")
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::with_default(StatusCode::CONFLICT, message, "Conflict")
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::with_default(
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
            "Internal Server Error",
        )
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::with_default(
            StatusCode::SERVICE_UNAVAILABLE,
            message,
            "Service Unavailable",
        )
    }

    /// Status code carried by the envelope, falling back to 500 for
    /// out-of-range values.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.error.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Serialized JSON bytes.
    pub fn to_bytes(&self) -> bytes::Bytes {
        serde_json::to_vec(self)
            .map(bytes::Bytes::from)
            .unwrap_or_else(|_| bytes::Bytes::from_static(b"{\"error\":{\"code\":500,\"message\":\"Internal Server Error\"}}"))
    }
}
