//! Typed HTTP errors.

use std::error::Error as StdError;

use http::StatusCode;

use super::ErrorResponse;

/// An error that carries the HTTP status it should be reported with.
///
/// An empty message is replaced by the canonical reason phrase, so
/// `HttpError::not_found("")` reports `"Not Found"`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    MethodNotAllowed(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InternalServer(String),
    #[error("{0}")]
    ServiceUnavailable(String),
}

fn or_default(message: impl Into<String>, default: &str) -> String {
    let message = message.into();
    if message.is_empty() {
        default.to_string()
    } else {
        message
    }
}

impl HttpError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(or_default(message, "Bad Request"))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(or_default(message, "Unauthorized"))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(or_default(message, "Forbidden"))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(or_default(message, "Not Found"))
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::MethodNotAllowed(or_default(message, "Method Not Allowed"))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(or_default(message, "Conflict"))
    }

    pub fn internal_server(message: impl Into<String>) -> Self {
        Self::InternalServer(or_default(message, "Internal Server Error"))
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(or_default(message, "Service Unavailable"))
    }

    /// Status code the error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InternalServer(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::MethodNotAllowed(m)
            | Self::Conflict(m)
            | Self::InternalServer(m)
            | Self::ServiceUnavailable(m) => m,
        }
    }

    /// Canonical JSON envelope for this error.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.status_code(), self.message())
    }
}

/// Find the first `HttpError` in an error's `source()` chain, the error
/// itself included.
pub fn find_http_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a HttpError> {
    let mut current: Option<&'a (dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(http) = e.downcast_ref::<HttpError>() {
            return Some(http);
        }
        current = e.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("wrapped")]
    struct Wrapper(#[source] HttpError);

    #[test]
    fn empty_message_uses_reason_phrase() {
        assert_eq!(HttpError::not_found("").message(), "Not Found");
        assert_eq!(HttpError::conflict("").message(), "Conflict");
        assert_eq!(
            HttpError::internal_server("").message(),
            "Internal Server Error"
        );
    }

    #[test]
    fn status_codes_follow_variant() {
        assert_eq!(HttpError::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(HttpError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            HttpError::service_unavailable("x").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn finds_http_error_through_sources() {
        let err = Wrapper(HttpError::forbidden("nope"));
        let found = find_http_error(&err).map(HttpError::status_code);
        assert_eq!(found, Some(StatusCode::FORBIDDEN));

        let plain = std::io::Error::new(std::io::ErrorKind::Other, "io");
        assert!(find_http_error(&plain).is_none());
    }
}
