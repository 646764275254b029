//! Error taxonomy and response shaping.
//!
//! # Data Flow
//! ```text
//! handler / middleware
//!     → Context::error(Arc<dyn Error>)     (accumulated, never thrown)
//!     → error_handler middleware           (after next() returns)
//!     → find_http_error()                  (walks the source() chain)
//!     → ErrorResponse                      ({"error":{"code","message"}})
//! ```
//!
//! # Design Decisions
//! - `HttpError` is a plain enum; the status code is derived from the variant
//! - Handler errors travel as `Arc<dyn Error + Send + Sync>` so `error()` can
//!   hand the same value back to the caller
//! - Server-side failures (bind, TLS, shutdown) use `ServerError` and never
//!   reach the client

mod http_error;
mod response;

pub use http_error::{find_http_error, HttpError};
pub use response::{ErrorDetail, ErrorResponse};

use std::sync::Arc;
use std::time::Duration;

/// Boxed error used by collaborator traits.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared error value recorded on a request context.
pub type AnyError = Arc<dyn std::error::Error + Send + Sync>;

/// Errors produced by server lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind: {0}")]
    Bind(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid listen address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("TLS configuration failed: {0}")]
    Tls(String),

    #[error("unsupported framework type: {0}")]
    UnsupportedFramework(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("graceful shutdown did not complete within {0:?}")]
    ShutdownTimedOut(Duration),

    #[error("invalid middleware configuration: {0}")]
    Middleware(#[from] crate::middleware::MiddlewareConfigError),

    #[error("lambda runtime failed: {0}")]
    Lambda(String),

    #[error("server task failed: {0}")]
    Task(String),
}

/// Describe a panic payload without leaking it to clients.
///
/// String panics (`panic!("...")`), error values and `HttpError`s are
/// rendered with their message; anything else is reported as unknown.
pub fn describe_panic(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(err) = payload.downcast_ref::<HttpError>() {
        err.to_string()
    } else if let Some(err) = payload.downcast_ref::<BoxError>() {
        err.to_string()
    } else if let Some(err) = payload.downcast_ref::<AnyError>() {
        err.to_string()
    } else {
        "unknown error".to_string()
    }
}
