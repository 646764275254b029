//! Error normalization and panic recovery.
//!
//! # Responsibilities
//! - Catch panics raised anywhere downstream, exactly once
//! - After the chain returns, turn the first recorded error into the JSON
//!   envelope: `HttpError`s verbatim, anything else as the configured
//!   default
//!
//! Install it first so every other middleware runs inside it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::core::{ContextExt, Ctx, HandlerFunc};
use crate::errors::{describe_panic, find_http_error, ErrorResponse, HttpError};

/// Configuration for [`error_handler`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandlerConfig {
    /// Message used for errors that carry no HTTP status.
    pub default_error_message: String,
    /// Status used for errors that carry no HTTP status.
    pub default_status_code: u16,
}

impl Default for ErrorHandlerConfig {
    fn default() -> Self {
        Self {
            default_error_message: "Internal Server Error".to_string(),
            default_status_code: 500,
        }
    }
}

impl ErrorHandlerConfig {
    fn default_status(&self) -> StatusCode {
        StatusCode::from_u16(self.default_status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Error-handling middleware.
pub fn error_handler(config: ErrorHandlerConfig) -> HandlerFunc {
    let config = Arc::new(config);
    HandlerFunc::named("error_handler", move |c: Ctx| {
        let config = config.clone();
        async move {
            let outcome = AssertUnwindSafe(c.next()).catch_unwind().await;

            if let Err(payload) = outcome {
                let detail = describe_panic(payload.as_ref());
                tracing::error!(
                    method = %c.request().method,
                    path = c.request().path(),
                    panic = %detail,
                    "Recovered from panic in handler chain"
                );
                c.record_error(HttpError::internal_server(format!("panic: {detail}")));
                respond(&c, &ErrorResponse::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    config.default_error_message.clone(),
                ));
                c.abort();
                return;
            }

            let errors = c.errors();
            let Some(first) = errors.first() else {
                return;
            };
            let response = match find_http_error(first.as_ref()) {
                Some(http) => http.to_response(),
                None => {
                    tracing::debug!(error = %first, "Unclassified error; using default response");
                    ErrorResponse::new(config.default_status(), config.default_error_message.clone())
                }
            };
            respond(&c, &response);
            c.abort();
        }
    })
}

/// Error handler with default messages.
pub fn default_error_handler() -> HandlerFunc {
    error_handler(ErrorHandlerConfig::default())
}

fn respond(c: &Ctx, response: &ErrorResponse) {
    if c.writer().written() {
        tracing::warn!(
            status = response.error.code,
            path = c.request().path(),
            "Response already written; error envelope not sent"
        );
        return;
    }
    c.json(response.status(), response);
}
