//! Engine adapters.
//!
//! # Data Flow
//! ```text
//! native request (axum Request / hyper Request<Incoming>)
//!     → buffer body (max_body_bytes, 413 when exceeded)
//!     → RequestState + engine Context
//!     → drive(): chain runs on its own task, raced against the writer
//!       being committed (timeout watcher)
//!     → safety net: unhandled errors / panics become JSON envelopes
//!     → ResponseWriter → native response
//! ```
//!
//! # Design Decisions
//! - `axum` keeps axum's own `from_fn` chaining; `minimal` walks an explicit
//!   cursor over a handler slice
//! - Both share `drive()` so panics, timeouts and late writes behave the same

pub mod axum;
pub mod minimal;

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;

use crate::core::{FrameworkType, RequestState, Server, ServerOptions};
use crate::errors::{describe_panic, find_http_error, ErrorResponse, HttpError};

pub use self::axum::AxumServer;
pub use self::minimal::MinimalServer;

pub(crate) const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Create a server backed by `framework`. An empty port means `"8080"`.
pub fn new_server(framework: FrameworkType, port: &str, show_framework_logs: bool) -> Box<dyn Server> {
    let mut options = ServerOptions::with_port(port);
    options.show_framework_logs = show_framework_logs;
    new_server_with(framework, options)
}

/// Create a server from explicit options.
pub fn new_server_with(framework: FrameworkType, options: ServerOptions) -> Box<dyn Server> {
    if options.show_framework_logs {
        tracing::info!(framework = %framework, port = %options.port, "Creating server");
    }
    match framework {
        FrameworkType::Axum => Box::new(AxumServer::new(options)),
        FrameworkType::Minimal => Box::new(MinimalServer::new(options)),
    }
}

/// Run `chain` to completion, or until the response is committed early.
///
/// A committed response (e.g. by the timeout watcher) is returned right
/// away; the chain keeps running in the background and its writes are
/// dropped.
pub(crate) async fn drive<F>(state: Arc<RequestState>, chain: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let writer = state.writer().clone();
    let mut task = tokio::spawn(chain);

    tokio::select! {
        joined = &mut task => {
            if let Err(err) = joined {
                if err.is_panic() {
                    let detail = describe_panic(err.into_panic().as_ref());
                    tracing::error!(
                        method = %state.info().method,
                        path = state.info().path(),
                        panic = %detail,
                        "Handler panicked with no error middleware installed"
                    );
                    writer.take_over(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        JSON_CONTENT_TYPE,
                        ErrorResponse::internal_server_error("").to_bytes(),
                    );
                }
            }
        }
        _ = writer.committed() => {
            tracing::debug!(path = state.info().path(), "Response committed before the chain finished");
        }
    }

    write_unhandled_errors(&state);
    writer.commit();
}

/// When nothing was written but errors were recorded, answer with the
/// first error's envelope.
fn write_unhandled_errors(state: &RequestState) {
    let writer = state.writer();
    if writer.written() || writer.is_committed() {
        return;
    }
    let errors = state.errors();
    let Some(first) = errors.first() else {
        return;
    };
    let response = find_http_error(first.as_ref())
        .map(HttpError::to_response)
        .unwrap_or_else(|| ErrorResponse::internal_server_error(""));
    writer.send(response.status(), JSON_CONTENT_TYPE, &response.to_bytes());
}

/// 413 envelope for oversized bodies.
pub(crate) fn payload_too_large() -> http::Response<Bytes> {
    error_response(ErrorResponse::new(
        StatusCode::PAYLOAD_TOO_LARGE,
        "Request body too large",
    ))
}

/// 400 envelope for unreadable bodies.
pub(crate) fn unreadable_body() -> http::Response<Bytes> {
    error_response(ErrorResponse::bad_request("Failed to read request body"))
}

fn error_response(body: ErrorResponse) -> http::Response<Bytes> {
    let mut response = http::Response::new(body.to_bytes());
    *response.status_mut() = body.status();
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static(JSON_CONTENT_TYPE),
    );
    response
}
