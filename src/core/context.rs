//! The per-request context contract.
//!
//! # Responsibilities
//! - Uniform request access (params, query, headers, body binding)
//! - Response writing through the shared [`ResponseWriter`]
//! - Error accumulation and the key/value bag
//! - Chain control: `next()` and `abort()`
//!
//! # Design Decisions
//! - `Context` is object safe so handlers receive `Arc<dyn Context>` from
//!   either engine; generic helpers (`json`, `bind_json`) live on
//!   [`ContextExt`]
//! - Only `next()` and `abort()` differ between engines; everything else is
//!   provided on top of [`RequestState`]
//! - A handler continues the chain only by awaiting `next()`

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::header::{HeaderName, HeaderValue, LOCATION};
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::request::{RequestInfo, RequestState, Value};
use crate::core::writer::ResponseWriter;
use crate::errors::{AnyError, HttpError};

/// Handle passed to every handler.
pub type Ctx = Arc<dyn Context>;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Uniform request context implemented by each engine adapter.
pub trait Context: Send + Sync {
    /// Shared per-request state.
    fn state(&self) -> &RequestState;

    /// Run the remaining handlers in the chain, in order.
    fn next(&self) -> BoxFuture<'_, ()>;

    /// Stop the chain; no handler after the current one runs.
    fn abort(&self);

    fn is_aborted(&self) -> bool {
        self.state().is_aborted()
    }

    fn request(&self) -> &RequestInfo {
        self.state().info()
    }

    fn writer(&self) -> &ResponseWriter {
        self.state().writer()
    }

    /// Path parameter captured by the router, empty when absent.
    fn param(&self, key: &str) -> String {
        self.state().param(key).unwrap_or_default()
    }

    /// Query-string parameter, empty when absent.
    fn query(&self, key: &str) -> String {
        self.state().query(key).unwrap_or_default()
    }

    /// Query-string parameter with a fallback for missing keys.
    fn default_query(&self, key: &str, default: &str) -> String {
        self.state()
            .query(key)
            .unwrap_or_else(|| default.to_string())
    }

    fn get_header(&self, key: &str) -> String {
        self.request().header(key).to_string()
    }

    fn set_header(&self, key: &str, value: &str) {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => self.writer().set_header(name, value),
            _ => tracing::warn!(header = key, "Ignoring invalid response header"),
        }
    }

    fn set_status(&self, code: StatusCode) {
        self.writer().write_header(code);
    }

    /// Write a complete body with an explicit content type.
    fn render(&self, code: StatusCode, content_type: &'static str, body: Bytes) {
        self.writer().send(code, content_type, &body);
    }

    fn string(&self, code: StatusCode, text: &str) {
        self.render(code, TEXT_CONTENT_TYPE, Bytes::copy_from_slice(text.as_bytes()));
    }

    /// Serve a file's bytes; records a NotFound error when unreadable.
    fn file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            match tokio::fs::read(path).await {
                Ok(bytes) => self.render(StatusCode::OK, guess_content_type(path), Bytes::from(bytes)),
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "File not served");
                    self.error(Arc::new(HttpError::not_found(format!(
                        "file not found: {}",
                        path.display()
                    ))));
                }
            }
        })
    }

    fn redirect(&self, code: StatusCode, location: &str) {
        match HeaderValue::from_str(location) {
            Ok(value) => {
                self.writer().set_header(LOCATION, value);
                self.writer().write_header(code);
            }
            Err(_) => {
                self.error(Arc::new(HttpError::internal_server(format!(
                    "invalid redirect location: {location}"
                ))));
            }
        }
    }

    /// Record an error and hand it back. Does not change control flow.
    fn error(&self, err: AnyError) -> AnyError {
        self.state().push_error(err.clone());
        err
    }

    fn errors(&self) -> Vec<AnyError> {
        self.state().errors()
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.state().get(key)
    }

    fn set(&self, key: &str, value: Value) {
        self.state().set(key, value);
    }
}

/// Generic helpers available on every context.
pub trait ContextExt: Context {
    /// Serialize `value` as the JSON body.
    fn json<T: Serialize + ?Sized>(&self, code: StatusCode, value: &T) {
        match serde_json::to_vec(value) {
            Ok(body) => self.render(code, JSON_CONTENT_TYPE, Bytes::from(body)),
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize JSON response");
                self.record_error(HttpError::internal_server(""));
            }
        }
    }

    /// Record any concrete error type.
    fn record_error<E>(&self, err: E) -> AnyError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.error(Arc::new(err))
    }

    /// Decode the body as JSON without touching the response.
    fn should_bind_json<T: DeserializeOwned>(&self) -> Result<T, AnyError> {
        serde_json::from_slice(&self.request().body).map_err(|e| Arc::new(e) as AnyError)
    }

    /// Decode the body as JSON; on failure records a BadRequest error and
    /// aborts the chain.
    fn bind_json<T: DeserializeOwned>(&self) -> Result<T, AnyError> {
        self.should_bind_json().map_err(|err| {
            self.abort();
            self.record_error(HttpError::bad_request(err.to_string()))
        })
    }

    /// Decode the body by content type (form-encoded or JSON); failures are
    /// handled like [`ContextExt::bind_json`].
    fn bind<T: DeserializeOwned>(&self) -> Result<T, AnyError> {
        if self.request().content_type() != "application/x-www-form-urlencoded" {
            return self.bind_json();
        }
        let form: serde_json::Map<String, serde_json::Value> =
            url::form_urlencoded::parse(&self.request().body[..])
                .into_owned()
                .map(|(k, v)| (k, serde_json::Value::String(v)))
                .collect();
        serde_json::from_value(serde_json::Value::Object(form)).map_err(|err| {
            self.abort();
            self.record_error(HttpError::bad_request(err.to_string()))
        })
    }

    /// Typed read from the key/value bag.
    fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key).and_then(|v| v.downcast::<T>().ok())
    }
}

impl<C: Context + ?Sized> ContextExt for C {}

fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => JSON_CONTENT_TYPE,
        Some("txt") => TEXT_CONTENT_TYPE,
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
