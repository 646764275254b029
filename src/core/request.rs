//! Per-request state shared by every handler in a chain.

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, Uri, Version};

use crate::core::writer::ResponseWriter;
use crate::errors::AnyError;

/// Value stored in the request key/value bag.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Immutable view of the incoming request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    /// Peer address, when the engine knows it.
    pub remote_addr: Option<SocketAddr>,
    /// Fully buffered body.
    pub body: Bytes,
}

impl RequestInfo {
    /// Build from request parts and a buffered body.
    pub fn from_parts(parts: &http::request::Parts, remote_addr: Option<SocketAddr>, body: Bytes) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            version: parts.version,
            headers: parts.headers.clone(),
            remote_addr,
            body,
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Header value as a string, empty when absent or not valid UTF-8.
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// Media type without parameters, e.g. `application/json`.
    pub fn content_type(&self) -> &str {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::trim)
            .unwrap_or("")
    }
}

/// State owned by one request for the duration of its chain.
///
/// Everything mutable is behind its own lock so the timeout watcher can
/// touch the writer while the handler path keeps running.
#[derive(Debug)]
pub struct RequestState {
    info: RequestInfo,
    writer: Arc<ResponseWriter>,
    params: RwLock<Vec<(String, String)>>,
    query: OnceLock<Vec<(String, String)>>,
    errors: Mutex<Vec<AnyError>>,
    keys: RwLock<HashMap<String, Value>>,
    aborted: AtomicBool,
}

impl RequestState {
    pub fn new(info: RequestInfo) -> Self {
        Self {
            info,
            writer: Arc::new(ResponseWriter::new()),
            params: RwLock::new(Vec::new()),
            query: OnceLock::new(),
            errors: Mutex::new(Vec::new()),
            keys: RwLock::new(HashMap::new()),
            aborted: AtomicBool::new(false),
        }
    }

    pub fn info(&self) -> &RequestInfo {
        &self.info
    }

    pub fn writer(&self) -> &Arc<ResponseWriter> {
        &self.writer
    }

    /// Replace captured path parameters. Called by the engine's router.
    pub fn set_params(&self, params: Vec<(String, String)>) {
        *self.params.write().unwrap_or_else(PoisonError::into_inner) = params;
    }

    pub fn param(&self, key: &str) -> Option<String> {
        self.params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn params(&self) -> Vec<(String, String)> {
        self.params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// First value of a query-string parameter.
    pub fn query(&self, key: &str) -> Option<String> {
        self.query
            .get_or_init(|| {
                self.info
                    .uri
                    .query()
                    .map(|q| {
                        url::form_urlencoded::parse(q.as_bytes())
                            .into_owned()
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn push_error(&self, err: AnyError) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(err);
    }

    pub fn errors(&self) -> Vec<AnyError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: &str, value: Value) {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}
