//! Buffered response sink shared by both engines.
//!
//! # Responsibilities
//! - Capture the status code actually sent (first `write_header` wins)
//! - Buffer headers and body until the chain finishes or a watcher commits
//! - Let the timeout watcher replace the buffered response atomically
//!
//! # Design Decisions
//! - One `Mutex` guards all state; it is never held across an await
//! - Commitment is sticky and observable through a `watch` channel so the
//!   engine can return as soon as the response is final
//! - Writes after commitment are dropped; late headers are logged at debug
//!
//! Streaming (flush/hijack) is not supported: every response is buffered.

use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use tokio::sync::watch;

#[derive(Debug, Default)]
struct WriterState {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

/// Status-capturing response writer.
#[derive(Debug)]
pub struct ResponseWriter {
    state: Mutex<WriterState>,
    committed: watch::Sender<bool>,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseWriter {
    pub fn new() -> Self {
        let (committed, _) = watch::channel(false);
        Self {
            state: Mutex::new(WriterState::default()),
            committed,
        }
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Status that was (or will be) sent; 200 when nothing was written.
    pub fn status(&self) -> StatusCode {
        self.lock().status.unwrap_or(StatusCode::OK)
    }

    /// Whether a status or any body bytes have been written.
    pub fn written(&self) -> bool {
        let state = self.lock();
        state.status.is_some() || !state.body.is_empty()
    }

    /// Whether the response is final.
    pub fn is_committed(&self) -> bool {
        *self.committed.borrow()
    }

    /// Record the status code. Only the first call has an effect.
    pub fn write_header(&self, status: StatusCode) {
        if self.is_committed() {
            return;
        }
        let mut state = self.lock();
        if state.status.is_none() {
            state.status = Some(status);
        }
    }

    /// Set a response header. Ignored once the status has been written.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        if self.is_committed() {
            header_dropped(&name, "response committed");
            return;
        }
        let mut state = self.lock();
        let status = state.status;
        match status {
            None => {
                state.headers.insert(name, value);
            }
            Some(status) => header_dropped(&name, status.as_str()),
        }
    }

    /// Append to a response header. Ignored once the status has been written.
    pub fn append_header(&self, name: HeaderName, value: HeaderValue) {
        if self.is_committed() {
            header_dropped(&name, "response committed");
            return;
        }
        let mut state = self.lock();
        let status = state.status;
        match status {
            None => {
                state.headers.append(name, value);
            }
            Some(status) => header_dropped(&name, status.as_str()),
        }
    }

    /// Current value of a response header.
    pub fn header(&self, name: &str) -> Option<HeaderValue> {
        self.lock().headers.get(name).cloned()
    }

    /// Append body bytes, implicitly writing a 200 status first.
    pub fn write(&self, chunk: &[u8]) {
        if self.is_committed() {
            return;
        }
        let mut state = self.lock();
        if state.status.is_none() {
            state.status = Some(StatusCode::OK);
        }
        state.body.extend_from_slice(chunk);
    }

    /// Write status, content type and body in one step.
    pub fn send(&self, status: StatusCode, content_type: &'static str, body: &[u8]) {
        if self.is_committed() {
            return;
        }
        let mut state = self.lock();
        if state.status.is_none() {
            state
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            state.status = Some(status);
        }
        state.body.extend_from_slice(body);
    }

    /// Replace whatever is buffered with `status` and `body`, then commit.
    ///
    /// Returns `false` when the response was already committed.
    pub fn take_over(&self, status: StatusCode, content_type: &'static str, body: Bytes) -> bool {
        {
            let mut state = self.lock();
            if self.is_committed() {
                return false;
            }
            state.status = Some(status);
            state
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            state.body = BytesMut::from(&body[..]);
            self.committed.send_replace(true);
        }
        true
    }

    /// Mark the response as final.
    pub fn commit(&self) {
        let _state = self.lock();
        self.committed.send_replace(true);
    }

    /// Resolve once the response has been committed.
    pub async fn committed(&self) {
        let mut rx = self.committed.subscribe();
        let _ = rx.wait_for(|committed| *committed).await;
    }

    /// Snapshot of status, headers and body.
    pub fn snapshot(&self) -> (StatusCode, HeaderMap, Bytes) {
        let state = self.lock();
        (
            state.status.unwrap_or(StatusCode::OK),
            state.headers.clone(),
            Bytes::copy_from_slice(&state.body),
        )
    }

    /// Build an `http::Response` from the buffered state.
    pub fn to_response<B: From<Bytes>>(&self) -> http::Response<B> {
        let (status, headers, body) = self.snapshot();
        let mut response = http::Response::new(B::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

fn header_dropped(name: &HeaderName, after: &str) {
    tracing::debug!(header = %name, after, "Response header dropped; status already written");
}
