//! Context backed by axum's `Next`.

use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{FromRequestParts, RawPathParams, Request};
use axum::middleware::Next;
use futures_util::future::BoxFuture;

use crate::core::{Context, RequestState};

/// Context for one axum middleware or handler invocation.
///
/// Holds the request and `Next` needed to continue the chain; `next()`
/// consumes them, so the rest of the chain runs at most once per handler.
pub struct AxumContext {
    state: Arc<RequestState>,
    downstream: Mutex<Option<(Request, Next)>>,
}

impl AxumContext {
    pub fn new(state: Arc<RequestState>, downstream: Option<(Request, Next)>) -> Self {
        Self {
            state,
            downstream: Mutex::new(downstream),
        }
    }

    fn take_downstream(&self) -> Option<(Request, Next)> {
        self.downstream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Context for AxumContext {
    fn state(&self) -> &RequestState {
        &self.state
    }

    fn next(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.state.is_aborted() {
                return;
            }
            if let Some((req, next)) = self.take_downstream() {
                // The real response is assembled from the shared writer.
                let _ = next.run(req).await;
            }
        })
    }

    fn abort(&self) {
        self.state.abort();
        drop(self.take_downstream());
    }
}

/// Copy axum's matched path parameters into the request state.
pub(crate) async fn capture_path_params(req: Request, state: &RequestState) -> Request {
    let (mut parts, body) = req.into_parts();
    if let Ok(params) = RawPathParams::from_request_parts(&mut parts, &()).await {
        state.set_params(
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }
    Request::from_parts(parts, body)
}
