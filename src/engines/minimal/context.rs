//! Cursor-driven context for the minimal engine.
//!
//! Every handler invocation gets its own frame that knows which handler
//! comes after it. A frame advances at most once, so calling `next()` twice
//! from the same handler is a no-op the second time, exactly like the axum
//! engine consuming its `Next`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::core::{Context, Ctx, HandlerFunc, RequestState};

/// One step of the chain: `next()` runs `handlers[position]`.
pub struct MinimalContext {
    state: Arc<RequestState>,
    handlers: Arc<[HandlerFunc]>,
    position: usize,
    advanced: AtomicBool,
}

impl MinimalContext {
    pub fn new(state: Arc<RequestState>, handlers: Arc<[HandlerFunc]>) -> Arc<Self> {
        Self::frame(state, handlers, 0)
    }

    fn frame(state: Arc<RequestState>, handlers: Arc<[HandlerFunc]>, position: usize) -> Arc<Self> {
        Arc::new(Self {
            state,
            handlers,
            position,
            advanced: AtomicBool::new(false),
        })
    }

    /// Start the chain at its first handler.
    pub async fn run(self: Arc<Self>) {
        self.next().await;
    }
}

impl Context for MinimalContext {
    fn state(&self) -> &RequestState {
        &self.state
    }

    fn next(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.state.is_aborted() || self.advanced.swap(true, Ordering::SeqCst) {
                return;
            }
            let Some(handler) = self.handlers.get(self.position) else {
                return;
            };
            let ctx: Ctx = Self::frame(self.state.clone(), self.handlers.clone(), self.position + 1);
            handler.call(ctx).await;
        })
    }

    fn abort(&self) {
        self.state.abort();
        self.advanced.store(true, Ordering::SeqCst);
    }
}
