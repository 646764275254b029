//! Engine A: axum router with native middleware chaining.
//!
//! # Data Flow
//! ```text
//! axum::serve / axum_server (TLS) / lambda_http
//!     → TraceLayer (show_framework_logs only)
//!     → dispatch layer: buffer body, create RequestState, drive chain
//!     → one from_fn layer per global middleware (registration order)
//!     → routing: route_layer per route handler, terminal handler last
//!       fallback / method_not_allowed_fallback for NoRoute / NoMethod
//! ```
//!
//! # Design Decisions
//! - `Context::next()` is axum's `Next::run`; aborting drops the pending
//!   `Next` so nothing downstream runs
//! - Per-request state rides in request extensions
//! - Route paths are registered as `:id` / `*rest` and translated to
//!   axum's `{id}` / `{*rest}`

mod context;
mod server;

pub use context::AxumContext;
pub use server::{to_axum_path, AxumServer};
