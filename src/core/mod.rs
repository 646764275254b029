//! Engine-independent request handling contract.
//!
//! # Data Flow
//! ```text
//! engine adapter
//!     → RequestState (request view, writer, params, errors, key/value bag)
//!     → Context (engine-specific next()/abort())
//!     → HandlerFunc chain: [global middleware.., group middleware.., route handlers..]
//!     → ResponseWriter (status capture, buffered body)
//!     → engine converts writer into its native response
//! ```
//!
//! # Design Decisions
//! - Registration is engine-neutral (`RouteRegistry`); engines compile a
//!   snapshot when they start serving
//! - The context is shared as `Arc<dyn Context>`; per-request state lives in
//!   `RequestState` so both engines expose identical behaviour

pub mod context;
pub mod handler;
pub mod request;
pub mod routes;
pub mod server;
pub mod writer;

pub use context::{Context, ContextExt, Ctx};
pub use handler::{handler, HandlerFunc};
pub use request::{RequestInfo, RequestState, Value};
pub use routes::{default_no_method, default_no_route, join_paths, Route, RouteGroup, RouteRegistry, RouteTable};
pub use server::{
    Controller, FrameworkType, HttpMethod, RouterGroup, Server, ServerOptions, DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT,
};
pub use writer::ResponseWriter;
