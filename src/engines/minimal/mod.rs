//! Engine B: bare hyper with an explicit handler cursor.
//!
//! # Responsibilities
//! - Segment router with `:param` and trailing `*wildcard` support
//! - Handler chain walked by per-invocation frames (`MinimalContext`)
//! - Accept loop with connection limits and graceful draining
//!
//! # Design Decisions
//! - hyper has no middleware, error list or key/value bag, so all of it is
//!   built here on top of the shared `RequestState`
//! - Routes are compiled from the registry when serving starts; later
//!   registrations need a restart

mod context;
mod router;
mod server;

pub use context::MinimalContext;
pub use router::{MinimalRouter, Resolved};
pub use server::MinimalServer;
