//! servekit: one handler/middleware model over interchangeable HTTP engines.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                     servekit                      │
//!                 │                                                   │
//!   Request ──────┼─▶ engine adapter ──▶ RequestState + Context       │
//!                 │   (axum | minimal)        │                       │
//!                 │                           ▼                       │
//!                 │   global middleware ─▶ group middleware ─▶ route  │
//!                 │   (error handler, timeout, CORS, logging, auth)   │
//!                 │                           │                       │
//!   Response ◀────┼── ResponseWriter ◀────────┘                       │
//!                 │                                                   │
//!                 │  ┌─────────────────────────────────────────────┐  │
//!                 │  │ Cross-cutting: config, lifecycle, net,      │  │
//!                 │  │ observability, errors                       │  │
//!                 │  └─────────────────────────────────────────────┘  │
//!                 └──────────────────────────────────────────────────┘
//! ```
//!
//! Handlers are written once against [`Context`](crate::core::Context) and run
//! unchanged on either engine.

// Contract
pub mod core;
pub mod errors;

// Engines and composition
pub mod builder;
pub mod engines;
pub mod middleware;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use crate::builder::ServerBuilder;
pub use crate::config::{load_config, ServerConfig};
pub use crate::core::{
    handler, Context, ContextExt, Controller, Ctx, FrameworkType, HandlerFunc, HttpMethod, RouterGroup, Server,
    ServerOptions,
};
pub use crate::engines::{new_server, new_server_with};
pub use crate::errors::{ErrorResponse, HttpError, ServerError};
pub use crate::lifecycle::Shutdown;
