//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! library code (tracing::info!/debug!/warn! with structured fields)
//!     → logging.rs (registry + EnvFilter + fmt layer)
//!     → stderr / stdout
//!
//! logging middleware (middleware::logging)
//!     → ApiLog records → console / remote sinks
//! ```
//!
//! # Design Decisions
//! - Operational logs and access logs are separate products
//! - `RUST_LOG` overrides the configured level

pub mod logging;

pub use logging::{default_directives, init_tracing};
