//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Serve (shutdown.rs):
//!     Server::serve → ServeControl::run → serving task (abortable)
//!
//! Graceful shutdown:
//!     Server::shutdown(deadline) → Shutdown::trigger → stop accepting
//!     → drain in-flight requests → task exits
//!     (deadline elapsed → task aborted, ShutdownTimedOut)
//!
//! Immediate stop:
//!     Server::stop → task aborted → listener dropped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown of the binary's server
//! ```
//!
//! # Design Decisions
//! - The shutdown signal is sticky: a subscriber created after the trigger
//!   still observes it
//! - Each serve call gets a fresh signal, so a stopped server can run again

pub mod shutdown;
pub mod signals;

pub use shutdown::{ServeControl, Shutdown, ShutdownSignal};
