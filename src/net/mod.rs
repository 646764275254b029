//! Socket plumbing shared by the engines.
//!
//! # Data Flow
//! ```text
//! TcpListener
//!     → BoundedListener::accept (waits for a free slot)
//!     → Accepted { stream, peer, guard }
//!     → engine connection task (guard dropped when it ends)
//!
//! run_tls: parse_listen_addr + load_tls_config → axum-server rustls acceptor
//! ```

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{Accepted, BoundedListener, ListenerError};
pub use tls::load_tls_config;
