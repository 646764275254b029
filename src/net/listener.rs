//! Connection-limited accept for the minimal engine.
//!
//! # Responsibilities
//! - Hold back `accept` while `max_connections` connections are open
//! - Hand every accepted stream a [`ConnectionGuard`] that frees its slot

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use super::connection::{ConnectionGuard, ConnectionTracker};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to accept connection: {0}")]
    Accept(#[from] std::io::Error),

    #[error("connection limiter closed")]
    Closed,
}

/// One accepted connection.
#[derive(Debug)]
pub struct Accepted {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    /// Keep alive for as long as the connection is served.
    pub guard: ConnectionGuard,
}

pub struct BoundedListener {
    inner: TcpListener,
    slots: Arc<Semaphore>,
    tracker: ConnectionTracker,
}

impl BoundedListener {
    pub fn new(inner: TcpListener, max_connections: usize, tracker: ConnectionTracker) -> Self {
        let max_connections = max_connections.max(1);
        if let Ok(addr) = inner.local_addr() {
            tracing::info!(address = %addr, max_connections, "Listening");
        }
        Self {
            inner,
            slots: Arc::new(Semaphore::new(max_connections)),
            tracker,
        }
    }

    /// Wait for a free slot, then for the next connection.
    pub async fn accept(&self) -> Result<Accepted, ListenerError> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;
        let (stream, peer) = self.inner.accept().await?;
        let guard = self.tracker.track(permit);

        tracing::debug!(
            connection_id = %guard.id(),
            peer_addr = %peer,
            free_slots = self.slots.available_permits(),
            "Connection accepted"
        );
        Ok(Accepted { stream, peer, guard })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }
}
