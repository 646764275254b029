//! Open-connection bookkeeping for the minimal engine.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection number, shown as `conn-N` in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Shared count of open connections, reported while draining.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    open: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn track(&self, permit: OwnedSemaphorePermit) -> ConnectionGuard {
        self.open.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            open: self.open.clone(),
            id: ConnectionId::next(),
            _slot: permit,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.open.load(Ordering::SeqCst)
    }
}

/// Lives as long as one connection; releases its listener slot on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    open: Arc<AtomicU64>,
    id: ConnectionId,
    _slot: OwnedSemaphorePermit,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Semaphore;

    #[test]
    fn guards_count_and_number_connections() {
        let slots = Arc::new(Semaphore::new(2));
        let tracker = ConnectionTracker::new();
        let first = tracker.track(slots.clone().try_acquire_owned().unwrap());
        let second = tracker.track(slots.clone().try_acquire_owned().unwrap());
        assert_ne!(first.id(), second.id());
        assert!(first.id().to_string().starts_with("conn-"));
        assert_eq!(tracker.active_count(), 2);
        assert_eq!(slots.available_permits(), 0);

        drop(first);
        assert_eq!(tracker.active_count(), 1);
        assert_eq!(slots.available_permits(), 1);
        drop(second);
        assert_eq!(tracker.active_count(), 0);
    }
}
