//! Shutdown coordination for serving tasks.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::errors::ServerError;

/// Coordinator for graceful shutdown.
///
/// Backed by a watch channel so late subscribers still see the signal.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered (or the coordinator is gone).
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

#[derive(Debug)]
struct ActiveServe {
    shutdown: Shutdown,
    abort: AbortHandle,
    done: watch::Receiver<bool>,
}

/// Bookkeeping for one server's serving task.
#[derive(Debug, Default)]
pub struct ServeControl {
    active: Mutex<Option<ActiveServe>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl ServeControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveServe>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a serving future on its own task until it exits, is stopped, or
    /// is shut down.
    pub async fn run<F, Fut>(&self, serve: F) -> Result<(), ServerError>
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = Result<(), ServerError>> + Send + 'static,
    {
        let shutdown = Shutdown::new();
        let signal = shutdown.subscribe();
        let (done_tx, done_rx) = watch::channel(false);

        let task = tokio::spawn(serve(signal));
        *self.active() = Some(ActiveServe {
            shutdown,
            abort: task.abort_handle(),
            done: done_rx,
        });

        let result = task.await;
        done_tx.send_replace(true);
        self.active().take();
        self.set_local_addr(None);

        match result {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => {
                tracing::info!("Server stopped");
                Ok(())
            }
            Err(err) => Err(ServerError::Task(err.to_string())),
        }
    }

    /// Abort the serving task right away.
    pub fn stop(&self) {
        if let Some(active) = self.active().as_ref() {
            tracing::info!("Stopping server immediately");
            active.abort.abort();
        }
    }

    /// Signal a graceful shutdown and wait up to `deadline` for the task to
    /// drain; abort it when the deadline passes.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ServerError> {
        let (abort, mut done) = {
            let guard = self.active();
            let Some(active) = guard.as_ref() else {
                return Ok(());
            };
            tracing::info!(deadline_ms = deadline.as_millis() as u64, "Graceful shutdown requested");
            active.shutdown.trigger();
            (active.abort.clone(), active.done.clone())
        };

        let drained = tokio::time::timeout(deadline, done.wait_for(|finished| *finished))
            .await
            .is_ok();
        if drained {
            return Ok(());
        }
        tracing::warn!(deadline_ms = deadline.as_millis() as u64, "Shutdown deadline exceeded; forcing close");
        abort.abort();
        Err(ServerError::ShutdownTimedOut(deadline))
    }

    pub fn is_running(&self) -> bool {
        self.active().is_some()
    }

    pub fn set_local_addr(&self, addr: Option<SocketAddr>) {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = addr;
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut signal = shutdown.subscribe();
        tokio::time::timeout(Duration::from_millis(100), signal.recv())
            .await
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn graceful_shutdown_waits_for_task() {
        let control = Arc::new(ServeControl::new());
        let runner = {
            let control = control.clone();
            tokio::spawn(async move {
                control
                    .run(|mut signal| async move {
                        signal.recv().await;
                        Ok(())
                    })
                    .await
            })
        };
        while !control.is_running() {
            tokio::task::yield_now().await;
        }

        control.shutdown(Duration::from_secs(1)).await.unwrap();
        runner.await.unwrap().unwrap();
        assert!(!control.is_running());
    }

    #[tokio::test]
    async fn shutdown_deadline_forces_close() {
        let control = Arc::new(ServeControl::new());
        let runner = {
            let control = control.clone();
            tokio::spawn(async move {
                control
                    .run(|_signal| async move {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(())
                    })
                    .await
            })
        };
        while !control.is_running() {
            tokio::task::yield_now().await;
        }

        let err = control.shutdown(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, ServerError::ShutdownTimedOut(_)));
        assert!(runner.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn shutdown_when_idle_is_noop() {
        let control = ServeControl::new();
        control.shutdown(Duration::from_millis(10)).await.unwrap();
        control.stop();
    }
}
