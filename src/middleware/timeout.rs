//! Request timeout enforcement.
//!
//! A watcher task races the downstream chain. If the deadline fires first it
//! takes over the response writer with a 503; whichever side commits first
//! wins and the other side's output is dropped. The downstream handler is
//! not cancelled and keeps running in the background.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::core::{Ctx, HandlerFunc};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for [`timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Aborts the watcher when the handler path finishes or unwinds.
struct Watcher {
    task: JoinHandle<()>,
    done: Arc<AtomicBool>,
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

/// Timeout middleware. A zero duration falls back to the default.
pub fn timeout(config: TimeoutConfig) -> HandlerFunc {
    let limit = if config.timeout.is_zero() {
        DEFAULT_TIMEOUT
    } else {
        config.timeout
    };
    tracing::info!(timeout = ?limit, "Timeout middleware configured");

    HandlerFunc::named("timeout", move |c: Ctx| async move {
        let done = Arc::new(AtomicBool::new(false));
        let task = {
            let c = c.clone();
            let done = done.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                if done.load(Ordering::SeqCst) {
                    return;
                }
                let body = Bytes::from(format!("Request timed out after {limit:?}"));
                if c.writer().take_over(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "text/plain; charset=utf-8",
                    body,
                ) {
                    tracing::warn!(
                        method = %c.request().method,
                        path = c.request().path(),
                        timeout = ?limit,
                        "Request timed out"
                    );
                }
            })
        };
        let _watcher = Watcher { task, done };

        c.next().await;
    })
}

/// Timeout middleware with the default 2s limit.
pub fn default_timeout() -> HandlerFunc {
    timeout(TimeoutConfig::default())
}
