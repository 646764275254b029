//! Duplicate-request suppression.
//!
//! # Data Flow
//! ```text
//! RequestIdGenerator ──id──► RequestIdStorage::reserve(id)
//!                                 │
//!                 ┌───────────────┼────────────────┐
//!              reserved        duplicate         error
//!                 │               │                │
//!              next()        409 Conflict         500
//! ```
//!
//! `reserve` defaults to `exists` followed by `save`, which leaves a window
//! between the two calls. Storages that can check-and-set atomically should
//! override it, as [`MemoryRequestIdStorage`] does.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::{ContextExt, Ctx, HandlerFunc, RequestInfo};
use crate::errors::{BoxError, ErrorResponse};

/// Derives a deterministic ID from request content.
pub trait RequestIdGenerator: Send + Sync {
    fn generate_request_id(&self, request: &RequestInfo) -> Result<String, BoxError>;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to check request ID: {0}")]
    Check(#[source] BoxError),

    #[error("failed to save request ID: {0}")]
    Save(#[source] BoxError),
}

/// Remembers request IDs that have already been seen.
pub trait RequestIdStorage: Send + Sync {
    fn exists<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool, BoxError>>;

    fn save<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), BoxError>>;

    /// Record `id`; `Ok(false)` when it was already present.
    fn reserve<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        Box::pin(async move {
            if self.exists(id).await.map_err(StorageError::Check)? {
                return Ok(false);
            }
            self.save(id).await.map_err(StorageError::Save)?;
            Ok(true)
        })
    }
}

#[derive(Clone)]
pub struct DuplicateRequestConfig {
    pub generator: Arc<dyn RequestIdGenerator>,
    pub storage: Arc<dyn RequestIdStorage>,
    pub conflict_message: String,
}

impl DuplicateRequestConfig {
    pub fn new(generator: Arc<dyn RequestIdGenerator>, storage: Arc<dyn RequestIdStorage>) -> Self {
        Self {
            generator,
            storage,
            conflict_message: "Duplicate request detected".to_string(),
        }
    }
}

impl fmt::Debug for DuplicateRequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplicateRequestConfig")
            .field("conflict_message", &self.conflict_message)
            .finish_non_exhaustive()
    }
}

/// Duplicate-request middleware.
pub fn duplicate_request(config: DuplicateRequestConfig) -> HandlerFunc {
    let config = Arc::new(config);
    HandlerFunc::named("duplicate_request", move |c: Ctx| {
        let config = config.clone();
        async move {
            let id = match config.generator.generate_request_id(c.request()) {
                Ok(id) => id,
                Err(err) => {
                    tracing::error!(error = %err, "Request ID generation failed");
                    reject(&c, ErrorResponse::internal_server_error("Failed to generate request ID"));
                    return;
                }
            };

            match config.storage.reserve(&id).await {
                Ok(true) => c.next().await,
                Ok(false) => {
                    tracing::info!(request_id = %id, path = c.request().path(), "Duplicate request rejected");
                    reject(&c, ErrorResponse::conflict(config.conflict_message.clone()));
                }
                Err(err) => {
                    tracing::error!(request_id = %id, error = %err, "Request ID storage failed");
                    let message = match err {
                        StorageError::Check(_) => "Failed to check request ID",
                        StorageError::Save(_) => "Failed to save request ID",
                    };
                    reject(&c, ErrorResponse::internal_server_error(message));
                }
            }
        }
    })
}

fn reject(c: &Ctx, response: ErrorResponse) {
    c.json(response.status(), &response);
    c.abort();
}

/// In-process storage with optional expiry.
///
/// With a TTL, expired ids are swept out on write, at most once per TTL.
#[derive(Debug)]
pub struct MemoryRequestIdStorage {
    ids: DashMap<String, Instant>,
    ttl: Option<Duration>,
    last_sweep: Mutex<Instant>,
}

impl Default for MemoryRequestIdStorage {
    fn default() -> Self {
        Self {
            ids: DashMap::new(),
            ttl: None,
            last_sweep: Mutex::new(Instant::now()),
        }
    }
}

impl MemoryRequestIdStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// IDs older than `ttl` are forgotten.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn is_live(&self, seen: Instant) -> bool {
        self.ttl.map_or(true, |ttl| seen.elapsed() < ttl)
    }

    /// Drop expired ids. Must not be called while holding a map guard.
    fn sweep_expired(&self) {
        let Some(ttl) = self.ttl else {
            return;
        };
        {
            let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            if last.elapsed() < ttl {
                return;
            }
            *last = Instant::now();
        }
        let before = self.ids.len();
        self.ids.retain(|_, seen| seen.elapsed() < ttl);
        tracing::debug!(evicted = before.saturating_sub(self.ids.len()), "Expired request ids swept");
    }
}

impl RequestIdStorage for MemoryRequestIdStorage {
    fn exists<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool, BoxError>> {
        let live = self.ids.get(id).is_some_and(|seen| self.is_live(*seen));
        Box::pin(async move { Ok(live) })
    }

    fn save<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), BoxError>> {
        self.sweep_expired();
        self.ids.insert(id.to_string(), Instant::now());
        Box::pin(async { Ok(()) })
    }

    fn reserve<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        self.sweep_expired();
        let reserved = match self.ids.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                if self.is_live(*entry.get()) {
                    false
                } else {
                    entry.insert(Instant::now());
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
                true
            }
        };
        Box::pin(async move { Ok(reserved) })
    }
}

/// Hex SHA-256 over method, path and body.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyHashGenerator;

impl RequestIdGenerator for BodyHashGenerator {
    fn generate_request_id(&self, request: &RequestInfo) -> Result<String, BoxError> {
        let mut hasher = Sha256::new();
        hasher.update(request.method.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(request.path().as_bytes());
        hasher.update(b"\n");
        hasher.update(&request.body);

        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{handler, Server, ServerOptions};
    use crate::engines::MinimalServer;
    use bytes::Bytes;
    use http::StatusCode;

    struct FailingGenerator;

    impl RequestIdGenerator for FailingGenerator {
        fn generate_request_id(&self, _request: &RequestInfo) -> Result<String, BoxError> {
            Err("no entropy".into())
        }
    }

    struct BrokenStorage {
        fail_check: bool,
    }

    impl RequestIdStorage for BrokenStorage {
        fn exists<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, Result<bool, BoxError>> {
            let fail = self.fail_check;
            Box::pin(async move {
                if fail {
                    Err("redis down".into())
                } else {
                    Ok(false)
                }
            })
        }

        fn save<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, Result<(), BoxError>> {
            Box::pin(async { Err("read only".into()) })
        }
    }

    fn server(config: DuplicateRequestConfig) -> MinimalServer {
        let server = MinimalServer::new(ServerOptions::default());
        server.use_middleware(vec![duplicate_request(config)]);
        server.post(
            "/orders",
            vec![handler(|c: Ctx| async move { c.string(StatusCode::CREATED, "created") })],
        );
        server
    }

    fn post(body: &'static str) -> http::Request<Bytes> {
        http::Request::post("/orders").body(Bytes::from_static(body.as_bytes())).unwrap()
    }

    async fn call(server: &MinimalServer, body: &'static str) -> (StatusCode, String) {
        let response = server.dispatch(post(body)).await;
        (response.status(), String::from_utf8_lossy(response.body()).to_string())
    }

    #[tokio::test]
    async fn second_identical_request_conflicts() {
        let storage = Arc::new(MemoryRequestIdStorage::new());
        let server = server(DuplicateRequestConfig::new(Arc::new(BodyHashGenerator), storage.clone()));

        assert_eq!(call(&server, r#"{"a":1}"#).await.0, StatusCode::CREATED);
        let (status, body) = call(&server, r#"{"a":1}"#).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body.contains("Duplicate request detected"));
        assert_eq!(call(&server, r#"{"a":2}"#).await.0, StatusCode::CREATED);
        assert_eq!(storage.len(), 2);
    }

    #[tokio::test]
    async fn collaborator_failures_are_500() {
        let cases: Vec<(DuplicateRequestConfig, &str)> = vec![
            (
                DuplicateRequestConfig::new(
                    Arc::new(FailingGenerator),
                    Arc::new(MemoryRequestIdStorage::new()),
                ),
                "Failed to generate request ID",
            ),
            (
                DuplicateRequestConfig::new(
                    Arc::new(BodyHashGenerator),
                    Arc::new(BrokenStorage { fail_check: true }),
                ),
                "Failed to check request ID",
            ),
            (
                DuplicateRequestConfig::new(
                    Arc::new(BodyHashGenerator),
                    Arc::new(BrokenStorage { fail_check: false }),
                ),
                "Failed to save request ID",
            ),
        ];
        for (config, expected) in cases {
            let (status, body) = call(&server(config), "{}").await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert!(body.contains(expected), "{body}");
        }
    }

    #[tokio::test]
    async fn expired_ids_can_be_reused() {
        let storage = MemoryRequestIdStorage::with_ttl(Duration::from_millis(20));
        assert!(storage.reserve("abc").await.unwrap());
        assert!(!storage.reserve("abc").await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!storage.exists("abc").await.unwrap());
        assert!(storage.reserve("abc").await.unwrap());
    }

    #[tokio::test]
    async fn expired_ids_are_evicted_on_write() {
        let storage = MemoryRequestIdStorage::with_ttl(Duration::from_millis(50));
        for n in 0..1000 {
            assert!(storage.reserve(&format!("id-{n}")).await.unwrap());
        }
        assert_eq!(storage.len(), 1000);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(storage.reserve("fresh").await.unwrap());
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn storage_without_ttl_keeps_everything() {
        let storage = MemoryRequestIdStorage::new();
        storage.save("a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(storage.reserve("b").await.unwrap());
        assert_eq!(storage.len(), 2);
    }

    #[test]
    fn body_hash_is_lowercase_hex_sha256() {
        let (parts, _) = http::Request::get("/ping").body(()).unwrap().into_parts();
        let info = RequestInfo::from_parts(&parts, None, Bytes::new());
        assert_eq!(
            BodyHashGenerator.generate_request_id(&info).unwrap(),
            "5cbaef31d672eeb069cc3bf83b45203cca48ddbc4a32ca99b9cde89e7581de36"
        );
    }

    #[test]
    fn body_hash_depends_on_method_path_and_body() {
        let info = |method: &str, path: &str, body: &'static str| {
            let req = http::Request::builder()
                .method(method)
                .uri(path)
                .body(())
                .unwrap();
            let (parts, _) = req.into_parts();
            RequestInfo::from_parts(&parts, None, Bytes::from_static(body.as_bytes()))
        };
        let id = |r: &RequestInfo| BodyHashGenerator.generate_request_id(r).unwrap();

        let base = id(&info("POST", "/orders", "x"));
        assert_eq!(base.len(), 64);
        assert_eq!(base, id(&info("POST", "/orders", "x")));
        assert_ne!(base, id(&info("PUT", "/orders", "x")));
        assert_ne!(base, id(&info("POST", "/orders/1", "x")));
        assert_ne!(base, id(&info("POST", "/orders", "y")));
    }
}
