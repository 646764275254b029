//! Cross-origin resource sharing headers.

use std::sync::Arc;

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::core::{Ctx, HandlerFunc};

/// Configuration for [`cors`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins allowed to call the API. Empty allows every origin.
    pub allowed_domains: Vec<String>,
    pub allowed_methods: String,
    pub allowed_headers: String,
    pub allow_credentials: bool,
    /// Preflight cache lifetime in seconds.
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            allowed_methods: "GET, POST, PUT, DELETE, OPTIONS, PATCH".to_string(),
            allowed_headers: "Origin, Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization, Accept, X-Requested-With".to_string(),
            allow_credentials: true,
            max_age: 86_400,
        }
    }
}

impl CorsConfig {
    /// The `Access-Control-Allow-Origin` value for `origin`, if allowed.
    fn allow_origin<'a>(&self, origin: &'a str) -> Option<&'a str> {
        if self.allowed_domains.is_empty() {
            return Some("*");
        }
        self.allowed_domains
            .iter()
            .any(|domain| domain == origin)
            .then_some(origin)
    }
}

/// CORS middleware.
///
/// Requests without an `Origin` header pass through untouched. Disallowed
/// origins also pass through, just without CORS headers. Preflight
/// (`OPTIONS`) requests from allowed origins are answered with 200 and the
/// chain stops there.
pub fn cors(config: CorsConfig) -> HandlerFunc {
    let config = Arc::new(config);
    HandlerFunc::named("cors", move |c: Ctx| {
        let config = config.clone();
        async move {
            let origin = c.get_header("Origin");
            if origin.is_empty() {
                c.next().await;
                return;
            }

            let Some(allow_origin) = config.allow_origin(&origin) else {
                tracing::debug!(origin = %origin, "Origin not in CORS allow-list");
                c.next().await;
                return;
            };

            c.set_header("Access-Control-Allow-Origin", allow_origin);
            if allow_origin != "*" {
                c.set_header("Vary", "Origin");
            }
            c.set_header("Access-Control-Allow-Methods", &config.allowed_methods);
            c.set_header("Access-Control-Allow-Headers", &config.allowed_headers);
            if config.allow_credentials {
                c.set_header("Access-Control-Allow-Credentials", "true");
            }
            c.set_header("Access-Control-Max-Age", &config.max_age.to_string());

            if c.request().method == Method::OPTIONS {
                c.set_status(StatusCode::OK);
                c.abort();
                return;
            }

            c.next().await;
        }
    })
}

/// CORS middleware allowing every origin.
pub fn default_cors() -> HandlerFunc {
    cors(CorsConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{handler, Server, ServerOptions};
    use crate::engines::MinimalServer;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn server(config: CorsConfig, hits: Arc<AtomicUsize>) -> MinimalServer {
        let server = MinimalServer::new(ServerOptions::default());
        server.use_middleware(vec![cors(config)]);
        let route = handler(move |c: Ctx| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                c.string(StatusCode::OK, "data");
            }
        });
        // OPTIONS reaches the no-method chain, which global middleware still wraps.
        server.get("/api/data", vec![route]);
        server
    }

    fn request(method: Method, origin: Option<&str>) -> http::Request<Bytes> {
        let mut builder = http::Request::builder().method(method).uri("/api/data");
        if let Some(origin) = origin {
            builder = builder.header("Origin", origin);
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn preflight_short_circuits_with_wildcard() {
        let hits = Arc::new(AtomicUsize::new(0));
        let server = server(CorsConfig::default(), hits.clone());
        let response = server
            .dispatch(request(Method::OPTIONS, Some("http://x.com")))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(response.headers()["access-control-max-age"], "86400");
        assert_eq!(response.headers()["access-control-allow-credentials"], "true");
        assert!(response.headers().get("vary").is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn allowed_origin_is_echoed() {
        let hits = Arc::new(AtomicUsize::new(0));
        let config = CorsConfig {
            allowed_domains: vec!["https://example.com".into()],
            ..CorsConfig::default()
        };
        let server = server(config, hits.clone());
        let response = server
            .dispatch(request(Method::GET, Some("https://example.com")))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "https://example.com"
        );
        assert_eq!(response.headers()["vary"], "Origin");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disallowed_origin_gets_no_headers() {
        let hits = Arc::new(AtomicUsize::new(0));
        let config = CorsConfig {
            allowed_domains: vec!["https://example.com".into()],
            ..CorsConfig::default()
        };
        let server = server(config, hits.clone());
        let response = server
            .dispatch(request(Method::GET, Some("https://evil.com")))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("access-control-allow-origin").is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_origin_is_a_no_op() {
        let hits = Arc::new(AtomicUsize::new(0));
        let server = server(CorsConfig::default(), hits.clone());
        let response = server.dispatch(request(Method::GET, None)).await;

        assert!(response.headers().get("access-control-allow-origin").is_none());
        assert_eq!(&response.body()[..], b"data");
    }
}
