//! Server, router group and controller contracts.

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::core::handler::HandlerFunc;
use crate::errors::ServerError;

/// Port used when none is configured.
pub const DEFAULT_PORT: &str = "8080";

/// Default request body limit (2 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Which engine adapter backs a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameworkType {
    /// Feature-rich router with native middleware chaining (axum).
    #[default]
    #[serde(alias = "gin")]
    Axum,
    /// Bare hyper with an explicit handler cursor.
    #[serde(alias = "std")]
    Minimal,
}

impl FrameworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameworkType::Axum => "axum",
            FrameworkType::Minimal => "minimal",
        }
    }
}

impl fmt::Display for FrameworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameworkType {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "axum" | "gin" => Ok(FrameworkType::Axum),
            "minimal" | "std" => Ok(FrameworkType::Minimal),
            other => Err(ServerError::UnsupportedFramework(other.to_string())),
        }
    }
}

/// HTTP methods routes can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_method(&self) -> http::Method {
        match self {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Delete => http::Method::DELETE,
            HttpMethod::Patch => http::Method::PATCH,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A self-describing route, registered through `register_router`.
pub trait Controller: Send + Sync {
    fn method(&self) -> HttpMethod;
    fn path(&self) -> String;
    fn handlers(&self) -> Vec<HandlerFunc>;

    /// Exclude this route from access logging.
    fn skip_logging(&self) -> bool {
        false
    }

    /// Exclude this route from authentication.
    fn skip_auth_check(&self) -> bool {
        false
    }
}

/// Route registration shared by servers and groups.
pub trait RouterGroup: Send + Sync {
    fn handle(&self, method: HttpMethod, path: &str, handlers: Vec<HandlerFunc>);

    fn get(&self, path: &str, handlers: Vec<HandlerFunc>) {
        self.handle(HttpMethod::Get, path, handlers);
    }

    fn post(&self, path: &str, handlers: Vec<HandlerFunc>) {
        self.handle(HttpMethod::Post, path, handlers);
    }

    fn put(&self, path: &str, handlers: Vec<HandlerFunc>) {
        self.handle(HttpMethod::Put, path, handlers);
    }

    fn delete(&self, path: &str, handlers: Vec<HandlerFunc>) {
        self.handle(HttpMethod::Delete, path, handlers);
    }

    fn patch(&self, path: &str, handlers: Vec<HandlerFunc>) {
        self.handle(HttpMethod::Patch, path, handlers);
    }

    /// Nested group; inherits this group's middleware registered so far.
    fn group(&self, prefix: &str) -> Box<dyn RouterGroup>;

    /// Middleware for routes registered on this group from now on.
    fn use_middleware(&self, middleware: Vec<HandlerFunc>);

    fn register_router(&self, controllers: &[Arc<dyn Controller>]) {
        for controller in controllers {
            self.handle(controller.method(), &controller.path(), controller.handlers());
        }
    }
}

/// Construction options common to both engines.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub port: String,
    pub show_framework_logs: bool,
    pub max_body_bytes: usize,
    pub max_connections: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            show_framework_logs: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_connections: 10_000,
        }
    }
}

impl ServerOptions {
    pub fn with_port(port: &str) -> Self {
        let port = if port.is_empty() { DEFAULT_PORT } else { port };
        Self {
            port: port.to_string(),
            ..Self::default()
        }
    }
}

/// Uniform server surface implemented by each engine adapter.
pub trait Server: Send + Sync {
    fn framework(&self) -> FrameworkType;

    fn handle(&self, method: HttpMethod, path: &str, handlers: Vec<HandlerFunc>);

    fn get(&self, path: &str, handlers: Vec<HandlerFunc>) {
        self.handle(HttpMethod::Get, path, handlers);
    }

    fn post(&self, path: &str, handlers: Vec<HandlerFunc>) {
        self.handle(HttpMethod::Post, path, handlers);
    }

    fn put(&self, path: &str, handlers: Vec<HandlerFunc>) {
        self.handle(HttpMethod::Put, path, handlers);
    }

    fn delete(&self, path: &str, handlers: Vec<HandlerFunc>) {
        self.handle(HttpMethod::Delete, path, handlers);
    }

    fn patch(&self, path: &str, handlers: Vec<HandlerFunc>) {
        self.handle(HttpMethod::Patch, path, handlers);
    }

    fn group(&self, prefix: &str) -> Box<dyn RouterGroup>;

    /// Global middleware, run before every route and fallback handler.
    fn use_middleware(&self, middleware: Vec<HandlerFunc>);

    fn register_router(&self, controllers: &[Arc<dyn Controller>]) {
        for controller in controllers {
            self.handle(controller.method(), &controller.path(), controller.handlers());
        }
    }

    /// Handlers for requests that match no route.
    fn no_route(&self, handlers: Vec<HandlerFunc>);

    /// Handlers for requests whose path matches but method does not.
    fn no_method(&self, handlers: Vec<HandlerFunc>);

    /// Serve on an already bound listener until stopped.
    fn serve(&self, listener: TcpListener) -> BoxFuture<'_, Result<(), ServerError>>;

    /// Bind `0.0.0.0:{port}` and serve.
    fn run(&self) -> BoxFuture<'_, Result<(), ServerError>> {
        Box::pin(async move {
            let addr = format!("0.0.0.0:{}", self.port());
            let listener = TcpListener::bind(&addr).await.map_err(ServerError::Bind)?;
            self.serve(listener).await
        })
    }

    /// Serve HTTPS on `addr` with PEM certificate and key files.
    fn run_tls<'a>(
        &'a self,
        addr: &'a str,
        cert_file: &'a Path,
        key_file: &'a Path,
    ) -> BoxFuture<'a, Result<(), ServerError>>;

    /// Close the listener immediately without waiting for in-flight requests.
    fn stop(&self) -> Result<(), ServerError>;

    /// Stop accepting, drain in-flight requests for at most `deadline`,
    /// then release the listener.
    fn shutdown(&self, deadline: Duration) -> BoxFuture<'_, Result<(), ServerError>>;

    /// Run under a serverless runtime.
    fn start_lambda(&self) -> BoxFuture<'_, Result<(), ServerError>>;

    /// Configured port, or the bound port once serving.
    fn port(&self) -> String;

    /// Bound address while serving.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Route one request through the full chain without a socket.
    fn dispatch(&self, request: http::Request<Bytes>) -> BoxFuture<'_, http::Response<Bytes>>;
}
