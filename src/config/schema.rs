//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{FrameworkType, ServerOptions, DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT};
use crate::middleware::{CorsConfig, ErrorHandlerConfig, LoggingConfig, TimeoutConfig};

/// Root configuration for a server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Engine adapter (`axum`/`gin` or `minimal`/`std`).
    pub framework: FrameworkType,

    /// Listening port; `"0"` picks a free one.
    pub port: String,

    /// Raise registration logs to `info` and enable engine request tracing.
    pub show_framework_logs: bool,

    /// Request body limit in bytes.
    pub max_body_bytes: usize,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Graceful shutdown deadline.
    pub shutdown_timeout_secs: u64,

    /// Serve HTTPS when present.
    pub tls: Option<TlsConfig>,

    pub observability: ObservabilityConfig,

    /// Built-in middleware; absent sections are not installed.
    pub middleware: MiddlewareSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            framework: FrameworkType::default(),
            port: DEFAULT_PORT.to_string(),
            show_framework_logs: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_connections: 10_000,
            shutdown_timeout_secs: 30,
            tls: None,
            observability: ObservabilityConfig::default(),
            middleware: MiddlewareSection::default(),
        }
    }
}

impl ServerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Engine construction options.
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            show_framework_logs: self.show_framework_logs,
            max_body_bytes: self.max_body_bytes,
            max_connections: self.max_connections,
            ..ServerOptions::with_port(&self.port)
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// `[middleware.*]` tables.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MiddlewareSection {
    pub error_handler: Option<ErrorHandlerConfig>,
    pub timeout: Option<TimeoutConfig>,
    pub cors: Option<CorsConfig>,
    pub logging: Option<LoggingConfig>,
}
