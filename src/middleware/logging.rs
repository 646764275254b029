//! Structured access logging.
//!
//! # Responsibilities
//! - Assign or propagate `X-Request-ID`
//! - Time the downstream chain (latency brackets `next()` exactly)
//! - Build one [`ApiLog`] per request and hand it to every [`LogSink`]
//!
//! # Data Flow
//! ```text
//! request ──► skip list? ──yes──► next() (no record)
//!                │ no
//!          start clock ──► next() ──► stop clock
//!                                        │
//!                              ApiLog { status, latency, error, ... }
//!                                        │
//!                    ┌───────────────────┼──────────────────┐
//!               ConsoleSink          RemoteSink         custom sinks
//!           (stdout, indented)   (POST, spawned task)
//! ```
//!
//! # Design Decisions
//! - Remote delivery is fire-and-forget; failures are logged through
//!   `tracing` and never touch the response
//! - The Authorization header is logged verbatim only when console logging
//!   is on; otherwise just the scheme survives

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use http::header::{HeaderValue, USER_AGENT};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::core::{Ctx, HandlerFunc, RequestInfo};
use crate::errors::find_http_error;
use crate::middleware::skip::is_skip_path;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// One access-log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiLog {
    pub client_ip: String,
    /// RFC 3339 time the record was built.
    pub timestamp: String,
    pub method: String,
    pub path: String,
    pub protocol: String,
    pub status_code: u16,
    /// Milliseconds spent in the downstream chain.
    pub latency: i64,
    pub user_agent: String,
    pub error: String,
    pub request_id: String,
    pub authorization: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, String>,
}

/// Destination for access-log records. Must not block.
pub trait LogSink: Send + Sync {
    fn emit(&self, entry: &ApiLog);
}

/// Pretty-printed JSON on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn emit(&self, entry: &ApiLog) {
        match serde_json::to_string_pretty(entry) {
            Ok(json) => println!("{json}"),
            Err(err) => tracing::warn!(error = %err, "Failed to serialize access log"),
        }
    }
}

/// JSON POST to a collector, sent from a spawned task.
#[derive(Debug, Clone)]
pub struct RemoteSink {
    url: String,
    client: reqwest::Client,
}

impl RemoteSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl LogSink for RemoteSink {
    fn emit(&self, entry: &ApiLog) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(url = %self.url, "No async runtime; access log not shipped");
            return;
        };
        let request = self.client.post(&self.url).json(entry);
        let url = self.url.clone();
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().as_u16() >= 400 => {
                    tracing::warn!(url = %url, status = response.status().as_u16(), "Remote log collector rejected entry");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(url = %url, error = %err, "Failed to ship access log");
                }
            }
        });
    }
}

/// Configuration for [`logging`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub remote_url: String,
    /// Static fields copied into every record.
    pub custom_fields: BTreeMap<String, String>,
    pub logging_to_console: bool,
    pub logging_to_remote: bool,
    pub skip_paths: Vec<String>,
    /// Extra sinks beyond the console and remote ones.
    #[serde(skip)]
    pub sinks: Vec<Arc<dyn LogSink>>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            remote_url: String::new(),
            custom_fields: BTreeMap::new(),
            logging_to_console: true,
            logging_to_remote: false,
            skip_paths: Vec::new(),
            sinks: Vec::new(),
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("remote_url", &self.remote_url)
            .field("custom_fields", &self.custom_fields)
            .field("logging_to_console", &self.logging_to_console)
            .field("logging_to_remote", &self.logging_to_remote)
            .field("skip_paths", &self.skip_paths)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl LoggingConfig {
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    fn build_sinks(&self) -> Vec<Arc<dyn LogSink>> {
        let mut sinks: Vec<Arc<dyn LogSink>> = Vec::new();
        if self.logging_to_console {
            sinks.push(Arc::new(ConsoleSink));
        }
        if self.logging_to_remote && !self.remote_url.is_empty() {
            sinks.push(Arc::new(RemoteSink::new(self.remote_url.clone())));
        }
        sinks.extend(self.sinks.iter().cloned());
        sinks
    }
}

/// Console-only logging configuration.
pub fn default_console_logging(
    skip_paths: Vec<String>,
    custom_fields: BTreeMap<String, String>,
) -> LoggingConfig {
    LoggingConfig {
        skip_paths,
        custom_fields,
        ..LoggingConfig::default()
    }
}

/// Access-logging middleware.
pub fn logging(config: LoggingConfig) -> HandlerFunc {
    let sinks: Arc<[Arc<dyn LogSink>]> = config.build_sinks().into();
    let config = Arc::new(config);

    HandlerFunc::named("logging", move |c: Ctx| {
        let config = config.clone();
        let sinks = sinks.clone();
        async move {
            if is_skip_path(c.request().path(), &config.skip_paths) {
                c.next().await;
                return;
            }

            let request_id = match c.request().header(REQUEST_ID_HEADER) {
                "" => uuid::Uuid::new_v4().to_string(),
                existing => existing.to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                c.writer().set_header(http::HeaderName::from_static("x-request-id"), value);
            }

            let started = Instant::now();
            c.next().await;
            let latency = started.elapsed().as_millis() as i64;

            let entry = build_entry(&c, &config, request_id, latency);
            for sink in sinks.iter() {
                sink.emit(&entry);
            }
        }
    })
}

/// Logging with the default console configuration.
pub fn default_logging() -> HandlerFunc {
    logging(LoggingConfig::default())
}

fn build_entry(c: &Ctx, config: &LoggingConfig, request_id: String, latency: i64) -> ApiLog {
    let request = c.request();
    let errors = c.errors();

    // Errors not yet turned into a response will be, by the error handler or
    // the engine, with this status.
    let status = if c.writer().written() || errors.is_empty() {
        c.writer().status()
    } else {
        errors
            .first()
            .and_then(|err| find_http_error(err.as_ref()))
            .map(|http| http.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    };

    let error = if !errors.is_empty() {
        errors
            .iter()
            .map(|err| err.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    } else if status.as_u16() >= 400 {
        format!("HTTP error: {}", status.as_u16())
    } else {
        "none".to_string()
    };

    ApiLog {
        client_ip: client_ip(request),
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        method: request.method.to_string(),
        path: request.path().to_string(),
        protocol: format!("{:?}", request.version),
        status_code: status.as_u16(),
        latency,
        user_agent: request.header(USER_AGENT.as_str()).to_string(),
        error,
        request_id,
        authorization: mask_authorization(request.header("Authorization"), !config.logging_to_console),
        custom_fields: config.custom_fields.clone(),
    }
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the peer address.
pub fn client_ip(request: &RequestInfo) -> String {
    let forwarded = request.header("X-Forwarded-For");
    if !forwarded.is_empty() {
        return forwarded.split(',').next().unwrap_or_default().trim().to_string();
    }
    let real_ip = request.header("X-Real-IP");
    if !real_ip.is_empty() {
        return real_ip.to_string();
    }
    request
        .remote_addr
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default()
}

/// Hide the credential, keeping the scheme when there is one.
pub fn mask_authorization(value: &str, mask: bool) -> String {
    if value.is_empty() || !mask {
        return value.to_string();
    }
    match value.split(' ').collect::<Vec<_>>().as_slice() {
        [scheme, _] => format!("{scheme} [MASKED]"),
        _ => "[MASKED]".to_string(),
    }
}
