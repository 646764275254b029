//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use servekit::core::{handler, ContextExt, Ctx, FrameworkType, Server, ServerOptions};
use servekit::errors::ServerError;
use servekit::middleware::{ApiLog, LogSink, LoggingConfig};
use servekit::{new_server, new_server_with};

/// Both engines; every contract test runs against each.
pub const ENGINES: [FrameworkType; 2] = [FrameworkType::Axum, FrameworkType::Minimal];

pub fn test_server(framework: FrameworkType) -> Box<dyn Server> {
    new_server(framework, "0", false)
}

pub fn test_server_with(framework: FrameworkType, configure: impl FnOnce(&mut ServerOptions)) -> Box<dyn Server> {
    let mut options = ServerOptions::with_port("0");
    configure(&mut options);
    new_server_with(framework, options)
}

pub fn get(path: &str) -> http::Request<Bytes> {
    http::Request::get(path).body(Bytes::new()).unwrap()
}

pub fn request(method: &str, path: &str, headers: &[(&str, &str)], body: &'static str) -> http::Request<Bytes> {
    let mut builder = http::Request::builder().method(method).uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Bytes::from_static(body.as_bytes())).unwrap()
}

pub fn json_body(response: &http::Response<Bytes>) -> serde_json::Value {
    serde_json::from_slice(response.body()).unwrap_or(serde_json::Value::Null)
}

pub fn text_body(response: &http::Response<Bytes>) -> String {
    String::from_utf8_lossy(response.body()).to_string()
}

/// Access-log sink that keeps every record.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<ApiLog>>,
}

impl MemorySink {
    pub fn entries(&self) -> Vec<ApiLog> {
        self.entries.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.path).collect()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, entry: &ApiLog) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

/// Logging config that only writes to the returned sink.
pub fn captured_logging(skip_paths: &[&str]) -> (LoggingConfig, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::default());
    let config = LoggingConfig {
        logging_to_console: false,
        skip_paths: skip_paths.iter().map(|p| p.to_string()).collect(),
        ..LoggingConfig::default()
    }
    .with_sink(sink.clone());
    (config, sink)
}

/// A server serving on 127.0.0.1 from a background task.
pub struct Running {
    pub server: Arc<dyn Server>,
    pub addr: SocketAddr,
    pub task: JoinHandle<Result<(), ServerError>>,
}

impl Running {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn spawn(server: Box<dyn Server>) -> Running {
    let server: Arc<dyn Server> = Arc::from(server);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let task = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(listener).await })
    };
    for _ in 0..200 {
        if server.local_addr().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Running { server, addr, task }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Receives remote access logs on `POST /logs`.
pub struct Collector {
    pub running: Running,
    received: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl Collector {
    pub async fn start() -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let server = test_server(FrameworkType::Minimal);
        {
            let received = received.clone();
            server.post(
                "/logs",
                vec![handler(move |c: Ctx| {
                    let received = received.clone();
                    async move {
                        if let Ok(entry) = c.should_bind_json::<serde_json::Value>() {
                            received.lock().unwrap().push(entry);
                        }
                        c.set_status(StatusCode::NO_CONTENT);
                    }
                })],
            );
        }
        Self {
            running: spawn(server).await,
            received,
        }
    }

    pub fn url(&self) -> String {
        self.running.url("/logs")
    }

    /// Wait up to a second for `count` entries.
    pub async fn wait_for(&self, count: usize) -> Vec<serde_json::Value> {
        for _ in 0..100 {
            let entries = self.received.lock().unwrap().clone();
            if entries.len() >= count {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.received.lock().unwrap().clone()
    }
}
