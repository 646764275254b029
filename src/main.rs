//! servekit demo server.
//!
//! Boots a server from an optional TOML config with two routes:
//! `GET /health` (not access-logged) and `GET /api/hello?name=`.
//! Ctrl-C or SIGTERM starts a graceful shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use http::StatusCode;
use serde_json::json;

use servekit::config::{load_config, ServerConfig};
use servekit::core::{handler, ContextExt, Controller, Ctx, FrameworkType, HandlerFunc, HttpMethod, Server};
use servekit::lifecycle::signals::wait_for_termination;
use servekit::middleware::LoggingConfig;
use servekit::observability::init_tracing;
use servekit::ServerBuilder;

#[derive(Debug, Parser)]
#[command(name = "servekit", version, about = "Demo HTTP server")]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engine: axum (gin) or minimal (std).
    #[arg(long)]
    framework: Option<FrameworkType>,

    /// Listening port.
    #[arg(long)]
    port: Option<String>,

    /// Ship access logs to this URL as well as the console.
    #[arg(long)]
    remote_log_url: Option<String>,
}

struct HealthController;

impl Controller for HealthController {
    fn method(&self) -> HttpMethod {
        HttpMethod::Get
    }

    fn path(&self) -> String {
        "/health".to_string()
    }

    fn handlers(&self) -> Vec<HandlerFunc> {
        vec![handler(|c: Ctx| async move {
            c.json(StatusCode::OK, &json!({"status": "ok"}));
        })]
    }

    fn skip_logging(&self) -> bool {
        true
    }

    fn skip_auth_check(&self) -> bool {
        true
    }
}

struct HelloController;

impl Controller for HelloController {
    fn method(&self) -> HttpMethod {
        HttpMethod::Get
    }

    fn path(&self) -> String {
        "/api/hello".to_string()
    }

    fn handlers(&self) -> Vec<HandlerFunc> {
        vec![handler(|c: Ctx| async move {
            let name = c.default_query("name", "world");
            c.json(StatusCode::OK, &json!({"message": format!("Hello, {name}!")}));
        })]
    }
}

fn apply_cli(config: &mut ServerConfig, cli: Cli) {
    if let Some(framework) = cli.framework {
        config.framework = framework;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(url) = cli.remote_log_url {
        let logging = config
            .middleware
            .logging
            .get_or_insert_with(LoggingConfig::default);
        logging.remote_url = url;
        logging.logging_to_remote = true;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    apply_cli(&mut config, cli);

    init_tracing(&config.observability.log_level)?;
    tracing::info!(
        framework = %config.framework,
        port = %config.port,
        max_connections = config.max_connections,
        tls = config.tls.is_some(),
        "servekit v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let controllers: Vec<Arc<dyn Controller>> = vec![Arc::new(HealthController), Arc::new(HelloController)];
    let server: Arc<dyn Server> = Arc::from(
        ServerBuilder::from_config(&config)
            .with_default_error_handling()
            .with_default_logging()
            .add_controllers(controllers)
            .build()?,
    );

    let mut serving = {
        let server = server.clone();
        let tls = config.tls.clone();
        let addr = format!("0.0.0.0:{}", config.port);
        tokio::spawn(async move {
            match tls {
                Some(tls) => {
                    server
                        .run_tls(&addr, Path::new(&tls.cert_path), Path::new(&tls.key_path))
                        .await
                }
                None => server.run().await,
            }
        })
    };

    tokio::select! {
        result = &mut serving => {
            result??;
        }
        _ = wait_for_termination() => {
            tracing::info!(deadline = ?config.shutdown_timeout(), "Shutting down");
            server.shutdown(config.shutdown_timeout()).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
