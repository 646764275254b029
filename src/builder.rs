//! Fluent server construction.
//!
//! # Data Flow
//! ```text
//! ServerBuilder (collects configs, controllers, middleware)
//!     → build()
//!         error handler → timeout → CORS → logging → auth
//!         → custom middleware → controllers → NoRoute → NoMethod
//!     → Box<dyn Server>
//! ```
//!
//! Controllers flagged `skip_logging` / `skip_auth_check` have their paths
//! appended to the logging and auth skip lists.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::{Controller, FrameworkType, HandlerFunc, Server, ServerOptions};
use crate::engines::new_server_with;
use crate::errors::ServerError;
use crate::middleware::{
    auth, cors, error_handler, logging, timeout, AuthConfig, CorsConfig, ErrorHandlerConfig, LoggingConfig,
    TimeoutConfig,
};

/// Builds a server with middleware installed in a fixed order.
#[derive(Default)]
pub struct ServerBuilder {
    framework: FrameworkType,
    options: ServerOptions,
    controllers: Vec<Arc<dyn Controller>>,
    middleware: Vec<HandlerFunc>,
    logging: Option<LoggingConfig>,
    timeout: Option<TimeoutConfig>,
    cors: Option<CorsConfig>,
    error_handler: Option<ErrorHandlerConfig>,
    auth: Option<AuthConfig>,
    no_route: Vec<HandlerFunc>,
    no_method: Vec<HandlerFunc>,
    default_logging: bool,
    default_timeout: bool,
    default_cors: bool,
    default_error_handler: bool,
}

impl ServerBuilder {
    /// An empty port means `"8080"`.
    pub fn new(framework: FrameworkType, port: &str) -> Self {
        Self {
            framework,
            options: ServerOptions::with_port(port),
            ..Self::default()
        }
    }

    /// Start from a loaded config: engine, options and `[middleware.*]`.
    pub fn from_config(config: &ServerConfig) -> Self {
        let section = &config.middleware;
        Self {
            framework: config.framework,
            options: config.server_options(),
            logging: section.logging.clone(),
            timeout: section.timeout,
            cors: section.cors.clone(),
            error_handler: section.error_handler.clone(),
            ..Self::default()
        }
    }

    pub fn add_controller(mut self, controller: Arc<dyn Controller>) -> Self {
        self.controllers.push(controller);
        self
    }

    pub fn add_controllers(mut self, controllers: impl IntoIterator<Item = Arc<dyn Controller>>) -> Self {
        self.controllers.extend(controllers);
        self
    }

    pub fn add_middleware(mut self, middleware: HandlerFunc) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn add_middlewares(mut self, middleware: impl IntoIterator<Item = HandlerFunc>) -> Self {
        self.middleware.extend(middleware);
        self
    }

    /// Console logging with static custom fields.
    pub fn with_logging(mut self, custom_fields: BTreeMap<String, String>) -> Self {
        self.logging = Some(LoggingConfig {
            custom_fields,
            ..LoggingConfig::default()
        });
        self
    }

    /// Console plus remote logging.
    pub fn with_remote_logging(mut self, remote_url: &str, custom_fields: BTreeMap<String, String>) -> Self {
        self.logging = Some(LoggingConfig {
            remote_url: remote_url.to_string(),
            custom_fields,
            logging_to_remote: true,
            ..LoggingConfig::default()
        });
        self
    }

    /// Full logging configuration, including extra sinks.
    pub fn with_logging_config(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    pub fn with_timeout(mut self, config: TimeoutConfig) -> Self {
        self.timeout = Some(config);
        self
    }

    pub fn with_cors(mut self, config: CorsConfig) -> Self {
        self.cors = Some(config);
        self
    }

    pub fn with_error_handler(mut self, config: ErrorHandlerConfig) -> Self {
        self.error_handler = Some(config);
        self
    }

    pub fn with_auth(mut self, config: AuthConfig) -> Self {
        self.auth = Some(config);
        self
    }

    pub fn with_default_logging(mut self) -> Self {
        self.default_logging = true;
        self
    }

    pub fn with_default_timeout(mut self) -> Self {
        self.default_timeout = true;
        self
    }

    pub fn with_default_cors(mut self) -> Self {
        self.default_cors = true;
        self
    }

    pub fn with_default_error_handling(mut self) -> Self {
        self.default_error_handler = true;
        self
    }

    pub fn with_no_route(mut self, handlers: Vec<HandlerFunc>) -> Self {
        self.no_route = handlers;
        self
    }

    pub fn with_no_method(mut self, handlers: Vec<HandlerFunc>) -> Self {
        self.no_method = handlers;
        self
    }

    pub fn show_framework_logs(mut self, show: bool) -> Self {
        self.options.show_framework_logs = show;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.options.max_body_bytes = limit;
        self
    }

    pub fn with_max_connections(mut self, limit: usize) -> Self {
        self.options.max_connections = limit;
        self
    }

    /// Create the server and register everything.
    ///
    /// Fails only when a middleware configuration is invalid.
    pub fn build(self) -> Result<Box<dyn Server>, ServerError> {
        let server = new_server_with(self.framework, self.options);

        let mut skip_log_paths = Vec::new();
        let mut skip_auth_paths = Vec::new();
        for controller in &self.controllers {
            let path = controller.path();
            if path.is_empty() {
                continue;
            }
            if controller.skip_logging() {
                skip_log_paths.push(path.clone());
            }
            if controller.skip_auth_check() {
                skip_auth_paths.push(path);
            }
        }

        if let Some(config) = self.error_handler {
            server.use_middleware(vec![error_handler(config)]);
        } else if self.default_error_handler {
            server.use_middleware(vec![error_handler(ErrorHandlerConfig::default())]);
        }

        if let Some(config) = self.timeout {
            server.use_middleware(vec![timeout(config)]);
        } else if self.default_timeout {
            server.use_middleware(vec![timeout(TimeoutConfig::default())]);
        }

        if let Some(config) = self.cors {
            server.use_middleware(vec![cors(config)]);
        } else if self.default_cors {
            server.use_middleware(vec![cors(CorsConfig::default())]);
        }

        let logging_config = self.logging.or_else(|| {
            self.default_logging.then(LoggingConfig::default)
        });
        if let Some(mut config) = logging_config {
            config.skip_paths.extend(skip_log_paths);
            server.use_middleware(vec![logging(config)]);
        }

        if let Some(mut config) = self.auth {
            config.skip_paths.extend(skip_auth_paths);
            server.use_middleware(vec![auth(config)?]);
        }

        if !self.middleware.is_empty() {
            server.use_middleware(self.middleware);
        }

        if !self.controllers.is_empty() {
            server.register_router(&self.controllers);
        }

        server.no_route(self.no_route);
        server.no_method(self.no_method);

        Ok(server)
    }
}
