//! Route registration shared by both engines.
//!
//! Registrations are collected into a [`RouteTable`]; each engine compiles
//! a snapshot of the table into its own router when it starts serving.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::core::context::{ContextExt, Ctx};
use crate::core::handler::HandlerFunc;
use crate::core::server::{HttpMethod, RouterGroup};
use crate::errors::HttpError;

/// A registered route: method, normalized path and its own handlers.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: HttpMethod,
    pub path: String,
    pub handlers: Vec<HandlerFunc>,
}

/// Everything registered on a server.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    pub routes: Vec<Route>,
    pub middleware: Vec<HandlerFunc>,
    pub no_route: Vec<HandlerFunc>,
    pub no_method: Vec<HandlerFunc>,
}

impl RouteTable {
    /// NoRoute handlers, or the default that records a NotFound error.
    pub fn no_route_handlers(&self) -> Vec<HandlerFunc> {
        if self.no_route.is_empty() {
            vec![default_no_route()]
        } else {
            self.no_route.clone()
        }
    }

    /// NoMethod handlers, or the default that records a MethodNotAllowed error.
    pub fn no_method_handlers(&self) -> Vec<HandlerFunc> {
        if self.no_method.is_empty() {
            vec![default_no_method()]
        } else {
            self.no_method.clone()
        }
    }
}

/// Records `NotFound("route not found: {path}")`.
pub fn default_no_route() -> HandlerFunc {
    HandlerFunc::named("default_no_route", |c: Ctx| async move {
        let message = format!("route not found: {}", c.request().path());
        c.record_error(HttpError::not_found(message));
    })
}

/// Records `MethodNotAllowed("method {m} not allowed for path {p}")`.
pub fn default_no_method() -> HandlerFunc {
    HandlerFunc::named("default_no_method", |c: Ctx| async move {
        let message = format!(
            "method {} not allowed for path {}",
            c.request().method,
            c.request().path()
        );
        c.record_error(HttpError::method_not_allowed(message));
    })
}

/// Join a group prefix and a route path into a normalized absolute path.
pub fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let joined = if path.is_empty() {
        prefix.to_string()
    } else if path.starts_with('/') {
        format!("{prefix}{path}")
    } else {
        format!("{prefix}/{path}")
    };
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{joined}")
    }
}

/// Shared, lock-protected registration table for one server.
#[derive(Debug, Clone)]
pub struct RouteRegistry {
    table: Arc<RwLock<RouteTable>>,
    engine: &'static str,
    verbose: bool,
}

impl RouteRegistry {
    pub fn new(engine: &'static str, verbose: bool) -> Self {
        Self {
            table: Arc::new(RwLock::new(RouteTable::default())),
            engine,
            verbose,
        }
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Register a route, replacing any earlier route with the same method
    /// and path.
    pub fn add(&self, method: HttpMethod, path: &str, handlers: Vec<HandlerFunc>) {
        let path = join_paths("", path);
        if self.verbose {
            tracing::info!(engine = self.engine, method = %method, path = %path, handlers = handlers.len(), "Route registered");
        } else {
            tracing::debug!(engine = self.engine, method = %method, path = %path, handlers = handlers.len(), "Route registered");
        }

        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = table
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        {
            tracing::warn!(method = %method, path = %path, "Route registered twice; replacing earlier handlers");
            existing.handlers = handlers;
            return;
        }
        table.routes.push(Route {
            method,
            path,
            handlers,
        });
    }

    pub fn use_middleware(&self, middleware: Vec<HandlerFunc>) {
        for m in &middleware {
            if self.verbose {
                tracing::info!(engine = self.engine, middleware = m.name(), "Middleware registered");
            } else {
                tracing::debug!(engine = self.engine, middleware = m.name(), "Middleware registered");
            }
        }
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .middleware
            .extend(middleware);
    }

    pub fn set_no_route(&self, handlers: Vec<HandlerFunc>) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .no_route = handlers;
    }

    pub fn set_no_method(&self, handlers: Vec<HandlerFunc>) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .no_method = handlers;
    }

    pub fn group(&self, prefix: &str) -> RouteGroup {
        RouteGroup {
            registry: self.clone(),
            prefix: join_paths("", prefix),
            middleware: Mutex::new(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> RouteTable {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A path prefix plus middleware shared by the routes registered on it.
#[derive(Debug)]
pub struct RouteGroup {
    registry: RouteRegistry,
    prefix: String,
    middleware: Mutex<Vec<HandlerFunc>>,
}

impl RouteGroup {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn current_middleware(&self) -> Vec<HandlerFunc> {
        self.middleware
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RouterGroup for RouteGroup {
    fn handle(&self, method: HttpMethod, path: &str, handlers: Vec<HandlerFunc>) {
        let mut chain = self.current_middleware();
        chain.extend(handlers);
        self.registry
            .add(method, &join_paths(&self.prefix, path), chain);
    }

    fn group(&self, prefix: &str) -> Box<dyn RouterGroup> {
        Box::new(RouteGroup {
            registry: self.registry.clone(),
            prefix: join_paths(&self.prefix, prefix),
            middleware: Mutex::new(self.current_middleware()),
        })
    }

    fn use_middleware(&self, middleware: Vec<HandlerFunc>) {
        self.middleware
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(middleware);
    }
}
