//! axum engine server.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, on, MethodFilter, MethodRouter};
use axum::Router;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::StatusCode;
use http_body_util::LengthLimitError;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use super::context::{capture_path_params, AxumContext};
use crate::core::{
    FrameworkType, HandlerFunc, HttpMethod, RequestInfo, RequestState, RouteRegistry, RouteTable, RouterGroup,
    Server, ServerOptions,
};
use crate::engines::{drive, payload_too_large, unreadable_body};
use crate::errors::ServerError;
use crate::lifecycle::ServeControl;
use crate::net::load_tls_config;
use crate::net::tls::parse_listen_addr;

/// Server backed by axum.
pub struct AxumServer {
    options: ServerOptions,
    routes: RouteRegistry,
    control: Arc<ServeControl>,
}

/// Translate `:id` and `*rest` segments into axum's `{id}` and `{*rest}`.
pub fn to_axum_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{name}}}")
            } else if let Some(name) = segment.strip_prefix('*') {
                format!("{{*{name}}}")
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Delete => MethodFilter::DELETE,
        HttpMethod::Patch => MethodFilter::PATCH,
    }
}

fn missing_state() -> Response {
    tracing::error!("Request reached a handler without request state");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

/// Run one handler with access to the rest of the chain.
async fn run_layer(handler: HandlerFunc, req: Request, next: Option<Next>) -> Response {
    let Some(state) = req.extensions().get::<Arc<RequestState>>().cloned() else {
        return missing_state();
    };
    let req = capture_path_params(req, &state).await;
    let ctx = Arc::new(AxumContext::new(state, next.map(|next| (req, next))));
    handler.call(ctx).await;
    StatusCode::OK.into_response()
}

/// Outermost layer: buffer the body, create the request state, drive the
/// chain and turn the writer into the response.
async fn dispatch(max_body_bytes: usize, req: Request, next: Next) -> Response {
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let inner = err.into_inner();
            let response = if inner.downcast_ref::<LengthLimitError>().is_some() {
                payload_too_large()
            } else {
                tracing::debug!(error = %inner, "Failed to read request body");
                unreadable_body()
            };
            return response.map(Body::from);
        }
    };

    let state = Arc::new(RequestState::new(RequestInfo::from_parts(&parts, remote, bytes.clone())));
    let mut req = Request::from_parts(parts, Body::from(bytes));
    req.extensions_mut().insert(state.clone());

    drive(state.clone(), async move {
        let _ = next.run(req).await;
    })
    .await;
    state.writer().to_response()
}

/// A method router running `handlers` in order: all but the last as
/// route layers, the last as the endpoint.
fn chain_router(filter: Option<MethodFilter>, handlers: &[HandlerFunc]) -> MethodRouter {
    let (terminal, layers) = match handlers.split_last() {
        Some((last, rest)) => (Some(last.clone()), rest),
        None => (None, handlers),
    };
    let endpoint = move |req: Request| {
        let terminal = terminal.clone();
        async move {
            match terminal {
                Some(handler) => run_layer(handler, req, None).await,
                None => StatusCode::OK.into_response(),
            }
        }
    };
    let mut router = match filter {
        Some(filter) => on(filter, endpoint),
        None => any(endpoint),
    };
    for handler in layers.iter().rev() {
        let handler = handler.clone();
        router = router.route_layer(middleware::from_fn(move |req: Request, next: Next| {
            run_layer(handler.clone(), req, Some(next))
        }));
    }
    router
}

fn build_router(table: &RouteTable, max_body_bytes: usize, trace: bool) -> Router {
    let mut router = Router::new();
    for route in &table.routes {
        router = router.route(
            &to_axum_path(&route.path),
            chain_router(Some(method_filter(route.method)), &route.handlers),
        );
    }

    let no_method = chain_router(None, &table.no_method_handlers());
    router = router.method_not_allowed_fallback(move |req: Request| {
        let no_method = no_method.clone();
        async move {
            match no_method.oneshot(req).await {
                Ok(response) => response,
                Err(never) => match never {},
            }
        }
    });
    router = router.fallback_service(chain_router(None, &table.no_route_handlers()));

    for handler in table.middleware.iter().rev() {
        let handler = handler.clone();
        router = router.layer(middleware::from_fn(move |req: Request, next: Next| {
            run_layer(handler.clone(), req, Some(next))
        }));
    }
    router = router.layer(middleware::from_fn(move |req: Request, next: Next| {
        dispatch(max_body_bytes, req, next)
    }));
    if trace {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

impl AxumServer {
    pub fn new(options: ServerOptions) -> Self {
        let routes = RouteRegistry::new("axum", options.show_framework_logs);
        Self {
            options,
            routes,
            control: Arc::new(ServeControl::new()),
        }
    }

    /// Compile everything registered so far into an axum router.
    pub fn router(&self) -> Router {
        build_router(
            &self.routes.snapshot(),
            self.options.max_body_bytes,
            self.options.show_framework_logs,
        )
    }
}

impl Server for AxumServer {
    fn framework(&self) -> FrameworkType {
        FrameworkType::Axum
    }

    fn handle(&self, method: HttpMethod, path: &str, handlers: Vec<HandlerFunc>) {
        self.routes.add(method, path, handlers);
    }

    fn group(&self, prefix: &str) -> Box<dyn RouterGroup> {
        Box::new(self.routes.group(prefix))
    }

    fn use_middleware(&self, middleware: Vec<HandlerFunc>) {
        self.routes.use_middleware(middleware);
    }

    fn no_route(&self, handlers: Vec<HandlerFunc>) {
        self.routes.set_no_route(handlers);
    }

    fn no_method(&self, handlers: Vec<HandlerFunc>) {
        self.routes.set_no_method(handlers);
    }

    fn serve(&self, listener: TcpListener) -> BoxFuture<'_, Result<(), ServerError>> {
        Box::pin(async move {
            let addr = listener.local_addr()?;
            let app = self.router();

            tracing::info!(engine = "axum", address = %addr, "Server listening");
            self.control.set_local_addr(Some(addr));
            self.control
                .run(move |mut signal| async move {
                    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                        .with_graceful_shutdown(async move { signal.recv().await })
                        .await
                        .map_err(ServerError::Io)
                })
                .await
        })
    }

    fn run_tls<'a>(&'a self, addr: &'a str, cert_file: &'a Path, key_file: &'a Path) -> BoxFuture<'a, Result<(), ServerError>> {
        Box::pin(async move {
            let addr = parse_listen_addr(addr)?;
            let tls = load_tls_config(cert_file, key_file).await?;
            let app = self.router();
            let control = self.control.clone();

            tracing::info!(engine = "axum", address = %addr, "TLS server starting");
            self.control
                .run(move |mut signal| async move {
                    let handle = axum_server::Handle::new();
                    {
                        let handle = handle.clone();
                        tokio::spawn(async move {
                            signal.recv().await;
                            handle.graceful_shutdown(None);
                        });
                    }
                    {
                        let handle = handle.clone();
                        tokio::spawn(async move {
                            control.set_local_addr(handle.listening().await);
                        });
                    }

                    axum_server::bind_rustls(addr, tls)
                        .handle(handle)
                        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                        .await
                        .map_err(ServerError::Io)
                })
                .await
        })
    }

    fn stop(&self) -> Result<(), ServerError> {
        self.control.stop();
        Ok(())
    }

    fn shutdown(&self, deadline: Duration) -> BoxFuture<'_, Result<(), ServerError>> {
        Box::pin(self.control.shutdown(deadline))
    }

    fn start_lambda(&self) -> BoxFuture<'_, Result<(), ServerError>> {
        Box::pin(async move {
            #[cfg(feature = "lambda")]
            {
                tracing::info!(engine = "axum", "Starting Lambda runtime");
                lambda_http::run(self.router())
                    .await
                    .map_err(|e| ServerError::Lambda(e.to_string()))
            }
            #[cfg(not(feature = "lambda"))]
            {
                Err(ServerError::Unsupported(
                    "Lambda support requires the `lambda` feature".to_string(),
                ))
            }
        })
    }

    fn port(&self) -> String {
        self.control
            .local_addr()
            .map(|addr| addr.port().to_string())
            .unwrap_or_else(|| self.options.port.clone())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.control.local_addr()
    }

    fn dispatch(&self, request: http::Request<Bytes>) -> BoxFuture<'_, http::Response<Bytes>> {
        Box::pin(async move {
            let response = match self.router().oneshot(request.map(Body::from)).await {
                Ok(response) => response,
                Err(never) => match never {},
            };
            let (parts, body) = response.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
            http::Response::from_parts(parts, body)
        })
    }
}
