//! Minimal engine server: hyper connections, compiled router, cursor chain.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;

use super::{MinimalContext, MinimalRouter};
use crate::core::{
    FrameworkType, HandlerFunc, HttpMethod, RequestInfo, RequestState, RouteRegistry, RouterGroup, Server,
    ServerOptions,
};
use crate::engines::{drive, payload_too_large, unreadable_body};
use crate::errors::ServerError;
use crate::lifecycle::{ServeControl, ShutdownSignal};
use crate::net::tls::parse_listen_addr;
use crate::net::{load_tls_config, Accepted, BoundedListener, ConnectionTracker, ListenerError};

/// Server backed by bare hyper.
pub struct MinimalServer {
    options: ServerOptions,
    routes: RouteRegistry,
    control: Arc<ServeControl>,
    connections: ConnectionTracker,
}

/// Per-serve snapshot of the compiled router.
#[derive(Clone)]
struct MinimalService {
    router: Arc<MinimalRouter>,
    max_body_bytes: usize,
}

impl MinimalService {
    async fn handle(self, req: http::Request<Incoming>, remote: Option<SocketAddr>) -> http::Response<Full<Bytes>> {
        let (parts, body) = req.into_parts();
        let body = match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
                return payload_too_large().map(Full::new);
            }
            Err(err) => {
                tracing::debug!(error = %err, "Failed to read request body");
                return unreadable_body().map(Full::new);
            }
        };
        self.respond(parts, body, remote).await.map(Full::new)
    }

    async fn respond(&self, parts: http::request::Parts, body: Bytes, remote: Option<SocketAddr>) -> http::Response<Bytes> {
        let resolved = self.router.resolve(&parts.method, parts.uri.path());
        let state = Arc::new(RequestState::new(RequestInfo::from_parts(&parts, remote, body)));
        state.set_params(resolved.params);

        let ctx = MinimalContext::new(state.clone(), resolved.handlers);
        drive(state.clone(), ctx.run()).await;
        state.writer().to_response()
    }
}

impl MinimalServer {
    pub fn new(options: ServerOptions) -> Self {
        let routes = RouteRegistry::new("minimal", options.show_framework_logs);
        Self {
            options,
            routes,
            control: Arc::new(ServeControl::new()),
            connections: ConnectionTracker::new(),
        }
    }

    fn service(&self) -> MinimalService {
        MinimalService {
            router: Arc::new(MinimalRouter::compile(&self.routes.snapshot())),
            max_body_bytes: self.options.max_body_bytes,
        }
    }

    /// Active connection count (plain HTTP only).
    pub fn active_connections(&self) -> u64 {
        self.connections.active_count()
    }
}

async fn accept_loop(
    service: MinimalService,
    listener: BoundedListener,
    connections: ConnectionTracker,
    mut signal: ShutdownSignal,
) -> Result<(), ServerError> {
    let graceful = GracefulShutdown::new();
    let builder = auto::Builder::new(TokioExecutor::new());

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let Accepted { stream, peer, guard } = match accepted {
                    Ok(accepted) => accepted,
                    Err(ListenerError::Closed) => break,
                    Err(err) => {
                        tracing::warn!(error = %err, "Accept failed");
                        continue;
                    }
                };
                let service = service.clone();
                let hyper_service = hyper::service::service_fn(move |req| {
                    let service = service.clone();
                    async move { Ok::<_, Infallible>(service.handle(req, Some(peer)).await) }
                });
                let conn = builder
                    .serve_connection_with_upgrades(TokioIo::new(stream), hyper_service)
                    .into_owned();
                let conn = graceful.watch(conn);
                tokio::spawn(async move {
                    if let Err(err) = conn.await {
                        tracing::debug!(connection_id = %guard.id(), error = %err, "Connection error");
                    }
                    drop(guard);
                });
            }
            _ = signal.recv() => break,
        }
    }

    drop(listener);
    tracing::info!(active_connections = connections.active_count(), "Listener closed; draining connections");
    graceful.shutdown().await;
    tracing::info!("All connections drained");
    Ok(())
}

impl Server for MinimalServer {
    fn framework(&self) -> FrameworkType {
        FrameworkType::Minimal
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
            let listener = BoundedListener::new(listener, self.options.max_connections, self.connections.clone());
            let service = self.service();
            let connections = self.connections.clone();

            tracing::info!(engine = "minimal", address = %addr, "Server listening");
            self.control.set_local_addr(Some(addr));
            self.control
                .run(move |signal| accept_loop(service, listener, connections, signal))
                .await
        })
    }

    fn run_tls<'a>(&'a self, addr: &'a str, cert_file: &'a Path, key_file: &'a Path) -> BoxFuture<'a, Result<(), ServerError>> {
        Box::pin(async move {
            let addr = parse_listen_addr(addr)?;
            let tls = load_tls_config(cert_file, key_file).await?;
            let service = self.service();
            let control = self.control.clone();

            tracing::info!(engine = "minimal", address = %addr, "TLS server starting");
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

                    let make_service = tower::service_fn(move |peer: SocketAddr| {
                        let service = service.clone();
                        async move {
                            Ok::<_, Infallible>(tower::service_fn(move |req: http::Request<Incoming>| {
                                let service = service.clone();
                                async move { Ok::<_, Infallible>(service.handle(req, Some(peer)).await) }
                            }))
                        }
                    });

                    axum_server::bind_rustls(addr, tls)
                        .handle(handle)
                        .serve(make_service)
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
        Box::pin(async {
            Err(ServerError::Unsupported(
                "Lambda is only supported with the axum engine".to_string(),
            ))
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
            let (parts, body) = request.into_parts();
            if body.len() > self.options.max_body_bytes {
                return payload_too_large();
            }
            self.service().respond(parts, body, None).await
        })
    }
}
