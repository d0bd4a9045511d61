//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create one Axum Router per listener (each knows its own `SERVER_PORT`)
//! - Wire up middleware (tracing, request ID)
//! - Admission: method, body size, unknown-length spooling
//! - Dispatch to the upload store or to the CGI coordinator
//! - Observability (metrics, process-wide counters)

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use futures_util::{StreamExt, TryStreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tower_http::trace::TraceLayer;

use crate::cgi::body::{full_body, BodySource};
use crate::cgi::request::{self, CgiRequest};
use crate::cgi::{
    GatewayCoordinator, GatewayResponse, HandlerRegistry, ProcessSupervisor, ServerMeta,
    Termination, UploadStore,
};
use crate::config::{GatewayConfig, ServerConfig};
use crate::http::request::{RequestIdExt, RequestIdLayer, X_REQUEST_ID};
use crate::http::response::{error_response, into_http};
use crate::observability::{metrics, GatewayStats};
use crate::routing::ScriptResolver;
use crate::security::limits::{self, RequestLimits};

/// Upload endpoint and the store behind it.
struct UploadRoute {
    path: String,
    store: UploadStore,
}

/// State shared by every listener.
struct Shared {
    coordinator: GatewayCoordinator,
    resolver: ScriptResolver,
    limits: RequestLimits,
    upload: Option<UploadRoute>,
    stats: GatewayStats,
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    shared: Arc<Shared>,
    meta: Arc<ServerMeta>,
}

/// HTTP front of the gateway.
pub struct HttpServer {
    shared: Arc<Shared>,
    server: ServerConfig,
}

impl HttpServer {
    /// Create the server and every subsystem it drives. Fails if the
    /// document root does not exist.
    pub fn new(config: GatewayConfig) -> io::Result<Self> {
        let registry = HandlerRegistry::new();
        let supervisor = ProcessSupervisor::new(&config.cgi.inherit_env, registry);
        let coordinator =
            GatewayCoordinator::new(supervisor, Duration::from_secs(config.cgi.timeout_secs));

        let upload = config.upload.enabled.then(|| UploadRoute {
            path: config.upload.path.clone(),
            store: UploadStore::from_config(&config.upload),
        });

        let shared = Shared {
            coordinator,
            resolver: ScriptResolver::new(&config.cgi)?,
            limits: RequestLimits::from_config(&config.limits),
            upload,
            stats: GatewayStats::new(),
        };

        Ok(Self {
            shared: Arc::new(shared),
            server: config.server,
        })
    }

    /// Process-wide request counters.
    pub fn stats(&self) -> GatewayStats {
        self.shared.stats.clone()
    }

    /// Live handler registry.
    pub fn registry(&self) -> HandlerRegistry {
        self.shared.coordinator.supervisor().registry().clone()
    }

    /// Router for a listener on `port`.
    pub fn router(&self, port: u16) -> Router {
        let state = AppState {
            shared: Arc::clone(&self.shared),
            meta: Arc::new(ServerMeta {
                name: self.server.name.clone(),
                port,
                software: self.server.software.clone(),
                protocol: self.server.protocol.clone(),
            }),
        };

        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }))
            .layer(RequestIdLayer)
    }

    /// Serve every listener until `shutdown` fires, then drain in-flight
    /// requests.
    pub async fn run(
        self,
        listeners: Vec<TcpListener>,
        shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        let mut tasks = JoinSet::new();

        for listener in listeners {
            let addr = listener.local_addr()?;
            let app = self
                .router(addr.port())
                .into_make_service_with_connect_info::<SocketAddr>();
            let mut stop = shutdown.resubscribe();

            tracing::info!(address = %addr, "HTTP server starting");
            tasks.spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = stop.recv().await;
                    })
                    .await
            });
        }
        drop(shutdown);

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Listener failed");
                    result = Err(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Listener task panicked");
                    result = Err(io::Error::other(e));
                }
            }
        }

        tracing::info!(
            active_handlers = self.shared.coordinator.supervisor().registry().active(),
            "HTTP server stopped"
        );
        result
    }
}

/// Entry point for every request.
async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let request_id = request
        .request_id()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let response = dispatch(&state, &request_id, remote, request).await;

    let status = response.status();
    state.shared.stats.record(status);
    metrics::record_request(method.as_str(), status.as_u16(), start);
    response
}

async fn dispatch(
    state: &AppState,
    request_id: &str,
    remote: SocketAddr,
    request: Request<Body>,
) -> Response {
    let shared = &state.shared;
    let (parts, body) = request.into_parts();

    if !shared.limits.is_allowed(&parts.method) {
        tracing::debug!(request_id = %request_id, method = %parts.method, "Method not allowed");
        let mut response = error_response(StatusCode::METHOD_NOT_ALLOWED);
        response
            .headers_mut()
            .insert(header::ALLOW, shared.limits.allow_header());
        return response;
    }

    let mut declared_length = request::declared_length(&parts.headers);
    let mut source: BodySource = body
        .into_data_stream()
        .map_err(io::Error::other)
        .boxed();

    if let Err(e) = shared.limits.check_declared(declared_length) {
        tracing::warn!(request_id = %request_id, error = %e, "Rejecting request body");
        limits::drain(source).await;
        return e.into_response();
    }

    if declared_length.is_none() && parts.headers.contains_key(header::TRANSFER_ENCODING) {
        match shared.limits.spool(&mut source).await {
            Ok(bytes) => {
                declared_length = Some(bytes.len() as u64);
                source = full_body(bytes);
            }
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Rejecting request body");
                limits::drain(source).await;
                return e.into_response();
            }
        }
    }

    let path = parts.uri.path();
    let query = parts.uri.query().unwrap_or_default();

    if let Some(upload) = &shared.upload {
        if parts.method == Method::POST && path == upload.path {
            return store_upload(state, request_id, upload, query, declared_length, source).await;
        }
    }

    let handler = match shared.resolver.resolve(path).await {
        Ok(handler) => handler,
        Err(e) => {
            tracing::debug!(request_id = %request_id, path = %path, error = %e, "No handler");
            return error_response(e.status());
        }
    };

    let cgi_request = CgiRequest {
        method: parts.method.clone(),
        path: path.to_string(),
        query: query.to_string(),
        headers: parts.headers.clone(),
        declared_length,
        remote_addr: Some(remote),
    };

    let response: GatewayResponse = shared
        .coordinator
        .handle(request_id, &cgi_request, &handler, &state.meta, source)
        .await;
    if response.termination == Some(Termination::Timeout) {
        shared.stats.record_timeout();
    }

    into_http(response, parts.method == Method::HEAD)
}

async fn store_upload(
    state: &AppState,
    request_id: &str,
    upload: &UploadRoute,
    query: &str,
    declared_length: Option<u64>,
    source: BodySource,
) -> Response {
    let requested = url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "filename")
        .map(|(_, value)| value.into_owned());

    match upload
        .store
        .store(requested.as_deref(), declared_length, source)
        .await
    {
        Ok(stored) => {
            state.shared.stats.record_upload();
            let body = serde_json::json!({
                "status": "success",
                "filename": stored.filename,
                "size": stored.size,
            });
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Upload failed");
            error_response(e.status())
        }
    }
}
