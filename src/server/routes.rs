//! Router configuration for the registry.
//!
//! Every request lands in a single axum fallback, [`dispatch_handler`], which
//! receives the body, tags the request with an id and hands it to the ordered
//! [`RouteTable`] on the blocking pool. Bodies larger than the spool
//! threshold are streamed to a file in the data directory instead of being
//! held in memory.
//!
//! # Route Structure
//!
//! Registration order is precedence:
//!
//! ```text
//! GET  /v{n}/_ping                               - Liveness (public)
//! GET  /v{n}/users                               - Login check
//! POST /v{n}/users/                              - Login bootstrap (public)
//! GET  /v{n}/images/{id}/ancestry                - Parent chain
//! GET  /v{n}/images/{id}/layer                   - Layer blob
//! GET  /v{n}/images/{id}/json                    - Attributes
//! PUT  /v{n}/images/{id}/{resource}              - Upload resource
//! GET  /v{n}/repositories/{ns}/{name}/tags       - List tags
//! GET  /v{n}/repositories/{ns}/{name}/images     - List images
//! PUT  /v{n}/repositories/{ns}/{name}/tags/{tag} - Set tag
//! PUT  /v{n}/repositories/{ns}/{name}/images     - Replace image list
//! PUT  /v{n}/repositories/{ns}/{name}/           - Start push
//! ```
//!
//! # Example
//!
//! ```ignore
//! use registry_v1::server::routes::{create_router, RouterConfig};
//!
//! let config = RouterConfig::new("/var/lib/registry")
//!     .with_secret("change-me")
//!     .with_password("hunter2");
//!
//! let router = create_router(config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:5000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    response::{IntoResponse, Response},
    Json, Router,
};
use bytes::BytesMut;
use futures::StreamExt;
use http::{HeaderValue, Method, StatusCode};
use tokio::io::{AsyncWriteExt, BufWriter};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::auth::{
    CredentialVerifier, DenyAllVerifier, NoopAuthenticator, RepoAuthenticator, SessionAuth,
    SinglePasswordVerifier,
};
use super::handlers::{self, ErrorResponse, RegistryContext, X_REQUEST_ID};
use super::router::{Authenticator, PatternMatcher, RequestBody, RouteRequest, RouteTable};
use crate::store::{ContentStore, SpooledFile};

/// Default request body limit (1 GiB), large enough for typical layers.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024 * 1024;

/// Bodies up to this size (1 MiB) stay in memory; larger ones are spooled.
pub const DEFAULT_SPOOL_THRESHOLD: usize = 1024 * 1024;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Root of the on-disk content store
    pub data_dir: PathBuf,

    /// HMAC key for session tokens (None = Basic logins are refused)
    pub secret: Option<String>,

    /// Password accepted for any login (None = Basic logins are refused)
    pub password: Option<String>,

    /// Only serve repositories in this namespace
    pub namespace: Option<String>,

    /// `X-Docker-Endpoints` fallback when a request has no `Host` header
    pub default_endpoint: String,

    /// Largest request body accepted, in bytes
    pub max_body_size: usize,

    /// Largest request body held in memory, in bytes
    pub spool_threshold: usize,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a new router configuration serving `data_dir`.
    ///
    /// By default:
    /// - Basic logins are refused (no secret, no password)
    /// - All namespaces are served
    /// - Bodies up to 1 GiB are accepted, bodies over 1 MiB are spooled to disk
    /// - Tracing is enabled
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            secret: None,
            password: None,
            namespace: None,
            default_endpoint: "localhost:5000".to_string(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
            enable_tracing: true,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_default_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.default_endpoint = endpoint.into();
        self
    }

    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn with_spool_threshold(mut self, bytes: usize) -> Self {
        self.spool_threshold = bytes;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Whether Basic logins can succeed with this configuration.
    pub fn logins_enabled(&self) -> bool {
        self.secret.is_some() && self.password.is_some()
    }

    /// Build the session manager described by this configuration.
    pub fn session_auth(&self) -> SessionAuth {
        let verifier: Arc<dyn CredentialVerifier> = match (&self.secret, &self.password) {
            (Some(_), Some(password)) => Arc::new(SinglePasswordVerifier::new(password)),
            _ => Arc::new(DenyAllVerifier),
        };
        SessionAuth::new(verifier, self.secret.as_deref().unwrap_or_default())
    }

    fn context(&self) -> RegistryContext {
        let context = RegistryContext::new(
            ContentStore::new(self.data_dir.clone()),
            self.default_endpoint.clone(),
        );
        match &self.namespace {
            Some(namespace) => context.with_namespace(namespace.clone()),
            None => context,
        }
    }
}

// =============================================================================
// Route Table
// =============================================================================

fn route(pattern: &str) -> PatternMatcher {
    PatternMatcher::versioned(pattern).expect("built-in route patterns are valid")
}

/// The registry's route bindings, most specific first.
pub fn registry_routes(auth: Arc<SessionAuth>) -> RouteTable<RegistryContext> {
    let open: Arc<dyn Authenticator> = Arc::new(NoopAuthenticator);
    let repo: Arc<dyn Authenticator> = Arc::new(RepoAuthenticator::new(auth));

    let mut table = RouteTable::new();
    table
        .register(Method::GET, route("_ping"), Arc::clone(&open), handlers::ping)
        .register(Method::GET, route("users"), Arc::clone(&repo), handlers::get_users)
        .register(Method::POST, route("users/?$"), Arc::clone(&open), handlers::post_users)
        // images
        .register(
            Method::GET,
            route("images/(.*?)/ancestry"),
            Arc::clone(&repo),
            handlers::image_ancestry,
        )
        .register(
            Method::GET,
            route("images/(.*?)/layer"),
            Arc::clone(&repo),
            handlers::image_layer,
        )
        .register(
            Method::GET,
            route("images/(.*?)/json"),
            Arc::clone(&repo),
            handlers::image_json,
        )
        .register(
            Method::PUT,
            route("images/(.*?)/(.*)"),
            Arc::clone(&repo),
            handlers::put_image_resource,
        )
        // repositories
        .register(
            Method::GET,
            route("repositories/(.*?)/(.*?)/tags/?$"),
            Arc::clone(&repo),
            handlers::repository_tags,
        )
        .register(
            Method::GET,
            route("repositories/(.*?)/(.*?)/images/?$"),
            Arc::clone(&repo),
            handlers::repository_images,
        )
        .register(
            Method::PUT,
            route("repositories/(.*?)/(.*?)/tags/(.*)"),
            Arc::clone(&repo),
            handlers::put_repository_tag,
        )
        .register(
            Method::PUT,
            route("repositories/(.*?)/(.*?)/images/?$"),
            Arc::clone(&repo),
            handlers::put_repository_images,
        )
        .register(
            Method::PUT,
            route("repositories/(.*?)/(.*?)/?$"),
            repo,
            handlers::put_repository,
        );
    table
}

// =============================================================================
// Dispatcher
// =============================================================================

/// State shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable<RegistryContext>>,
    pub context: Arc<RegistryContext>,
    pub max_body_size: usize,
    pub spool_threshold: usize,
}

impl AppState {
    pub fn new(config: &RouterConfig) -> Self {
        let auth = Arc::new(config.session_auth());
        Self {
            routes: Arc::new(registry_routes(auth)),
            context: Arc::new(config.context()),
            max_body_size: config.max_body_size,
            spool_threshold: config.spool_threshold,
        }
    }
}

/// Entry point for every request.
///
/// Assigns a fresh `X-Request-ID`, receives the body (413 past the limit),
/// runs the route table on the blocking pool and answers 404 when nothing
/// matches.
pub async fn dispatch_handler(State(state): State<AppState>, request: Request) -> Response {
    let started = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let (parts, body) = request.into_parts();
    let method = parts.method;
    let path = parts.uri.path().to_string();
    let headers = parts.headers;

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path
    );

    async move {
        let mut response = match read_body(body, &state).await {
            Ok(body) => {
                let request = RouteRequest::new(method, path, headers, body);
                route_request(&state, request).await
            }
            Err(response) => response,
        };

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(X_REQUEST_ID, value);
        }

        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Finished request"
        );
        response
    }
    .instrument(span)
    .await
}

/// Receive the request body, spooling it to disk once it outgrows the
/// in-memory threshold.
async fn read_body(body: Body, state: &AppState) -> Result<RequestBody, Response> {
    let limit = state.max_body_size;
    let mut stream = body.into_data_stream();
    let mut buffered = BytesMut::new();
    let mut spool: Option<(SpooledFile, BufWriter<tokio::fs::File>)> = None;
    let mut received: usize = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            body_error(
                StatusCode::BAD_REQUEST,
                "invalid_body",
                format!("Failed to read request body: {}", e),
            )
        })?;

        received = received.saturating_add(chunk.len());
        if received > limit {
            return Err(body_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                "body_too_large",
                format!("Request body exceeds {} bytes", limit),
            ));
        }

        if let Some((_, writer)) = spool.as_mut() {
            writer.write_all(&chunk).await.map_err(spool_error)?;
            continue;
        }

        buffered.extend_from_slice(&chunk);
        if buffered.len() > state.spool_threshold {
            let file = state.context.store.spool_file();
            let mut writer = open_spool(&file).await.map_err(spool_error)?;
            writer.write_all(&buffered).await.map_err(spool_error)?;
            buffered = BytesMut::new();
            spool = Some((file, writer));
        }
    }

    match spool {
        None => Ok(RequestBody::Memory(buffered.freeze())),
        Some((mut file, mut writer)) => {
            writer.flush().await.map_err(spool_error)?;
            writer.get_ref().sync_all().await.map_err(spool_error)?;
            file.set_len(received as u64);
            debug!(bytes = received, path = %file.path().display(), "Spooled request body");
            Ok(RequestBody::Spooled(file))
        }
    }
}

async fn open_spool(file: &SpooledFile) -> io::Result<BufWriter<tokio::fs::File>> {
    if let Some(parent) = file.path().parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(BufWriter::new(tokio::fs::File::create(file.path()).await?))
}

fn spool_error(err: io::Error) -> Response {
    body_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "io_error",
        format!("Failed to spool request body: {}", err),
    )
}

fn body_error(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(status = status.as_u16(), "{}", message);
    } else {
        warn!(status = status.as_u16(), "{}", message);
    }

    (
        status,
        Json(ErrorResponse::with_status(error_type, message, status)),
    )
        .into_response()
}

async fn route_request(state: &AppState, request: RouteRequest) -> Response {
    let routes = Arc::clone(&state.routes);
    let context = Arc::clone(&state.context);
    let span = Span::current();

    let result =
        tokio::task::spawn_blocking(move || span.in_scope(|| routes.dispatch(&context, request)))
            .await;

    match result {
        Ok(Some(response)) => response,
        Ok(None) => {
            debug!("No route matched");
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            error!("Handler task failed: {}", e);
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            (
                status,
                Json(ErrorResponse::with_status(
                    "internal_error",
                    "Request handler failed",
                    status,
                )),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
pub fn create_router(config: RouterConfig) -> Router {
    let state = AppState::new(&config);

    let router = Router::new().fallback(dispatch_handler).with_state(state);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

// =============================================================================
// Tests
// =============================================================================
