//! Request handlers for the v1 registry protocol.
//!
//! Handlers are synchronous: they receive the shared [`RegistryContext`] and a
//! fully received [`RouteRequest`] whose captures were filled in by the route
//! table, and perform blocking filesystem I/O through the content store.
//! Layer blobs are streamed back rather than read into memory.
//!
//! # Endpoints
//!
//! - `GET /v{n}/_ping` - Liveness check
//! - `GET /v{n}/users`, `POST /v{n}/users/` - Login check and bootstrap
//! - `GET /v{n}/images/{id}/{ancestry,layer,json}` - Image reads
//! - `PUT /v{n}/images/{id}/{resource}` - Image uploads
//! - `GET /v{n}/repositories/{ns}/{name}/{tags,images}` - Repository reads
//! - `PUT /v{n}/repositories/{ns}/{name}[/tags/{tag}|/images]` - Repository writes

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::store::{ContentStore, Repository, JSON_FILE};

use super::router::RouteRequest;

// =============================================================================
// Protocol Headers
// =============================================================================

/// Registry protocol version advertised on `_ping`.
pub const REGISTRY_VERSION: &str = "0.6.0";

pub const X_DOCKER_REGISTRY_VERSION: HeaderName =
    HeaderName::from_static("x-docker-registry-version");

pub const X_DOCKER_TOKEN: HeaderName = HeaderName::from_static("x-docker-token");

pub const X_DOCKER_ENDPOINTS: HeaderName = HeaderName::from_static("x-docker-endpoints");

pub const X_DOCKER_SIZE: HeaderName = HeaderName::from_static("x-docker-size");

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const JSON_CONTENT_TYPE: &str = "application/json";

const LAYER_CONTENT_TYPE: &str = "application/x-xz";

/// Read size when streaming a layer back to the client.
const LAYER_CHUNK_SIZE: usize = 64 * 1024;

/// Result type returned by registry handlers.
pub type HandlerResult = Result<Response, StoreError>;

// =============================================================================
// Registry Context
// =============================================================================

/// State shared by every registry handler.
#[derive(Debug, Clone)]
pub struct RegistryContext {
    /// The on-disk content store
    pub store: ContentStore,

    /// When set, repositories outside this namespace do not exist
    pub namespace: Option<String>,

    /// `X-Docker-Endpoints` value used when a request carries no `Host` header
    pub default_endpoint: String,
}

impl RegistryContext {
    pub fn new(store: ContentStore, default_endpoint: impl Into<String>) -> Self {
        Self {
            store,
            namespace: None,
            default_endpoint: default_endpoint.into(),
        }
    }

    /// Restrict repository routes to a single namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// The repository named by captures 1 and 2 of `request`.
    fn repository(&self, request: &RouteRequest) -> Result<Repository, StoreError> {
        let namespace = request.capture(1);
        let name = request.capture(2);

        if let Some(allowed) = &self.namespace {
            if namespace != allowed.as_str() {
                return Err(StoreError::NotFound(format!(
                    "repository {}/{} outside namespace {}",
                    namespace, name, allowed
                )));
            }
        }

        self.store.repository(namespace, name)
    }

    fn endpoint<'a>(&'a self, request: &'a RouteRequest) -> &'a str {
        request.host().unwrap_or(&self.default_endpoint)
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error body returned for every failure except 404.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "invalid_name", "io_error")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert StoreError to HTTP response.
///
/// Missing content is a plain 404 without a body. Bad names are client
/// errors (400, WARN). Everything else means the data directory is broken
/// or unwritable (500, ERROR).
impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            StoreError::NotFound(_) => {
                debug!("Not found: {}", self);
                return StatusCode::NOT_FOUND.into_response();
            }
            StoreError::InvalidName(_) => (StatusCode::BAD_REQUEST, "invalid_name"),
            StoreError::InvalidAttributes { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "invalid_attributes")
            }
            StoreError::CorruptAncestry { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "corrupt_ancestry")
            }
            StoreError::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
        };
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Store error: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /v{n}/_ping`
pub fn ping(_ctx: &RegistryContext, _request: &RouteRequest) -> Response {
    (
        [(X_DOCKER_REGISTRY_VERSION, REGISTRY_VERSION)],
        "pong",
    )
        .into_response()
}

/// `GET /v{n}/users`
///
/// Clients call this to check their credentials; the authenticator has
/// already done the work by the time we get here.
pub fn get_users(_ctx: &RegistryContext, _request: &RouteRequest) -> Response {
    (StatusCode::OK, "OK").into_response()
}

/// `POST /v{n}/users/`
pub fn post_users(_ctx: &RegistryContext, _request: &RouteRequest) -> Response {
    (StatusCode::CREATED, "OK").into_response()
}

/// `GET /v{n}/images/{id}/ancestry`
///
/// JSON array of the image id followed by its parents, root last.
pub fn image_ancestry(ctx: &RegistryContext, request: &RouteRequest) -> HandlerResult {
    let image = ctx.store.image(request.capture(1))?;
    let ancestry = image.ancestry(&ctx.store)?;
    debug!(image = image.id(), depth = ancestry.len(), "Resolved ancestry");

    Ok(Json(ancestry).into_response())
}

/// `GET /v{n}/images/{id}/layer`
///
/// The blob is streamed from disk with its size as `Content-Length`.
pub fn image_layer(ctx: &RegistryContext, request: &RouteRequest) -> HandlerResult {
    let image = ctx.store.image(request.capture(1))?;
    let (file, size) = image.open_layer()?;
    debug!(image = image.id(), bytes = size, "Streaming layer");

    let stream = ReaderStream::with_capacity(tokio::fs::File::from_std(file), LAYER_CHUNK_SIZE);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, LAYER_CONTENT_TYPE.to_string()),
            (header::CONTENT_LENGTH, size.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// `GET /v{n}/images/{id}/json`
///
/// Returns the stored attributes verbatim. `X-Docker-Size` carries the size
/// of the layer blob, not of the JSON, and is left out when there is no layer.
pub fn image_json(ctx: &RegistryContext, request: &RouteRequest) -> HandlerResult {
    let image = ctx.store.image(request.capture(1))?;
    let json = image.raw_json()?;

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
        json,
    )
        .into_response();

    match image.layer_size() {
        Ok(size) => {
            response
                .headers_mut()
                .insert(X_DOCKER_SIZE, HeaderValue::from(size));
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }

    Ok(response)
}

/// `PUT /v{n}/images/{id}/{resource}`
pub fn put_image_resource(ctx: &RegistryContext, request: &RouteRequest) -> HandlerResult {
    let id = request.capture(1);
    let resource = request.capture(2);
    ctx.store.put_image_resource(id, resource, request.body.payload())?;

    if resource == JSON_FILE {
        info!(image = id, "Stored image attributes");
    } else {
        debug!(
            image = id,
            resource = resource,
            bytes = request.body.len(),
            "Stored image resource"
        );
    }

    Ok(StatusCode::OK.into_response())
}

/// `GET /v{n}/repositories/{ns}/{name}/tags`
pub fn repository_tags(ctx: &RegistryContext, request: &RouteRequest) -> HandlerResult {
    let repository = ctx.repository(request)?;
    let tags = repository.tags()?;

    Ok((
        StatusCode::OK,
        [(X_DOCKER_ENDPOINTS, ctx.endpoint(request).to_string())],
        Json(tags),
    )
        .into_response())
}

/// `GET /v{n}/repositories/{ns}/{name}/images`
pub fn repository_images(ctx: &RegistryContext, request: &RouteRequest) -> HandlerResult {
    let repository = ctx.repository(request)?;
    let images = repository.images()?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, JSON_CONTENT_TYPE.to_string()),
            (X_DOCKER_ENDPOINTS, ctx.endpoint(request).to_string()),
        ],
        images,
    )
        .into_response())
}

/// `PUT /v{n}/repositories/{ns}/{name}/tags/{tag}`
pub fn put_repository_tag(ctx: &RegistryContext, request: &RouteRequest) -> HandlerResult {
    let repository = ctx.repository(request)?;
    let tag = request.capture(3);
    repository.put_tag(tag, request.body.payload())?;
    info!(repository = %repository.full_name(), tag = tag, "Tagged image");

    Ok(StatusCode::OK.into_response())
}

/// `PUT /v{n}/repositories/{ns}/{name}/images`
pub fn put_repository_images(ctx: &RegistryContext, request: &RouteRequest) -> HandlerResult {
    let repository = ctx.repository(request)?;
    repository.put_images(request.body.payload())?;
    debug!(repository = %repository.full_name(), "Stored image list");

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `PUT /v{n}/repositories/{ns}/{name}/`
///
/// Starts a push. The index is written before any header is produced, so a
/// failed write surfaces as an error status. An authenticated request gets
/// a write token scoped to the repository.
pub fn put_repository(ctx: &RegistryContext, request: &RouteRequest) -> HandlerResult {
    let repository = ctx.repository(request)?;
    repository.put_index(request.body.payload())?;
    info!(repository = %repository.full_name(), "Stored repository index");

    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, JSON_CONTENT_TYPE.to_string()),
            (X_DOCKER_ENDPOINTS, ctx.endpoint(request).to_string()),
        ],
    )
        .into_response();

    if let Some(session) = &request.session {
        let challenge = format!(
            r#"Token signature={},repository="{}",access=write"#,
            session.token,
            repository.full_name()
        );
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&challenge) {
            headers.insert(header::WWW_AUTHENTICATE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&session.token) {
            headers.insert(X_DOCKER_TOKEN, value);
        }
    }

    Ok(response)
}

// =============================================================================
// Tests
// =============================================================================
