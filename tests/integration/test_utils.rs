//! Test utilities for integration tests.
//!
//! Builds a router over a fresh temporary data directory and offers small
//! request helpers.

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use registry_v1::{create_router, ContentStore, RouterConfig};

pub const TEST_SECRET: &str = "testing";
pub const TEST_LOGIN: &str = "testtest";
pub const TEST_PASSWORD: &str = "test1234asdfg";
pub const TEST_HOST: &str = "registry.test:5000";

/// A router over its own data directory. The directory lives as long as this value.
pub struct TestRegistry {
    pub dir: TempDir,
    router: Router,
}

impl TestRegistry {
    /// Registry without logins (anonymous requests only).
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Registry accepting `TEST_PASSWORD` for any login.
    pub fn with_auth() -> Self {
        Self::with_config(|config| config.with_secret(TEST_SECRET).with_password(TEST_PASSWORD))
    }

    pub fn with_config(customize: impl FnOnce(RouterConfig) -> RouterConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let config = customize(RouterConfig::new(dir.path()).with_tracing(false));
        Self {
            router: create_router(config),
            dir,
        }
    }

    /// Direct access to the data directory, for seeding and checking content.
    pub fn store(&self) -> ContentStore {
        ContentStore::new(self.dir.path())
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(request(Method::GET, uri, Body::empty())).await
    }

    pub async fn put(&self, uri: &str, body: impl Into<Body>) -> Response {
        self.send(request(Method::PUT, uri, body.into())).await
    }
}

/// A request carrying a `Host` header, like real clients send.
pub fn request(method: Method, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("host", TEST_HOST)
        .body(body)
        .unwrap()
}

/// `Authorization` value for a Basic login.
pub fn basic(login: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", login, password)))
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}
