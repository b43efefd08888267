//! Authentication integration tests.
//!
//! Tests verify:
//! - Basic logins open a session and hand out a token
//! - The token authenticates later requests
//! - Bad credentials and unknown tokens are challenged
//! - Requests without credentials pass

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, StatusCode};

use registry_v1::server::DenyAllVerifier;
use registry_v1::SessionAuth;

use super::test_utils::{
    basic, request, TestRegistry, TEST_LOGIN, TEST_PASSWORD, TEST_SECRET,
};

fn expected_token() -> String {
    SessionAuth::new(Arc::new(DenyAllVerifier), TEST_SECRET).generate_token(TEST_LOGIN)
}

async fn get_with_auth(
    registry: &TestRegistry,
    uri: &str,
    authorization: &str,
) -> axum::response::Response {
    let mut req = request(Method::GET, uri, Body::empty());
    req.headers_mut()
        .insert(header::AUTHORIZATION, authorization.parse().unwrap());
    registry.send(req).await
}

// =============================================================================
// Successful Logins
// =============================================================================

#[tokio::test]
async fn test_basic_login_issues_token() {
    let registry = TestRegistry::with_auth();

    let response =
        get_with_auth(&registry, "/v1/users", &basic(TEST_LOGIN, TEST_PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let token = expected_token();
    assert_eq!(response.headers().get("x-docker-token").unwrap(), token.as_str());
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        format!("Token signature={},access=write", token).as_str()
    );
}

#[tokio::test]
async fn test_token_authenticates_later_requests() {
    let registry = TestRegistry::with_auth();
    let response =
        get_with_auth(&registry, "/v1/users", &basic(TEST_LOGIN, TEST_PASSWORD)).await;
    let token = response
        .headers()
        .get("x-docker-token")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let response = get_with_auth(&registry, "/v1/users", &format!("Token {}", token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    // Existing sessions get no new token
    assert!(response.headers().get("x-docker-token").is_none());
}

#[tokio::test]
async fn test_repeated_logins_same_token() {
    let registry = TestRegistry::with_auth();

    let first = get_with_auth(&registry, "/v1/users", &basic(TEST_LOGIN, TEST_PASSWORD)).await;
    let second = get_with_auth(&registry, "/v1/users", &basic(TEST_LOGIN, TEST_PASSWORD)).await;

    assert_eq!(
        first.headers().get("x-docker-token"),
        second.headers().get("x-docker-token")
    );
}

#[tokio::test]
async fn test_put_repository_issues_scoped_token() {
    let registry = TestRegistry::with_auth();

    let mut req = request(Method::PUT, "/v1/repositories/ns/test/", Body::from("[]"));
    req.headers_mut().insert(
        header::AUTHORIZATION,
        basic(TEST_LOGIN, TEST_PASSWORD).parse().unwrap(),
    );
    let response = registry.send(req).await;
    assert_eq!(response.status(), StatusCode::OK);

    let token = expected_token();
    assert_eq!(response.headers().get("x-docker-token").unwrap(), token.as_str());
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        format!(r#"Token signature={},repository="ns/test",access=write"#, token).as_str()
    );
}

// =============================================================================
// Anonymous Requests
// =============================================================================

#[tokio::test]
async fn test_missing_header_passes() {
    let registry = TestRegistry::with_auth();

    let response = registry.get("/v1/users").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-docker-token").is_none());

    let response = registry.put("/v1/repositories/ns/test/images", "[]").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_ping_ignores_credentials() {
    let registry = TestRegistry::with_auth();

    let response = get_with_auth(&registry, "/v1/_ping", "Bogus nonsense").await;
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Rejected Requests
// =============================================================================

#[tokio::test]
async fn test_wrong_password_rejected() {
    let registry = TestRegistry::with_auth();

    let response = get_with_auth(&registry, "/v1/users", &basic(TEST_LOGIN, "wrong")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        r#"Basic realm="docker-registry""#
    );
}

#[tokio::test]
async fn test_unknown_token_rejected() {
    let registry = TestRegistry::with_auth();

    let token = format!("Token {}", expected_token());
    let response = get_with_auth(&registry, "/v1/users", &token).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unsupported_scheme_rejected() {
    let registry = TestRegistry::with_auth();

    let response = get_with_auth(&registry, "/v1/users", "Bearer abc").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rejected_write_does_not_touch_disk() {
    let registry = TestRegistry::with_auth();

    let mut req = request(
        Method::PUT,
        "/v1/repositories/ns/test/tags/latest",
        Body::from("abc"),
    );
    req.headers_mut().insert(
        header::AUTHORIZATION,
        basic(TEST_LOGIN, "wrong").parse().unwrap(),
    );
    let response = registry.send(req).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!registry.dir.path().join("repositories/ns/test").exists());
}

#[tokio::test]
async fn test_logins_refused_without_password() {
    let registry = TestRegistry::new();

    let response =
        get_with_auth(&registry, "/v1/users", &basic(TEST_LOGIN, TEST_PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
