//! Image and repository API integration tests.
//!
//! Tests verify:
//! - Uploaded resources land at their on-disk location verbatim
//! - Image reads (json, layer, ancestry) and their headers
//! - Repository tag and image list round-trips
//! - Large layers are spooled on upload and streamed on download
//! - Error statuses for missing, invalid and corrupt content

use axum::http::{header, StatusCode};

use super::test_utils::{body_bytes, TestRegistry, TEST_HOST};

// =============================================================================
// Images
// =============================================================================

#[tokio::test]
async fn test_put_image_json_writes_file() {
    let registry = TestRegistry::new();

    let response = registry.put("/v1/images/1234/json", "content").await;
    assert_eq!(response.status(), StatusCode::OK);

    let stored = std::fs::read(registry.dir.path().join("images/1234/json")).unwrap();
    assert_eq!(stored, b"content");
}

#[tokio::test]
async fn test_get_image_json_round_trip_with_layer_size() {
    let registry = TestRegistry::new();
    let json = r#"{"id":"e0acc43660ac","Size":0}"#;
    let layer = vec![0x5du8; 2048];

    registry.put("/v1/images/e0acc43660ac/json", json).await;
    registry.put("/v1/images/e0acc43660ac/layer", layer.clone()).await;

    let response = registry.get("/v1/images/e0acc43660ac/json").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    // Size of the layer, not of the JSON
    assert_eq!(response.headers().get("x-docker-size").unwrap(), "2048");
    assert_eq!(body_bytes(response).await, json.as_bytes());
}

#[tokio::test]
async fn test_get_image_json_by_prefix() {
    let registry = TestRegistry::new();
    registry.put("/v1/images/e0acc43660ac/json", "{}").await;

    let response = registry.get("/v1/images/e0acc/json").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-docker-size").is_none());
}

#[tokio::test]
async fn test_get_unknown_image_json_is_404() {
    let registry = TestRegistry::new();

    let response = registry.get("/v1/images/unknown/json").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_get_image_layer() {
    let registry = TestRegistry::new();
    registry.put("/v1/images/abc/layer", "xz-bytes").await;

    let response = registry.get("/v1/images/abc/layer").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-xz"
    );
    assert_eq!(body_bytes(response).await, b"xz-bytes");
}

#[tokio::test]
async fn test_get_missing_layer_is_404() {
    let registry = TestRegistry::new();
    registry.put("/v1/images/abc/json", "{}").await;

    let response = registry.get("/v1/images/abc/layer").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_image_ancestry() {
    let registry = TestRegistry::new();
    registry
        .put("/v1/images/aaa/json", r#"{"id":"aaa","parent":"bbb"}"#)
        .await;
    registry
        .put("/v1/images/bbb/json", r#"{"id":"bbb","parent":"ccc"}"#)
        .await;
    registry.put("/v1/images/ccc/json", r#"{"id":"ccc"}"#).await;

    let response = registry.get("/v1/images/aaa/ancestry").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );

    let ancestry: Vec<String> = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(ancestry, vec!["aaa", "bbb", "ccc"]);
}

#[tokio::test]
async fn test_cyclic_ancestry_is_500() {
    let registry = TestRegistry::new();
    registry.put("/v1/images/aaa/json", r#"{"parent":"bbb"}"#).await;
    registry.put("/v1/images/bbb/json", r#"{"parent":"aaa"}"#).await;

    let response = registry.get("/v1/images/aaa/ancestry").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "corrupt_ancestry");
    assert_eq!(body["status"], 500);
}

#[tokio::test]
async fn test_parent_without_json_is_500() {
    let registry = TestRegistry::new();
    registry.put("/v1/images/aaa/json", r#"{"parent":"bbb"}"#).await;
    registry.put("/v1/images/bbb/layer", "xz-bytes").await;

    let response = registry.get("/v1/images/aaa/ancestry").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "corrupt_ancestry");
}

#[tokio::test]
async fn test_dot_prefixed_image_id_is_400() {
    let registry = TestRegistry::new();

    let response = registry.put("/v1/images/.abc/json", "{}").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!registry.dir.path().join("images/.abc").exists());

    let response = registry.put("/v1/images/abc/.json", "{}").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = registry.get("/v1/images/.abc/json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_large_layer_round_trip() {
    let registry = TestRegistry::with_config(|config| config.with_spool_threshold(1024));
    let layer: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();

    let response = registry.put("/v1/images/abc/layer", layer.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = registry.get("/v1/images/abc/layer").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_LENGTH).unwrap(),
        &layer.len().to_string()
    );
    assert_eq!(body_bytes(response).await, layer);

    let leftovers = std::fs::read_dir(registry.dir.path().join(".uploads"))
        .unwrap()
        .count();
    assert_eq!(leftovers, 0);
}

// =============================================================================
// Repositories
// =============================================================================

#[tokio::test]
async fn test_put_repository_images_then_read() {
    let registry = TestRegistry::new();

    let response = registry
        .put("/v1/repositories/ns/test/images", "imagesdata")
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let stored = registry
        .store()
        .repository("ns", "test")
        .unwrap()
        .images()
        .unwrap();
    assert_eq!(stored, b"imagesdata");

    let response = registry.get("/v1/repositories/ns/test/images").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-docker-endpoints").unwrap(),
        TEST_HOST
    );
    assert_eq!(body_bytes(response).await, b"imagesdata");
}

#[tokio::test]
async fn test_get_missing_repository_images_is_404() {
    let registry = TestRegistry::new();

    let response = registry.get("/v1/repositories/ns/nothing/images").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tag_round_trip() {
    let registry = TestRegistry::new();

    let response = registry
        .put("/v1/repositories/library/redis/tags/latest", "e0acc43660ac")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = registry.get("/v1/repositories/library/redis/tags").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(
        response.headers().get("x-docker-endpoints").unwrap(),
        TEST_HOST
    );

    let tags: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(tags, serde_json::json!({ "latest": "e0acc43660ac" }));
}

#[tokio::test]
async fn test_tags_of_unknown_repository_are_empty() {
    let registry = TestRegistry::new();

    let response = registry.get("/v1/repositories/library/nothing/tags").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"{}");
}

#[tokio::test]
async fn test_put_repository_writes_index() {
    let registry = TestRegistry::new();

    let response = registry
        .put("/v1/repositories/ns/test/", r#"[{"id":"abc"}]"#)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-docker-endpoints").unwrap(),
        TEST_HOST
    );

    let stored = std::fs::read(registry.dir.path().join("repositories/ns/test/_index")).unwrap();
    assert_eq!(stored, br#"[{"id":"abc"}]"#);
}

#[tokio::test]
async fn test_tag_name_traversal_is_400() {
    let registry = TestRegistry::new();

    let response = registry
        .put("/v1/repositories/ns/test/tags/..", "abc")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "invalid_name");
}

#[tokio::test]
async fn test_dot_prefixed_tag_is_400() {
    let registry = TestRegistry::new();

    let response = registry
        .put("/v1/repositories/ns/test/tags/.hidden", "abc")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = registry.get("/v1/repositories/ns/test/tags").await;
    assert_eq!(body_bytes(response).await, b"{}");
}

#[tokio::test]
async fn test_non_utf8_tag_does_not_break_listing() {
    let registry = TestRegistry::new();

    registry.put("/v1/repositories/ns/test/tags/good", "abc").await;
    let response = registry
        .put("/v1/repositories/ns/test/tags/bad", vec![0xffu8, 0xfe])
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = registry.get("/v1/repositories/ns/test/tags").await;
    assert_eq!(response.status(), StatusCode::OK);

    let tags: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(tags["good"], "abc");
    assert_eq!(tags["bad"], "\u{fffd}\u{fffd}");
}

#[tokio::test]
async fn test_namespace_restriction() {
    let registry = TestRegistry::with_config(|config| config.with_namespace("library"));

    let response = registry
        .put("/v1/repositories/other/redis/tags/latest", "abc")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!registry.dir.path().join("repositories/other").exists());

    let response = registry
        .put("/v1/repositories/library/redis/tags/latest", "abc")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}
