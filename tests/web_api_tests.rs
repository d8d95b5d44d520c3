/// HTTP API tests driven through the router
///
/// Run with: cargo test --test web_api_tests

use autorestdb::registry::Registry;
use autorestdb::repository::Repository;
use autorestdb::security::{
    AnonymousAuthenticator, ApiKey, ApiKeyAuthenticator, PermissionPolicy, SecurityGate,
};
use autorestdb::storage::InMemoryStorage;
use autorestdb::web::{AppState, ListLimits, build_router};
use autorestdb::{AppConfig, bootstrap};
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use clap::Parser;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn router_with(security: SecurityGate) -> Router {
    let repository = Repository::new(Arc::new(Registry::new()), Arc::new(InMemoryStorage::new()));
    build_router(AppState::new(repository, security).with_limits(ListLimits { default: 100, max: 3 }))
}

fn router() -> Router {
    router_with(SecurityGate::allow_all())
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn decode_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    serde_json::from_slice(&bytes).expect("json body")
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    (status, decode_json(response).await)
}

fn clientes_upload() -> Value {
    json!({
        "collection": "clientes",
        "documents": [
            {"name": "Ana", "age": 30},
            {"name": "Carlos", "age": 25}
        ]
    })
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&router(), empty_request(Method::GET, "/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("autorestdb running"));
}

#[tokio::test]
async fn test_upload_and_crud() {
    let router = router();

    let (status, body) = send(&router, json_request(Method::POST, "/upload", clientes_upload())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("Collection registered"));
    assert_eq!(body["collection"], json!("clientes"));
    assert_eq!(body["schema"], json!({"name": "string", "age": "integer"}));
    assert_eq!(body["inserted"], json!(2));

    let (status, body) = send(&router, empty_request(Method::GET, "/clientes")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(2));

    let (status, body) = send(
        &router,
        json_request(Method::POST, "/clientes", json!({"name": "Joao", "age": 40})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let new_id = body["id"].as_i64().expect("integer id");

    let (status, item) = send(&router, empty_request(Method::GET, &format!("/clientes/{new_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["name"], json!("Joao"));
    assert_eq!(item["age"], json!(40));

    let (status, body) = send(
        &router,
        json_request(Method::PUT, &format!("/clientes/{new_id}"), json!({"age": 41})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("updated"));

    let (_, item) = send(&router, empty_request(Method::GET, &format!("/clientes/{new_id}"))).await;
    assert_eq!(item["age"], json!(41));

    let (status, body) = send(&router, empty_request(Method::DELETE, &format!("/clientes/{new_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("deleted"));

    let (status, body) = send(&router, empty_request(Method::GET, &format!("/clientes/{new_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("not_found"));
}

#[tokio::test]
async fn test_upload_validation() {
    let router = router();

    let (status, body) = send(
        &router,
        json_request(Method::POST, "/upload", json!({"documents": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Missing 'collection'"));

    let (status, body) = send(
        &router,
        json_request(Method::POST, "/upload", json!({"collection": "x", "documents": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("'documents' must be a list"));

    let (status, body) = send(
        &router,
        json_request(Method::POST, "/upload", json!({"collection": "???", "documents": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("validation_error"));
}

#[tokio::test]
async fn test_unknown_collection_is_404() {
    let router = router();

    for request in [
        empty_request(Method::GET, "/ghost"),
        empty_request(Method::GET, "/ghost/1"),
        json_request(Method::POST, "/ghost", json!({"a": 1})),
        json_request(Method::PUT, "/ghost/1", json!({"a": 1})),
        empty_request(Method::DELETE, "/ghost/1"),
    ] {
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], json!("not_registered"));
    }
}

#[tokio::test]
async fn test_missing_items_are_404() {
    let router = router();
    send(&router, json_request(Method::POST, "/upload", clientes_upload())).await;

    let (status, _) = send(&router, json_request(Method::PUT, "/clientes/99", json!({"age": 1}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&router, empty_request(Method::DELETE, "/clientes/99")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bad_values_are_400() {
    let router = router();
    send(&router, json_request(Method::POST, "/upload", clientes_upload())).await;

    let (status, body) = send(
        &router,
        json_request(Method::POST, "/clientes", json!({"age": "forty"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("validation_error"));

    let (status, _) = send(&router, json_request(Method::POST, "/clientes", json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_requests_get_json_errors() {
    let router = router();
    send(&router, json_request(Method::POST, "/upload", clientes_upload())).await;

    let broken_body = Request::builder()
        .method(Method::POST)
        .uri("/clientes")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .expect("request");
    let missing_content_type = Request::builder()
        .method(Method::POST)
        .uri("/clientes")
        .body(Body::from(r#"{"name": "Ana"}"#))
        .expect("request");

    for request in [
        broken_body,
        missing_content_type,
        empty_request(Method::GET, "/clientes/abc"),
        empty_request(Method::GET, "/clientes?limit=many"),
    ] {
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("validation_error"));
        assert!(body["error"].as_str().is_some_and(|msg| !msg.is_empty()));
    }
}

#[tokio::test]
async fn test_list_limit_is_clamped() {
    let router = router();
    let upload = json!({
        "collection": "numbers",
        "documents": [{"n": 1}, {"n": 2}, {"n": 3}, {"n": 4}, {"n": 5}]
    });
    send(&router, json_request(Method::POST, "/upload", upload)).await;

    let (_, body) = send(&router, empty_request(Method::GET, "/numbers?limit=2")).await;
    assert_eq!(body.as_array().map(Vec::len), Some(2));
    let (_, body) = send(&router, empty_request(Method::GET, "/numbers?limit=50")).await;
    assert_eq!(body.as_array().map(Vec::len), Some(3));
    let (_, body) = send(&router, empty_request(Method::GET, "/numbers")).await;
    assert_eq!(body.as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn test_nested_upload_creates_child_collection() {
    let router = router();
    let upload = json!({
        "collection": "Orders",
        "documents": [{"total": 5, "customer": {"name": "Ana"}}]
    });
    let (status, body) = send(&router, json_request(Method::POST, "/upload", upload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schema"], json!({"total": "integer", "customer": {"name": "string"}}));

    let (status, children) = send(&router, empty_request(Method::GET, "/orders__customer")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(children[0]["parent_id"], json!(1));
    assert_eq!(children[0]["name"], json!("Ana"));

    let (status, collections) = send(&router, empty_request(Method::GET, "/_collections")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(collections[0]["table_name"], json!("orders"));
    assert_eq!(collections[0]["children"][0]["table_name"], json!("orders__customer"));
}

fn api_key_router() -> Router {
    let authenticator = ApiKeyAuthenticator::with_cost(
        vec![
            "writer:w-key".parse::<ApiKey>().unwrap(),
            "reader:r-key:read".parse::<ApiKey>().unwrap(),
        ],
        4,
    )
    .unwrap();
    router_with(SecurityGate::new(Arc::new(authenticator), Arc::new(PermissionPolicy)))
}

fn with_key(mut request: Request<Body>, key: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert("x-api-key", key.parse().expect("header value"));
    request
}

#[tokio::test]
async fn test_api_keys_and_permissions() {
    let router = api_key_router();

    let (status, body) = send(&router, json_request(Method::POST, "/upload", clientes_upload())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], json!("unauthenticated"));

    let (status, _) = send(
        &router,
        with_key(json_request(Method::POST, "/upload", clientes_upload()), "wrong"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &router,
        with_key(json_request(Method::POST, "/upload", clientes_upload()), "r-key"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &router,
        with_key(json_request(Method::POST, "/upload", clientes_upload()), "w-key"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, with_key(empty_request(Method::GET, "/clientes"), "r-key")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(2));

    let (status, body) = send(
        &router,
        with_key(empty_request(Method::DELETE, "/clientes/1"), "r-key"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], json!("forbidden"));

    let bearer = Request::builder()
        .method(Method::DELETE)
        .uri("/clientes/1")
        .header("authorization", "Bearer w-key")
        .body(Body::empty())
        .expect("request");
    let (status, _) = send(&router, bearer).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_anonymous_caller_is_forbidden_under_permission_policy() {
    let router = router_with(SecurityGate::new(
        Arc::new(AnonymousAuthenticator),
        Arc::new(PermissionPolicy),
    ));
    let (status, _) = send(&router, json_request(Method::POST, "/upload", clientes_upload())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_bootstrap_in_memory() {
    let config = AppConfig::try_parse_from(["autorestdb", "--max-limit", "10", "--default-limit", "5"])
        .expect("config");
    let boot = bootstrap(&config).await.expect("bootstrap");

    let (status, _) = send(&boot.router, json_request(Method::POST, "/upload", clientes_upload())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(boot.repository.list("clientes", 10).await.unwrap().len(), 2);
    boot.shutdown().await.expect("shutdown");
}
