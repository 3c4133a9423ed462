use std::sync::Arc;

use axum::http::{self, Request, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http_body_util::BodyExt;
use mock_server::{app, app_with_state, MockConfig, MockState, ERR_INSTANCE_NOT_FOUND};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn basic(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

fn api_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .header(http::header::AUTHORIZATION, basic("admin", "admin"))
        .body(body.to_string())
        .unwrap()
}

// --- auth ---

#[tokio::test]
async fn missing_credentials_return_401() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/0.8/hostinfo")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_password_returns_401() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/0.8/hostinfo")
                .header(http::header::AUTHORIZATION, basic("admin", "wrong"))
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// --- envelope ---

#[tokio::test]
async fn hostinfo_is_wrapped_in_versioned_envelope() {
    let resp = app()
        .oneshot(api_request("GET", "/0.8/hostinfo", ""))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["version"], "0.8");
    assert_eq!(body["data"]["hostname"], "mock-akhet");
}

#[tokio::test]
async fn configured_version_is_reported() {
    let state = Arc::new(MockState::new(MockConfig {
        version: "0.9".to_string(),
        ..MockConfig::default()
    }));
    let resp = app_with_state(state)
        .oneshot(api_request("GET", "/0.8/imageslocal", "{}"))
        .await
        .unwrap();

    let body = body_json(resp).await;
    assert_eq!(body["version"], "0.9");
    assert!(body["data"].is_array());
}

#[tokio::test]
async fn unknown_resource_returns_404() {
    let resp = app()
        .oneshot(api_request("GET", "/0.8/nope", "{}"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_body_returns_400() {
    let resp = app()
        .oneshot(api_request("POST", "/0.8/instance", "not json"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(!body_bytes(resp).await.is_empty());
}

// --- instance ---

#[tokio::test]
async fn create_without_image_is_a_server_side_error() {
    let resp = app()
        .oneshot(api_request("POST", "/0.8/instance", r#"{"user":"alice"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["data"]["error"], "image is required");
    assert_eq!(body["data"]["errorno"], 1);
}

#[tokio::test]
async fn unknown_token_is_a_server_side_error() {
    let resp = app()
        .oneshot(api_request("GET", "/0.8/instance", r#"{"token":"missing"}"#))
        .await
        .unwrap();

    let body = body_json(resp).await;
    assert_eq!(body["data"]["errorno"], ERR_INSTANCE_NOT_FOUND);
}

// --- full lifecycle ---

#[tokio::test]
async fn instance_lifecycle() {
    let state = Arc::new(MockState::default());

    // create
    let resp = app_with_state(state.clone())
        .oneshot(api_request(
            "POST",
            "/0.8/instance",
            r#"{"image":"akhet/ubuntu-xfce","user":"alice"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let token = body_json(resp).await["data"]["token"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(state.instances.read().await[&token].user.as_deref(), Some("alice"));

    // info
    let resp = app_with_state(state.clone())
        .oneshot(api_request(
            "GET",
            "/0.8/instance",
            &json!({ "token": token }).to_string(),
        ))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["data"]["image"], "akhet/ubuntu-xfce");

    // resize
    let resp = app_with_state(state.clone())
        .oneshot(api_request(
            "POST",
            "/0.8/instance-resolution",
            &json!({ "token": token, "width": 1280, "height": 720 }).to_string(),
        ))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["data"], json!({ "width": 1280, "height": 720 }));

    // resolution reflects the resize
    let resp = app_with_state(state.clone())
        .oneshot(api_request(
            "GET",
            "/0.8/instance-resolution",
            &json!({ "token": token }).to_string(),
        ))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["data"], json!({ "width": 1280, "height": 720 }));

    // zero width is rejected
    let resp = app_with_state(state.clone())
        .oneshot(api_request(
            "POST",
            "/0.8/instance-resolution",
            &json!({ "token": token, "width": 0, "height": 720 }).to_string(),
        ))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["data"]["errorno"], 3);

    assert_eq!(state.requests(), 5);
}
