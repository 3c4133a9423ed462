use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

/// Envelope version the mock speaks unless told otherwise.
pub const API_VERSION: &str = "0.8";

/// Error codes the mock reports inside `data`.
pub const ERR_IMAGE_REQUIRED: i64 = 1;
pub const ERR_INSTANCE_NOT_FOUND: i64 = 2;
pub const ERR_BAD_RESOLUTION: i64 = 3;

#[derive(Clone, Debug)]
pub struct MockConfig {
    pub username: String,
    pub password: String,
    /// Version written into every envelope.
    pub version: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin".to_string(),
            version: API_VERSION.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instance {
    pub token: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Options the instance was created with, exactly as received.
    pub options: Map<String, Value>,
    pub width: u32,
    pub height: u32,
}

#[derive(Default)]
pub struct MockState {
    pub config: MockConfig,
    pub instances: RwLock<HashMap<String, Instance>>,
    requests: AtomicUsize,
}

impl MockState {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Authenticated requests that reached a handler.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

pub type Db = Arc<MockState>;

pub fn app() -> Router {
    app_with_state(Arc::new(MockState::default()))
}

pub fn app_with_state(state: Db) -> Router {
    Router::new()
        .route("/0.8/hostinfo", get(host_info))
        .route("/0.8/imageslocal", get(images_local))
        .route("/0.8/imagesonline", get(images_online))
        .route("/0.8/instance", get(instance_info).post(create_instance))
        .route(
            "/0.8/instance-resolution",
            get(resolution_info).post(set_resolution),
        )
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_state(listener: TcpListener, state: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

/// Check basic credentials and count the request.
fn authorize(state: &MockState, headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("{}:{}", state.config.username, state.config.password);
    let supplied = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|v| STANDARD.decode(v).ok())
        .and_then(|v| String::from_utf8(v).ok());

    if supplied.as_deref() != Some(expected.as_str()) {
        return Err((StatusCode::UNAUTHORIZED, "user not authorized").into_response());
    }
    state.requests.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

/// Request parameters from the JSON body. An empty body means none.
fn params(body: &Bytes) -> Result<Map<String, Value>, Response> {
    if body.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        _ => Err((StatusCode::BAD_REQUEST, "body must be a JSON object").into_response()),
    }
}

fn envelope(state: &MockState, data: Value) -> Response {
    Json(json!({ "version": state.config.version, "data": data })).into_response()
}

fn server_error(state: &MockState, message: &str, errorno: i64) -> Response {
    envelope(state, json!({ "error": message, "errorno": errorno }))
}

fn token_of(params: &Map<String, Value>) -> Option<&str> {
    params.get("token").and_then(Value::as_str)
}

async fn host_info(State(state): State<Db>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let instances = state.instances.read().await.len();
    envelope(
        &state,
        json!({ "hostname": "mock-akhet", "cpus": 4, "memory_mb": 8192, "instances": instances }),
    )
}

async fn images_local(State(state): State<Db>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    envelope(&state, json!(["akhet/ubuntu-xfce", "akhet/debian-lxde"]))
}

async fn images_online(State(state): State<Db>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    envelope(
        &state,
        json!(["akhet/ubuntu-xfce", "akhet/debian-lxde", "akhet/fedora-gnome"]),
    )
}

async fn create_instance(State(state): State<Db>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let options = match params(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let Some(image) = options.get("image").and_then(Value::as_str) else {
        return server_error(&state, "image is required", ERR_IMAGE_REQUIRED);
    };

    let instance = Instance {
        token: Uuid::new_v4().to_string(),
        image: image.to_string(),
        user: options.get("user").and_then(Value::as_str).map(str::to_string),
        options: options.clone(),
        width: 1024,
        height: 768,
    };
    debug!(token = %instance.token, image = %instance.image, "instance created");
    let token = instance.token.clone();
    state.instances.write().await.insert(token.clone(), instance);
    envelope(&state, json!({ "token": token }))
}

async fn instance_info(State(state): State<Db>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let params = match params(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let instances = state.instances.read().await;
    match token_of(&params).and_then(|t| instances.get(t)) {
        Some(instance) => envelope(
            &state,
            json!({ "token": instance.token, "image": instance.image, "status": "running" }),
        ),
        None => server_error(&state, "instance not found", ERR_INSTANCE_NOT_FOUND),
    }
}

async fn resolution_info(State(state): State<Db>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let params = match params(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let instances = state.instances.read().await;
    match token_of(&params).and_then(|t| instances.get(t)) {
        Some(instance) => envelope(
            &state,
            json!({ "width": instance.width, "height": instance.height }),
        ),
        None => server_error(&state, "instance not found", ERR_INSTANCE_NOT_FOUND),
    }
}

async fn set_resolution(State(state): State<Db>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let params = match params(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let size = |key: &str| {
        params
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
    };
    let (Some(width), Some(height)) = (size("width"), size("height")) else {
        return server_error(&state, "width and height must be positive", ERR_BAD_RESOLUTION);
    };

    let mut instances = state.instances.write().await;
    let instance = match token_of(&params) {
        Some(token) => instances.get_mut(token),
        None => None,
    };
    match instance {
        Some(instance) => {
            instance.width = width;
            instance.height = height;
            envelope(&state, json!({ "width": width, "height": height }))
        }
        None => server_error(&state, "instance not found", ERR_INSTANCE_NOT_FOUND),
    }
}
