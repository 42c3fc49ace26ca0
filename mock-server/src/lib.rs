use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tokio::{net::TcpListener, sync::RwLock};

/// Header listing the `x-*` request headers `/echo` saw, in arrival order.
pub const ECHO_HEADER_ORDER: &str = "x-echo-header-order";
/// Header carrying the method `/echo` was called with.
pub const ECHO_METHOD: &str = "x-echo-method";

#[derive(Clone, Debug)]
pub struct Asset {
    pub content_type: String,
    pub data: Bytes,
}

pub type Store = Arc<RwLock<HashMap<String, Asset>>>;

pub fn app() -> Router {
    let store: Store = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route(
            "/assets/{name}",
            get(get_asset).put(put_asset).delete(delete_asset),
        )
        .route("/echo", any(echo))
        .route("/status/{code}", any(status))
        .with_state(store)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "mock asset server listening");
    }
    axum::serve(listener, app()).await
}

async fn get_asset(State(store): State<Store>, Path(name): Path<String>) -> Response {
    let assets = store.read().await;
    match assets.get(&name) {
        Some(asset) => (
            [(header::CONTENT_TYPE, asset.content_type.clone())],
            asset.data.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn put_asset(
    State(store): State<Store>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    tracing::debug!(%name, len = body.len(), "storing asset");
    store.write().await.insert(
        name,
        Asset {
            content_type,
            data: body,
        },
    );
    StatusCode::CREATED
}

async fn delete_asset(State(store): State<Store>, Path(name): Path<String>) -> StatusCode {
    let mut assets = store.write().await;
    assets
        .remove(&name)
        .map(|_| StatusCode::NO_CONTENT)
        .unwrap_or(StatusCode::NOT_FOUND)
}

async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    let order: Vec<&str> = headers
        .keys()
        .map(|name| name.as_str())
        .filter(|name| name.starts_with("x-"))
        .collect();

    let mut response = body.into_response();
    let out = response.headers_mut();
    out.insert(header::CONTENT_TYPE, content_type);
    if let Ok(value) = HeaderValue::from_str(method.as_str()) {
        out.insert(ECHO_METHOD, value);
    }
    if let Ok(value) = HeaderValue::from_str(&order.join(",")) {
        out.insert(ECHO_HEADER_ORDER, value);
    }
    response
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}
