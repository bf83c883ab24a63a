use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use dispatcher::response::error_json;
use dispatcher::{
    Action, BufferedExchange, ContentKind, Dispatcher, Reply, RequestParameters, SessionInfo, UserInfo,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::metrics::AppMetrics;

pub const SESSION_HEADER: &str = "x-session-id";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<AppMetrics>,
    pub max_body_bytes: usize,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/playground", any(handle_playground))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(CatchPanicLayer::custom(panic_response)),
        )
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            error!(?err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}

async fn handle_playground(State(state): State<AppState>, request: Request) -> Response {
    let started = Instant::now();
    let (parts, body) = request.into_parts();

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let mut session = session_from_headers(&parts.headers, peer);

    let query = parts.uri.query().map(str::to_string);
    let params = RequestParameters::parse(query.as_deref());
    let mut exchange = BufferedExchange::new(parts.uri.path(), query);
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            exchange = exchange.with_header(name.as_str(), value);
        }
    }
    exchange = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => exchange.with_body(bytes),
        Err(err) => exchange.with_body_error(err.to_string()),
    };

    let reply = state
        .dispatcher
        .route(&mut session, &params, &mut exchange)
        .await;
    let reply = exchange.take_reply().unwrap_or(reply);

    state.metrics.record_request(
        params.action().map_or("unknown", Action::token),
        reply.status.code(),
        started.elapsed(),
    );
    reply_response(reply)
}

/// Session identity comes from `x-session-id`, then the peer address; the
/// origin from `Origin`, then `Referer`.
pub fn session_from_headers(headers: &HeaderMap, peer: Option<String>) -> SessionInfo {
    let value_of = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let id = value_of(SESSION_HEADER)
        .or(peer)
        .unwrap_or_else(|| "anonymous".to_string());
    let origin = value_of(header::ORIGIN.as_str())
        .or_else(|| value_of(header::REFERER.as_str()))
        .unwrap_or_else(|| dispatcher::diagnostics::UNKNOWN.to_string());
    let user = match value_of(USER_ID_HEADER) {
        Some(user_id) => UserInfo::new(user_id, value_of(USER_NAME_HEADER)),
        None => UserInfo::anonymous(),
    };
    SessionInfo::new(id, origin).with_user(user)
}

pub fn reply_response(reply: Reply) -> Response {
    let status = StatusCode::from_u16(reply.status.code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let content_type = match reply.kind {
        ContentKind::Json => JSON_CONTENT_TYPE,
        ContentKind::Text => TEXT_CONTENT_TYPE,
    };
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static(content_type))],
        reply.body,
    )
        .into_response()
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(target: "playground::diagnostics", panic = detail, "request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))],
        error_json("Internal server error"),
    )
        .into_response()
}
