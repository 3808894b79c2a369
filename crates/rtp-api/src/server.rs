use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rtp_contracts::{ApiError, ErrorCode, SCHEMA_VERSION_V1};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::{RefreshError, WidgetApi};

#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "server io error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// A base origin the widget is allowed to serve, addressed by a short id in
/// the URL (full origins do not survive as path segments).
#[derive(Debug, Clone)]
pub struct BaseRegistration {
    pub base_id: String,
    pub base_url: String,
}

impl BaseRegistration {
    pub fn new(base_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            base_id: base_id.into(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Mutex<ServerInner>>,
}

struct ServerInner {
    api: WidgetApi,
    bases: BTreeMap<String, String>,
}

impl AppState {
    pub fn new(api: WidgetApi, bases: Vec<BaseRegistration>) -> Self {
        let bases = bases
            .into_iter()
            .map(|base| (base.base_id, base.base_url))
            .collect();
        Self {
            inner: Arc::new(Mutex::new(ServerInner { api, bases })),
        }
    }
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn base_not_found(base_id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: ApiError::new(
                ErrorCode::BaseNotFound,
                "base_id is not registered",
                Some(format!("base_id={base_id}")),
            ),
        }
    }

    fn from_refresh(err: RefreshError) -> Self {
        match err {
            RefreshError::CatalogUnavailable { .. } => Self {
                status: StatusCode::BAD_GATEWAY,
                error: ApiError::new(
                    ErrorCode::CatalogUnavailable,
                    "catalog fetch failed and no cached catalog exists",
                    Some(err.to_string()),
                ),
            },
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

pub async fn serve(
    addr: SocketAddr,
    api: WidgetApi,
    bases: Vec<BaseRegistration>,
) -> Result<(), ServerError> {
    let state = AppState::new(api, bases);
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(get_health))
        .route("/api/v1/rtp/{base_id}", get(get_rtp))
        .route("/api/v1/rtp/{base_id}/status", get(get_base_status))
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

// The widget is embedded cross-origin in brand pages; header policy beyond
// this lives in the fronting proxy.
fn apply_cors_headers(headers: &mut axum::http::HeaderMap) {
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET,OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-max-age"),
        HeaderValue::from_static("3600"),
    );
}

fn resolve_base(inner: &ServerInner, base_id: &str) -> Result<String, HttpApiError> {
    inner
        .bases
        .get(base_id)
        .cloned()
        .ok_or_else(|| HttpApiError::base_not_found(base_id))
}

async fn get_health() -> impl IntoResponse {
    Json(json!({
        "schema_version": SCHEMA_VERSION_V1,
        "status": "ok",
    }))
}

async fn get_rtp(
    Path(base_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let base_url = resolve_base(&inner, &base_id)?;
    let report = inner
        .api
        .refresh(&base_url)
        .map_err(HttpApiError::from_refresh)?;
    Ok(Json(report).into_response())
}

#[derive(Debug, Serialize)]
struct BaseStatusResponse {
    schema_version: String,
    base_id: String,
    base_url: String,
    entities: usize,
    step_ms: u64,
    max_replay_steps: u32,
    last_persistence_error: Option<String>,
}

async fn get_base_status(
    Path(base_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<BaseStatusResponse>, HttpApiError> {
    let inner = state.inner.lock().await;
    let base_url = resolve_base(&inner, &base_id)?;
    let config = inner.api.engine().config();

    Ok(Json(BaseStatusResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        base_id,
        entities: inner.api.engine().namespace_len(&base_url),
        base_url,
        step_ms: config.step_ms,
        max_replay_steps: config.max_replay_steps,
        last_persistence_error: inner
            .api
            .last_persistence_error()
            .map(str::to_string),
    }))
}
