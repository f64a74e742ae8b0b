use std::any::Any;

use axum::{
  extract::{rejection::QueryRejection, Query, State},
  middleware::{self, Next},
  response::Response,
  routing::{delete, get, post},
  Json, Router,
};
use chrono::{DateTime, Utc};
use http::{Request, StatusCode};
use serde::Serialize;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::{
  config::Config,
  cookie_store::Slot,
  cookies,
  error::{error_response, ErrorReport},
  media,
  metrics::MetricsSnapshot,
  state::AppState,
  Error, Result,
};

const ENDPOINTS: &[&str] = &[
  "/health",
  "/status",
  "/metrics",
  "/test",
  "/audio",
  "/video",
  "/info",
  "/formats",
  "/download",
  "/cookies/info",
  "/cookies/upload",
  "/cookies/clear",
  "/cookies/test",
  "/cookies/guide",
];

/// `{"status": "success", ...payload}`
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
  status: &'static str,
  #[serde(flatten)]
  pub payload: T,
}

pub fn success<T: Serialize>(payload: T) -> Json<Envelope<T>> {
  Json(Envelope {
    status: "success",
    payload,
  })
}

/// Turns query string rejections into `InvalidInput`.
pub fn query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T> {
  query
    .map(|Query(params)| params)
    .map_err(|e| Error::InvalidInput(e.body_text()))
}

pub fn router(state: AppState) -> Router {
  with_layers(routes(), state)
}

fn routes() -> Router<AppState> {
  Router::new()
    .route("/", get(root))
    .route("/health", get(health))
    .route("/status", get(status))
    .route("/metrics", get(metrics))
    .route("/test", get(tool_test))
    .route("/audio", get(media::audio))
    .route("/video", get(media::video))
    .route("/info", get(media::info))
    .route("/formats", get(media::formats))
    .route("/download", get(media::download))
    .route("/cookies/info", get(cookies::info))
    .route("/cookies/upload", post(cookies::upload))
    .route("/cookies/clear", delete(cookies::clear))
    .route("/cookies/test", get(cookies::test))
    .route("/cookies/guide", get(cookies::guide))
    .fallback(not_found)
}

fn with_layers(routes: Router<AppState>, state: AppState) -> Router {
  routes
    .layer(CatchPanicLayer::custom(handle_panic))
    .layer(middleware::from_fn_with_state(state.clone(), track_request))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// counts requests and gives every error body the same shape
async fn track_request<B>(
  State(state): State<AppState>,
  req: Request<B>,
  next: Next<B>,
) -> Response {
  let path = req.uri().path().to_string();
  let resp = next.run(req).await;
  let status = resp.status();
  let is_error = status.is_client_error() || status.is_server_error();
  state.metrics.request(is_error);

  if !is_error {
    return resp;
  }

  let message = match resp.extensions().get::<ErrorReport>() {
    Some(report) => report.message.clone(),
    None => status
      .canonical_reason()
      .unwrap_or("error")
      .to_lowercase(),
  };
  error_response(status, &message, Some(&path))
}

// the panic hook installed in main has already logged the backtrace
fn handle_panic(_err: Box<dyn Any + Send + 'static>) -> Response {
  error_response(
    StatusCode::INTERNAL_SERVER_ERROR,
    "internal server error",
    None,
  )
}

async fn not_found() -> Error {
  Error::NotFound("no such endpoint".into())
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
  service: &'static str,
  version: &'static str,
  endpoints: &'static [&'static str],
}

pub async fn root() -> Json<Envelope<ServiceInfo>> {
  success(ServiceInfo {
    service: env!("CARGO_PKG_NAME"),
    version: env!("CARGO_PKG_VERSION"),
    endpoints: ENDPOINTS,
  })
}

#[derive(Debug, Serialize)]
pub struct Health {
  healthy: bool,
  timestamp: DateTime<Utc>,
}

pub async fn health() -> Json<Envelope<Health>> {
  success(Health {
    healthy: true,
    timestamp: Utc::now(),
  })
}

#[derive(Debug, Serialize)]
pub struct Status {
  pub started_at: DateTime<Utc>,
  pub uptime_secs: i64,
  pub active_cookies: Option<Slot>,
  pub config: Config,
}

pub async fn status(State(state): State<AppState>) -> Json<Envelope<Status>> {
  let active_cookies = state.cookies.effective().await.map(|(slot, _)| slot);

  success(Status {
    started_at: state.started_at,
    uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    active_cookies,
    config: (*state.config).clone(),
  })
}

#[derive(Debug, Serialize)]
pub struct MetricsReport {
  uptime_secs: i64,
  #[serde(flatten)]
  counters: MetricsSnapshot,
}

pub async fn metrics(
  State(state): State<AppState>,
) -> Json<Envelope<MetricsReport>> {
  success(MetricsReport {
    uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    counters: state.metrics.snapshot(),
  })
}

#[derive(Debug, Serialize)]
pub struct ToolVersion {
  pub tool: String,
  pub version: String,
}

/// Checks that yt-dlp can be started at all.
pub async fn tool_test(
  State(state): State<AppState>,
) -> Result<Json<Envelope<ToolVersion>>> {
  let version = state.extractor.version().await?;

  Ok(success(ToolVersion {
    tool: state.config.ytdlp_path.clone(),
    version,
  }))
}
