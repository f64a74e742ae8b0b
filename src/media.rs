use axum::{
  body::StreamBody,
  extract::{rejection::QueryRejection, Query, State},
  response::{IntoResponse, Response},
  Json,
};
use http::{header, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
  api::{query, success, Envelope},
  format::{self, FormatDescriptor, FormatFilter, MediaKind},
  state::AppState,
  video_id::VideoId,
  Error, Result,
};

fn yes() -> bool {
  true
}

fn default_kind() -> MediaKind {
  MediaKind::Video
}

#[derive(Debug, Deserialize)]
pub struct StreamParams {
  url: String,
  quality: Option<String>,
  #[serde(default = "yes")]
  use_cookies: bool,
}

#[derive(Debug, Serialize)]
pub struct StreamResponse {
  pub video_id: String,
  pub stream_url: String,
  pub quality: String,
  pub format: String,
  pub used_cookies: bool,
}

async fn resolve_stream(
  state: &AppState,
  params: StreamParams,
  kind: MediaKind,
  default_quality: &str,
) -> Result<Json<Envelope<StreamResponse>>> {
  let video = VideoId::parse(&params.url)?;
  let quality = params.quality.unwrap_or_else(|| default_quality.to_string());
  let cookies = state.cookies_for(params.use_cookies).await;

  let stream = state
    .extractor
    .stream_url(&video, kind, &quality, cookies.as_deref())
    .await?;

  Ok(success(StreamResponse {
    video_id: video.to_string(),
    stream_url: stream.url,
    quality,
    format: stream.selector,
    used_cookies: cookies.is_some(),
  }))
}

pub async fn audio(
  State(state): State<AppState>,
  params: Result<Query<StreamParams>, QueryRejection>,
) -> Result<Json<Envelope<StreamResponse>>> {
  resolve_stream(&state, query(params)?, MediaKind::Audio, "best").await
}

pub async fn video(
  State(state): State<AppState>,
  params: Result<Query<StreamParams>, QueryRejection>,
) -> Result<Json<Envelope<StreamResponse>>> {
  resolve_stream(&state, query(params)?, MediaKind::Video, "720p").await
}

#[derive(Debug, Deserialize)]
pub struct InfoParams {
  url: String,
  #[serde(default = "yes")]
  use_cookies: bool,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
  pub video_id: String,
  pub title: Option<String>,
  pub duration: Option<f64>,
  pub channel: Option<String>,
  pub channel_id: Option<String>,
  pub thumbnail: Option<String>,
  pub view_count: Option<u64>,
  pub like_count: Option<u64>,
  pub upload_date: Option<String>,
  pub is_live: Option<bool>,
  pub webpage_url: Option<String>,
  pub format_count: usize,
}

pub async fn info(
  State(state): State<AppState>,
  params: Result<Query<InfoParams>, QueryRejection>,
) -> Result<Json<Envelope<InfoResponse>>> {
  let params = query(params)?;
  let video = VideoId::parse(&params.url)?;
  let cookies = state.cookies_for(params.use_cookies).await;
  let meta = state
    .extractor
    .metadata(&video, None, cookies.as_deref())
    .await?;

  Ok(success(InfoResponse {
    video_id: video.to_string(),
    title: meta.title,
    duration: meta.duration,
    channel: meta.uploader.or(meta.channel),
    channel_id: meta.channel_id,
    thumbnail: meta.thumbnail,
    view_count: meta.view_count,
    like_count: meta.like_count,
    upload_date: meta.upload_date,
    is_live: meta.is_live,
    webpage_url: meta.webpage_url,
    format_count: meta.formats.len(),
  }))
}

#[derive(Debug, Deserialize)]
pub struct FormatsParams {
  url: String,
  max_results: Option<usize>,
  #[serde(default)]
  format_type: FormatFilter,
  #[serde(default = "yes")]
  use_cookies: bool,
}

#[derive(Debug, Serialize)]
pub struct FormatsResponse {
  pub video_id: String,
  pub title: Option<String>,
  pub total: usize,
  pub count: usize,
  pub formats: Vec<FormatDescriptor>,
}

pub async fn formats(
  State(state): State<AppState>,
  params: Result<Query<FormatsParams>, QueryRejection>,
) -> Result<Json<Envelope<FormatsResponse>>> {
  let params = query(params)?;
  let video = VideoId::parse(&params.url)?;
  let max_results = state.config.max_results(params.max_results);
  let cookies = state.cookies_for(params.use_cookies).await;
  let meta = state
    .extractor
    .metadata(&video, None, cookies.as_deref())
    .await?;

  let total = meta.formats.len();
  let formats =
    format::list_formats(meta.formats, params.format_type, max_results);

  Ok(success(FormatsResponse {
    video_id: video.to_string(),
    title: meta.title,
    total,
    count: formats.len(),
    formats,
  }))
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
  url: String,
  #[serde(default = "default_kind")]
  format_type: MediaKind,
  quality: Option<String>,
  #[serde(default = "yes")]
  use_cookies: bool,
}

/// ASCII-only so it fits in a header without encoding.
fn attachment_name(title: Option<&str>, video: &VideoId, ext: &str) -> String {
  let stem: String = title
    .unwrap_or_default()
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || " -_.()".contains(c) {
        c
      } else {
        '_'
      }
    })
    .take(100)
    .collect();
  let stem = stem.trim().trim_matches('.');

  if stem.chars().all(|c| c == '_') {
    format!("{video}.{ext}")
  } else {
    format!("{stem}.{ext}")
  }
}

/// Resolves the stream, then proxies its bytes as an attachment.
pub async fn download(
  State(state): State<AppState>,
  params: Result<Query<DownloadParams>, QueryRejection>,
) -> Result<Response> {
  let params = query(params)?;
  let video = VideoId::parse(&params.url)?;
  let kind = params.format_type;
  let quality = params.quality.unwrap_or_else(|| "best".to_string());
  let cookies = state.cookies_for(params.use_cookies).await;

  let stream = state
    .extractor
    .stream_url(&video, kind, &quality, cookies.as_deref())
    .await?;
  let meta = state
    .extractor
    .metadata(&video, Some(&stream.selector), cookies.as_deref())
    .await?;

  let limit = state.config.max_video_duration;
  let duration = meta.duration.unwrap_or(0.0).max(0.0) as u64;
  if duration > limit {
    return Err(Error::DurationExceeded { duration, limit });
  }

  let default_ext = match kind {
    MediaKind::Audio => "m4a",
    MediaKind::Video => "mp4",
  };
  let ext = meta.ext.as_deref().unwrap_or(default_ext);
  let filename = attachment_name(meta.title.as_deref(), &video, ext);
  info!("proxying {video} ({}) as {filename}", stream.selector);

  let mut request = state.http.get(&stream.url);
  for (name, value) in &meta.http_headers {
    request = request.header(name, value);
  }
  let upstream = request.send().await?.error_for_status()?;

  let mut headers = HeaderMap::new();
  let content_type = upstream
    .headers()
    .get(header::CONTENT_TYPE)
    .cloned()
    .unwrap_or(HeaderValue::from_static("application/octet-stream"));
  headers.insert(header::CONTENT_TYPE, content_type);
  if let Some(length) = upstream.headers().get(header::CONTENT_LENGTH) {
    headers.insert(header::CONTENT_LENGTH, length.clone());
  }
  let disposition = format!("attachment; filename=\"{filename}\"");
  headers.insert(
    header::CONTENT_DISPOSITION,
    HeaderValue::from_str(&disposition)
      .map_err(|e| Error::Parse(e.to_string()))?,
  );

  Ok((headers, StreamBody::new(upstream.bytes_stream())).into_response())
}
