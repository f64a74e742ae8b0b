use axum::{
  extract::{rejection::QueryRejection, Multipart, Query, State},
  Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
  api::{query, success, Envelope},
  config::parse_bool,
  cookie_store::{CookieInfo, Scope, Slot},
  state::AppState,
  video_id::VideoId,
  Error, Result,
};

// used by /cookies/test when no url is given
const PROBE_VIDEO: &str = "dQw4w9WgXcQ";

#[derive(Debug, Serialize)]
pub struct CookieInfoResponse {
  pub upload_enabled: bool,
  #[serde(flatten)]
  pub info: CookieInfo,
}

pub async fn info(
  State(state): State<AppState>,
) -> Result<Json<Envelope<CookieInfoResponse>>> {
  Ok(success(CookieInfoResponse {
    upload_enabled: state.config.allow_cookie_upload,
    info: state.cookies.info().await?,
  }))
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
  pub stored: Vec<Slot>,
  pub size: usize,
  pub active: Option<Slot>,
}

/// Reads the `file` part and the optional `temporary` / `permanent` flags.
/// Without flags the upload goes to the temporary slot.
async fn read_upload(mut multipart: Multipart) -> Result<(Bytes, Scope)> {
  let mut file = None;
  let mut temporary = None;
  let mut permanent = None;
  let flag = |text: String| {
    parse_bool("scope flag", text.trim())
      .map_err(|e| Error::InvalidInput(e.to_string()))
  };

  while let Some(field) = multipart.next_field().await? {
    match field.name() {
      Some("file") => file = Some(field.bytes().await?),
      Some("temporary") => temporary = Some(flag(field.text().await?)?),
      Some("permanent") => permanent = Some(flag(field.text().await?)?),
      _ => {}
    }
  }

  let file =
    file.ok_or_else(|| Error::InvalidInput("missing `file` field".into()))?;
  let scope = match (temporary, permanent) {
    (None, None) => Scope::TEMPORARY,
    (temporary, permanent) => Scope {
      temporary: temporary.unwrap_or(false),
      permanent: permanent.unwrap_or(false),
    },
  };

  Ok((file, scope))
}

pub async fn upload(
  State(state): State<AppState>,
  multipart: Multipart,
) -> Result<Json<Envelope<UploadResponse>>> {
  if !state.config.allow_cookie_upload {
    return Err(Error::UploadDisabled);
  }

  let (file, scope) = read_upload(multipart).await?;
  let size = file.len();
  let stored = state.cookies.upload(file, scope).await?;
  let active = state.cookies.effective().await.map(|(slot, _)| slot);

  Ok(success(UploadResponse {
    stored,
    size,
    active,
  }))
}

#[derive(Debug, Deserialize)]
pub struct ClearParams {
  #[serde(default = "yes")]
  temporary: bool,
  #[serde(default)]
  permanent: bool,
}

fn yes() -> bool {
  true
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
  pub removed: Vec<Slot>,
  pub active: Option<Slot>,
}

pub async fn clear(
  State(state): State<AppState>,
  params: Result<Query<ClearParams>, QueryRejection>,
) -> Result<Json<Envelope<ClearResponse>>> {
  let params = query(params)?;
  let scope = Scope {
    temporary: params.temporary,
    permanent: params.permanent,
  };

  let removed = state.cookies.clear(scope).await?;
  info!("cleared cookie slots {removed:?}");
  let active = state.cookies.effective().await.map(|(slot, _)| slot);

  Ok(success(ClearResponse { removed, active }))
}

#[derive(Debug, Deserialize)]
pub struct TestParams {
  url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TestResponse {
  pub video_id: String,
  pub cookies_active: bool,
  pub source: Option<Slot>,
  pub extraction_ok: bool,
  pub title: Option<String>,
  pub error: Option<String>,
}

/// Runs a metadata extraction with the active cookie file. Extraction
/// failures are part of the report, not an error response.
pub async fn test(
  State(state): State<AppState>,
  params: Result<Query<TestParams>, QueryRejection>,
) -> Result<Json<Envelope<TestResponse>>> {
  let params = query(params)?;
  let video = VideoId::parse(params.url.as_deref().unwrap_or(PROBE_VIDEO))?;
  let effective = state.cookies.effective().await;
  let cookies = effective.as_ref().map(|(_, path)| path.as_path());

  let (title, error) = match state.extractor.metadata(&video, None, cookies).await
  {
    Ok(meta) => (meta.title, None),
    Err(e) => {
      warn!("cookie test extraction failed: {e}");
      (None, Some(e.to_string()))
    }
  };

  Ok(success(TestResponse {
    video_id: video.to_string(),
    cookies_active: effective.is_some(),
    source: effective.map(|(slot, _)| slot),
    extraction_ok: error.is_none(),
    title,
    error,
  }))
}

#[derive(Debug, Serialize)]
pub struct Guide {
  pub format: &'static str,
  pub steps: &'static [&'static str],
  pub upload: &'static str,
  pub notes: &'static [&'static str],
}

pub async fn guide() -> Json<Envelope<Guide>> {
  success(Guide {
    format: "Netscape HTTP Cookie File (cookies.txt)",
    steps: &[
      "Sign in to youtube.com in a private browser window",
      "Export the cookies for youtube.com with a cookies.txt exporter extension",
      "Close the private window without signing out",
      "Upload the exported file to POST /cookies/upload",
    ],
    upload: "curl -F file=@cookies.txt -F permanent=true <host>/cookies/upload",
    notes: &[
      "Without flags an upload goes to the temporary slot, which is cleared on restart",
      "A valid temporary file takes precedence over the permanent one",
      "Pass use_cookies=false to an endpoint to skip cookies for one request",
    ],
  })
}
