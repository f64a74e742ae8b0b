use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
  failure::{classify, failure_kind},
  format::{self, MediaKind, RawFormat},
  metrics::Metrics,
  video_id::VideoId,
  ytdlp::{CommandRunner, ProcessOutput},
  Error, Result,
};

/// The subset of yt-dlp's `--dump-json` output used by the service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VideoMetadata {
  pub id: String,
  pub title: Option<String>,
  pub duration: Option<f64>,
  pub uploader: Option<String>,
  pub channel: Option<String>,
  pub channel_id: Option<String>,
  pub thumbnail: Option<String>,
  pub description: Option<String>,
  pub view_count: Option<u64>,
  pub like_count: Option<u64>,
  pub upload_date: Option<String>,
  pub is_live: Option<bool>,
  pub webpage_url: Option<String>,
  /// Extension of the selected format when `-f` was given.
  pub ext: Option<String>,
  pub http_headers: HashMap<String, String>,
  pub formats: Vec<RawFormat>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamUrl {
  pub url: String,
  pub selector: String,
}

/// Builds yt-dlp invocations for the endpoints and interprets their output.
pub struct Extractor {
  runner: Arc<dyn CommandRunner>,
  timeout: Duration,
  fallback: bool,
  metrics: Arc<Metrics>,
}

impl Extractor {
  pub fn new(
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    fallback: bool,
    metrics: Arc<Metrics>,
  ) -> Self {
    Self {
      runner,
      timeout,
      fallback,
      metrics,
    }
  }

  async fn run(&self, args: Vec<String>) -> Result<ProcessOutput> {
    self.metrics.tool_invocation();
    match self.runner.run(&args, self.timeout).await {
      Ok(output) => {
        if !output.success() {
          self.metrics.tool_failure();
          warn!("yt-dlp exited with {:?}: {}", output.code, output.stderr_excerpt());
        }
        Ok(output)
      }
      Err(Error::Timeout(timeout)) => {
        self.metrics.tool_timeout();
        Err(Error::Timeout(timeout))
      }
      Err(e) => Err(e),
    }
  }

  fn args(
    video: &VideoId,
    cookies: Option<&Path>,
    selector: Option<&str>,
    mode: &str,
  ) -> Vec<String> {
    let mut args = vec!["--no-warnings".to_string(), "--no-playlist".to_string()];
    if let Some(cookies) = cookies {
      args.push("--cookies".to_string());
      args.push(cookies.display().to_string());
    }
    if let Some(selector) = selector {
      args.push("-f".to_string());
      args.push(selector.to_string());
    }
    args.push(mode.to_string());
    args.push(video.watch_url());
    args
  }

  /// Resolve a direct stream url with `-g`, walking the selector chain for
  /// `quality` until one yields a url.
  pub async fn stream_url(
    &self,
    video: &VideoId,
    kind: MediaKind,
    quality: &str,
    cookies: Option<&Path>,
  ) -> Result<StreamUrl> {
    let primary = format::selector(kind, quality);
    let chain = format::selector_chain(kind, primary, self.fallback);

    let mut last_err = None;
    for selector in chain {
      debug!("resolving {video} with selector {selector}");
      let output = self
        .run(Self::args(video, cookies, Some(&selector), "-g"))
        .await?;

      if output.success() {
        match output.first_line() {
          Some(url) => {
            return Ok(StreamUrl {
              url: url.to_string(),
              selector,
            })
          }
          None => {
            last_err = Some(Error::NotFound("no stream found".into()));
            continue;
          }
        }
      }

      let err = classify(&output);
      if failure_kind(&output.stderr).map_or(false, |kind| kind.is_final()) {
        return Err(err);
      }
      warn!("selector {selector} failed for {video}: {err}");
      last_err = Some(err);
    }

    Err(last_err.unwrap_or_else(|| Error::NotFound("no stream found".into())))
  }

  /// `--dump-json` for the video, optionally for the format picked by
  /// `selector`.
  pub async fn metadata(
    &self,
    video: &VideoId,
    selector: Option<&str>,
    cookies: Option<&Path>,
  ) -> Result<VideoMetadata> {
    let output = self
      .run(Self::args(video, cookies, selector, "--dump-json"))
      .await?;
    if !output.success() {
      return Err(classify(&output));
    }

    let json = output
      .first_line()
      .ok_or_else(|| Error::Parse("empty output".into()))?;
    Ok(serde_json::from_str(json)?)
  }

  pub async fn version(&self) -> Result<String> {
    let output = self.run(vec!["--version".to_string()]).await?;
    if !output.success() {
      return Err(classify(&output));
    }
    output
      .first_line()
      .map(str::to_string)
      .ok_or_else(|| Error::Parse("empty version output".into()))
  }
}
