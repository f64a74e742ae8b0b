use std::{net::IpAddr, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_DURATION_SECS: u64 = 2 * 60 * 60;
pub const DEFAULT_MAX_RESULTS: usize = 20;
pub const MAX_RESULTS_LIMIT: usize = 100;

/// Service configuration, read once from the environment at startup.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
  pub ytdlp_path: String,
  pub ytdlp_extra_args: Vec<String>,
  #[serde(skip)]
  pub ytdlp_proxy: Option<String>,
  pub host: IpAddr,
  pub port: u16,
  pub workers: usize,
  #[serde(serialize_with = "as_secs")]
  pub request_timeout: Duration,
  pub max_video_duration: u64,
  pub allow_cookie_upload: bool,
  pub cookie_dir: PathBuf,
  pub format_fallback: bool,
  pub default_max_results: usize,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_u64(d.as_secs())
}

impl Default for Config {
  fn default() -> Self {
    Self {
      ytdlp_path: "yt-dlp".to_string(),
      ytdlp_extra_args: Vec::new(),
      ytdlp_proxy: None,
      host: IpAddr::from([0, 0, 0, 0]),
      port: DEFAULT_PORT,
      workers: default_workers(),
      request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
      max_video_duration: DEFAULT_MAX_DURATION_SECS,
      allow_cookie_upload: true,
      cookie_dir: PathBuf::from("./cookies"),
      format_fallback: true,
      default_max_results: DEFAULT_MAX_RESULTS,
    }
  }
}

fn default_workers() -> usize {
  std::thread::available_parallelism()
    .map(|n| n.get())
    .unwrap_or(1)
}

impl Config {
  pub fn from_env() -> Result<Self> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let get = |key: &str| {
      lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    };
    let mut config = Config::default();

    if let Some(path) = get("YTDLP_PATH") {
      config.ytdlp_path = path;
    }
    if let Some(args) = get("YTDLP_EXTRA_ARGS") {
      config.ytdlp_extra_args =
        args.split_whitespace().map(str::to_string).collect();
    }
    config.ytdlp_proxy = get("YTDLP_PROXY");
    if let Some(host) = get("HOST") {
      config.host = parse("HOST", &host)?;
    }
    if let Some(port) = get("PORT") {
      config.port = parse("PORT", &port)?;
    }
    if let Some(workers) = get("WORKERS") {
      config.workers = parse("WORKERS", &workers)?;
      if config.workers == 0 {
        return Err(anyhow!("WORKERS must be at least 1"));
      }
    }
    if let Some(timeout) = get("REQUEST_TIMEOUT") {
      let secs: u64 = parse("REQUEST_TIMEOUT", &timeout)?;
      if secs == 0 {
        return Err(anyhow!("REQUEST_TIMEOUT must be at least 1 second"));
      }
      config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(duration) = get("MAX_VIDEO_DURATION") {
      config.max_video_duration = parse("MAX_VIDEO_DURATION", &duration)?;
    }
    if let Some(allow) = get("ALLOW_COOKIE_UPLOAD") {
      config.allow_cookie_upload = parse_bool("ALLOW_COOKIE_UPLOAD", &allow)?;
    }
    if let Some(dir) = get("COOKIE_DIR") {
      config.cookie_dir = PathBuf::from(dir);
    }
    if let Some(fallback) = get("FORMAT_FALLBACK") {
      config.format_fallback = parse_bool("FORMAT_FALLBACK", &fallback)?;
    }
    if let Some(max) = get("DEFAULT_MAX_RESULTS") {
      let max: usize = parse("DEFAULT_MAX_RESULTS", &max)?;
      config.default_max_results = max.clamp(1, MAX_RESULTS_LIMIT);
    }

    Ok(config)
  }

  /// `max_results` query value clamped to the allowed range.
  pub fn max_results(&self, requested: Option<usize>) -> usize {
    requested
      .unwrap_or(self.default_max_results)
      .clamp(1, MAX_RESULTS_LIMIT)
  }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
  T: FromStr,
  T::Err: std::error::Error + Send + Sync + 'static,
{
  value
    .parse()
    .with_context(|| format!("invalid value for {key}: {value:?}"))
}

pub fn parse_bool(key: &str, value: &str) -> Result<bool> {
  match value.to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(true),
    "0" | "false" | "no" | "off" => Ok(false),
    _ => Err(anyhow!("invalid boolean for {key}: {value:?}")),
  }
}
