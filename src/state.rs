use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
  config::Config, cookie_store::CookieStore, extractor::Extractor,
  metrics::Metrics, ytdlp::CommandRunner, Result,
};

/// Shared by every handler. Built once at startup, immutable afterwards.
#[derive(Clone)]
pub struct AppState {
  pub config: Arc<Config>,
  pub extractor: Arc<Extractor>,
  pub cookies: Arc<CookieStore>,
  pub metrics: Arc<Metrics>,
  pub http: reqwest::Client,
  pub started_at: DateTime<Utc>,
}

impl AppState {
  pub fn new(config: Config, runner: Arc<dyn CommandRunner>) -> Result<Self> {
    let metrics = Arc::new(Metrics::default());
    let extractor = Extractor::new(
      runner,
      config.request_timeout,
      config.format_fallback,
      metrics.clone(),
    );
    let cookies = CookieStore::new(&config.cookie_dir)?;

    Ok(Self {
      config: Arc::new(config),
      extractor: Arc::new(extractor),
      cookies: Arc::new(cookies),
      metrics,
      http: reqwest::Client::new(),
      started_at: Utc::now(),
    })
  }

  /// Cookie file for a request, if it asked for one and one is usable.
  pub async fn cookies_for(&self, use_cookies: bool) -> Option<PathBuf> {
    if !use_cookies {
      return None;
    }
    let path = self.cookies.effective_path().await;
    if path.is_none() {
      debug!("no valid cookie file, continuing without cookies");
    }
    path
  }
}
