use std::{backtrace::Backtrace, net::SocketAddr, sync::Arc, time::Duration};

use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod cookie_store;
mod cookies;
mod error;
mod extractor;
mod failure;
mod format;
mod media;
mod metrics;
mod state;
mod video_id;
mod ytdlp;

#[cfg(test)]
mod test_util;

pub use error::{Error, Result};

use crate::{
  config::Config, cookie_store::Scope, state::AppState, ytdlp::Ytdlp,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info")),
    )
    .init();

  std::panic::set_hook(Box::new(|panic| {
    let backtrace = Backtrace::force_capture();
    error!("{panic}\n{backtrace}");
  }));

  let config = Config::from_env()?;

  tokio::runtime::Builder::new_multi_thread()
    .worker_threads(config.workers)
    .enable_all()
    .build()?
    .block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
  let ytdlp = Ytdlp::new(&config.ytdlp_path, config.ytdlp_extra_args.clone())
    .with_proxy(config.ytdlp_proxy.as_deref());
  let state = AppState::new(config, Arc::new(ytdlp))?;

  // temporary cookies do not survive a restart
  let removed = state.cookies.clear(Scope::TEMPORARY).await?;
  if !removed.is_empty() {
    info!("removed temporary cookie file from previous run");
  }

  match state.extractor.version().await {
    Ok(version) => info!("using yt-dlp {version}"),
    Err(e) => warn!("yt-dlp is not usable yet: {e}"),
  }

  Toplevel::new(move |s| async move {
    s.start(SubsystemBuilder::new("http", move |subsys| serve(state, subsys)));
  })
  .catch_signals()
  .handle_shutdown_requests(SHUTDOWN_GRACE)
  .await?;

  Ok(())
}

async fn serve(state: AppState, subsys: SubsystemHandle) -> anyhow::Result<()> {
  let addr = SocketAddr::new(state.config.host, state.config.port);
  let app = api::router(state);

  info!("listening on http://{addr}");
  axum::Server::bind(&addr)
    .serve(app.into_make_service())
    .with_graceful_shutdown(subsys.on_shutdown_requested())
    .await?;

  info!("http server stopped");
  Ok(())
}
