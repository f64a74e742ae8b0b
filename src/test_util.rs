use std::{
  sync::{Arc, Mutex},
  time::Duration,
};

use async_trait::async_trait;
use axum::response::Response;
use tempfile::TempDir;

use crate::{
  config::Config,
  state::AppState,
  ytdlp::{CommandRunner, ProcessOutput},
  Result,
};

type Respond = dyn Fn(&[String]) -> Result<ProcessOutput> + Send + Sync;

/// Answers invocations from a closure and records their arguments.
pub struct ScriptedRunner {
  respond: Box<Respond>,
  calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
  pub fn new(
    respond: impl Fn(&[String]) -> Result<ProcessOutput> + Send + Sync + 'static,
  ) -> Arc<Self> {
    Arc::new(Self {
      respond: Box::new(respond),
      calls: Mutex::new(Vec::new()),
    })
  }

  pub fn calls(&self) -> Vec<Vec<String>> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
  async fn run(
    &self,
    args: &[String],
    _timeout: Duration,
  ) -> Result<ProcessOutput> {
    self.calls.lock().unwrap().push(args.to_vec());
    (self.respond)(args)
  }
}

pub fn ok(stdout: &str) -> ProcessOutput {
  ProcessOutput {
    stdout: stdout.to_string(),
    stderr: String::new(),
    code: Some(0),
  }
}

pub fn failed(stderr: &str) -> ProcessOutput {
  ProcessOutput {
    stdout: String::new(),
    stderr: stderr.to_string(),
    code: Some(1),
  }
}

pub fn test_state(
  runner: Arc<ScriptedRunner>,
  configure: impl FnOnce(&mut Config),
) -> (TempDir, AppState) {
  let dir = tempfile::tempdir().unwrap();
  let mut config = Config {
    cookie_dir: dir.path().join("cookies"),
    ..Config::default()
  };
  configure(&mut config);
  let state = AppState::new(config, runner).unwrap();
  (dir, state)
}

pub async fn json_body(resp: Response) -> serde_json::Value {
  let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

pub const COOKIES: &str = "# Netscape HTTP Cookie File\n\
  .youtube.com\tTRUE\t/\tTRUE\t1767225600\tPREF\tf6=40000000\n";
