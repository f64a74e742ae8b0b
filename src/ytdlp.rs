use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::{io::AsyncReadExt, process::Command};
use tracing::{debug, info, warn};

use crate::{Error, Result};

// longest stderr text handed back to clients
const STDERR_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
  pub stdout: String,
  pub stderr: String,
  /// `None` when the process was terminated by a signal.
  pub code: Option<i32>,
}

impl ProcessOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }

  /// Bounded stderr text, starting at the first `ERROR:` line if any.
  pub fn stderr_excerpt(&self) -> String {
    let stderr = self.stderr.trim();
    if stderr.is_empty() {
      return format!("exited with status {:?}", self.code);
    }
    let start = stderr.find("ERROR:").unwrap_or(0);
    stderr[start..].chars().take(STDERR_EXCERPT_CHARS).collect()
  }

  /// First non-empty stdout line, which is what `-g` prints for the
  /// selected format.
  pub fn first_line(&self) -> Option<&str> {
    self.stdout.lines().map(str::trim).find(|line| !line.is_empty())
  }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
  /// Run the tool with `args` appended to its base arguments.
  ///
  /// A non-zero exit is not an error here; failing to start the process or
  /// exceeding `timeout` is.
  async fn run(&self, args: &[String], timeout: Duration)
    -> Result<ProcessOutput>;
}

// run yt-dlp command line.
// requires the configured executable to be in PATH or absolute.
pub struct Ytdlp {
  program: String,
  base_args: Vec<String>,
}

impl Ytdlp {
  pub fn new(program: impl Into<String>, base_args: Vec<String>) -> Self {
    Self {
      program: program.into(),
      base_args,
    }
  }

  pub fn with_proxy(mut self, proxy: Option<&str>) -> Self {
    if let Some(proxy) = proxy {
      // used to remove cred info from proxy url before printing
      static AUTH_REGEX: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"//[^:]+(:[^@]+)@").unwrap());
      info!("using proxy: {}", AUTH_REGEX.replace(proxy, "//<REDACTED>@"));

      self.base_args.push("--proxy".to_string());
      self.base_args.push(proxy.to_string());
    }
    self
  }
}

#[async_trait]
impl CommandRunner for Ytdlp {
  async fn run(
    &self,
    args: &[String],
    timeout: Duration,
  ) -> Result<ProcessOutput> {
    let mut cmd = Command::new(&self.program);
    cmd
      .args(&self.base_args)
      .args(args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      // reclaims the process if the request future is dropped
      .kill_on_drop(true);

    debug!("running {} {:?}", self.program, args);
    let mut child = cmd.spawn().map_err(|e| {
      Error::ToolExecution(format!("failed to start {}: {e}", self.program))
    })?;

    let (mut stdout, mut stderr) =
      match (child.stdout.take(), child.stderr.take()) {
        (Some(stdout), Some(stderr)) => (stdout, stderr),
        _ => {
          child.kill().await.ok();
          return Err(Error::ToolExecution("stdio not captured".into()));
        }
      };

    // both pipes are drained while waiting, a full pipe would block the
    // child forever
    let collect = async {
      let mut out = Vec::new();
      let mut err = Vec::new();
      let (out_res, err_res) = tokio::join!(
        stdout.read_to_end(&mut out),
        stderr.read_to_end(&mut err)
      );
      out_res?;
      err_res?;
      let status = child.wait().await?;
      Ok::<_, std::io::Error>((status, out, err))
    };

    let result = tokio::time::timeout(timeout, collect).await;
    match result {
      Ok(Ok((status, out, err))) => Ok(ProcessOutput {
        stdout: String::from_utf8_lossy(&out).into_owned(),
        stderr: String::from_utf8_lossy(&err).into_owned(),
        code: status.code(),
      }),
      Ok(Err(e)) => {
        child.kill().await.ok();
        Err(Error::Io(e))
      }
      Err(_) => {
        warn!(
          "{} timed out after {:?}, killing pid {:?}",
          self.program,
          timeout,
          child.id()
        );
        // kill() also waits, so the process is reaped before returning
        if let Err(e) = child.kill().await {
          warn!("failed to kill timed out process: {e}");
        }
        Err(Error::Timeout(timeout))
      }
    }
  }
}
