use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Metrics {
  requests: AtomicU64,
  error_responses: AtomicU64,
  tool_invocations: AtomicU64,
  tool_failures: AtomicU64,
  tool_timeouts: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
  pub requests: u64,
  pub error_responses: u64,
  pub tool_invocations: u64,
  pub tool_failures: u64,
  pub tool_timeouts: u64,
}

impl Metrics {
  pub fn request(&self, is_error: bool) {
    self.requests.fetch_add(1, Ordering::Relaxed);
    if is_error {
      self.error_responses.fetch_add(1, Ordering::Relaxed);
    }
  }

  pub fn tool_invocation(&self) {
    self.tool_invocations.fetch_add(1, Ordering::Relaxed);
  }

  pub fn tool_failure(&self) {
    self.tool_failures.fetch_add(1, Ordering::Relaxed);
  }

  pub fn tool_timeout(&self) {
    self.tool_timeouts.fetch_add(1, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> MetricsSnapshot {
    MetricsSnapshot {
      requests: self.requests.load(Ordering::Relaxed),
      error_responses: self.error_responses.load(Ordering::Relaxed),
      tool_invocations: self.tool_invocations.load(Ordering::Relaxed),
      tool_failures: self.tool_failures.load(Ordering::Relaxed),
      tool_timeouts: self.tool_timeouts.load(Ordering::Relaxed),
    }
  }
}
