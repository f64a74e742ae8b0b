//! Maps yt-dlp's free-text error output to error variants.
//!
//! yt-dlp has no structured error reporting, so this is a best-effort
//! substring match over stderr. Extend the table rather than matching on
//! stderr at call sites.

use crate::{ytdlp::ProcessOutput, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
  AgeRestricted,
  Private,
  Unavailable,
  FormatUnavailable,
}

// first match wins, patterns are lowercase
const FAILURE_TABLE: &[(&str, FailureKind)] = &[
  ("age restricted", FailureKind::AgeRestricted),
  ("age-restricted", FailureKind::AgeRestricted),
  ("confirm your age", FailureKind::AgeRestricted),
  ("private video", FailureKind::Private),
  ("private", FailureKind::Private),
  ("requested format is not available", FailureKind::FormatUnavailable),
  ("unavailable", FailureKind::Unavailable),
  ("does not exist", FailureKind::Unavailable),
  ("not available", FailureKind::Unavailable),
];

impl FailureKind {
  /// A different format selector cannot fix this failure.
  pub fn is_final(self) -> bool {
    !matches!(self, FailureKind::FormatUnavailable)
  }
}

pub fn failure_kind(stderr: &str) -> Option<FailureKind> {
  let stderr = stderr.to_lowercase();
  FAILURE_TABLE
    .iter()
    .find(|(pattern, _)| stderr.contains(pattern))
    .map(|(_, kind)| *kind)
}

/// Turn a failed invocation into an error. The whole stderr is matched,
/// only a bounded excerpt ends up in the message.
pub fn classify(output: &ProcessOutput) -> Error {
  let excerpt = output.stderr_excerpt();
  match failure_kind(&output.stderr) {
    Some(FailureKind::AgeRestricted) => Error::AgeRestricted(excerpt),
    Some(FailureKind::Private) => Error::Private(excerpt),
    Some(FailureKind::Unavailable | FailureKind::FormatUnavailable) => {
      Error::NotFound(excerpt)
    }
    None => Error::ToolExecution(excerpt),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_failure_table() {
    let cases = [
      (
        "ERROR: [youtube] abc: Sign in to confirm your age. This video \
         may be inappropriate for some users.",
        Some(FailureKind::AgeRestricted),
      ),
      (
        "ERROR: This video is age restricted",
        Some(FailureKind::AgeRestricted),
      ),
      ("ERROR: [youtube] abc: Private video", Some(FailureKind::Private)),
      (
        "ERROR: [youtube] abc: Video unavailable",
        Some(FailureKind::Unavailable),
      ),
      (
        "ERROR: [youtube] abc: Requested format is not available. Use \
         --list-formats for a list of available formats",
        Some(FailureKind::FormatUnavailable),
      ),
      ("ERROR: HTTP Error 429: Too Many Requests", None),
      ("", None),
    ];

    for (stderr, expected) in cases {
      assert_eq!(failure_kind(stderr), expected, "{stderr}");
    }
  }

  fn failed(stderr: &str) -> ProcessOutput {
    ProcessOutput {
      stdout: String::new(),
      stderr: stderr.to_string(),
      code: Some(1),
    }
  }

  #[test]
  fn test_classify_status() {
    let status = |stderr: &str| classify(&failed(stderr)).status().as_u16();
    assert_eq!(status("Private video"), 403);
    assert_eq!(status("VIDEO UNAVAILABLE"), 404);
    assert_eq!(status("age restricted"), 403);
    assert_eq!(status("Requested format is not available"), 404);
    assert_eq!(status("something broke"), 500);
  }

  #[test]
  fn test_classify_matches_beyond_excerpt() {
    let stderr = format!("ERROR: {} Private video", "x".repeat(500));
    let err = classify(&failed(&stderr));
    assert!(matches!(err, Error::Private(_)));
    assert!(!err.to_string().contains("Private video"));
  }

  #[test]
  fn test_only_format_failures_are_retryable() {
    assert!(FailureKind::Private.is_final());
    assert!(FailureKind::Unavailable.is_final());
    assert!(!FailureKind::FormatUnavailable.is_final());
  }
}
