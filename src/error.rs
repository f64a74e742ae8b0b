use std::time::Duration;

use axum::{
  extract::multipart::MultipartError,
  response::{IntoResponse, Response},
  Json,
};
use http::StatusCode;
use serde::Serialize;
use tracing::{debug, error};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("invalid input: {0}")]
  InvalidInput(String),
  #[error("video is age restricted: {0}")]
  AgeRestricted(String),
  #[error("video is private: {0}")]
  Private(String),
  #[error("not found: {0}")]
  NotFound(String),
  #[error("yt-dlp did not finish within {}s", .0.as_secs())]
  Timeout(Duration),
  #[error("invalid cookie file: {0}")]
  InvalidFormat(String),
  #[error("cookie upload is disabled on this instance")]
  UploadDisabled,
  #[error("video is too long ({duration}s, limit is {limit}s)")]
  DurationExceeded { duration: u64, limit: u64 },
  #[error("yt-dlp failed: {0}")]
  ToolExecution(String),
  #[error("failed to parse yt-dlp output: {0}")]
  Parse(String),
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("upstream request failed: {0}")]
  Upstream(#[from] reqwest::Error),
  #[error("invalid multipart request: {0}")]
  Multipart(#[from] MultipartError),
}

impl From<serde_json::Error> for Error {
  fn from(err: serde_json::Error) -> Self {
    Error::Parse(err.to_string())
  }
}

impl Error {
  pub fn status(&self) -> StatusCode {
    match self {
      Error::InvalidInput(_)
      | Error::InvalidFormat(_)
      | Error::DurationExceeded { .. }
      | Error::Multipart(_) => StatusCode::BAD_REQUEST,
      Error::AgeRestricted(_) | Error::Private(_) | Error::UploadDisabled => {
        StatusCode::FORBIDDEN
      }
      Error::NotFound(_) => StatusCode::NOT_FOUND,
      Error::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
      Error::ToolExecution(_)
      | Error::Parse(_)
      | Error::Io(_)
      | Error::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  // io and upstream errors may carry local paths or signed urls
  fn client_message(&self) -> String {
    match self {
      Error::Io(_) => "internal server error".to_string(),
      Error::Upstream(_) => "failed to fetch stream from upstream".to_string(),
      other => other.to_string(),
    }
  }
}

/// Attached to every error response so that outer layers can rebuild the
/// body with request details.
#[derive(Debug, Clone)]
pub struct ErrorReport {
  pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
  status: &'static str,
  error: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  path: Option<&'a str>,
}

pub fn error_response(
  status: StatusCode,
  message: &str,
  path: Option<&str>,
) -> Response {
  let body = ErrorBody {
    status: "error",
    error: message,
    path,
  };
  let mut resp = (status, Json(body)).into_response();
  resp.extensions_mut().insert(ErrorReport {
    message: message.to_string(),
  });
  resp
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!("request failed: {self}");
    } else {
      debug!("request rejected: {self}");
    }

    error_response(status, &self.client_message(), None)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_util::json_body;

  #[test]
  fn test_status_mapping() {
    let cases = [
      (Error::InvalidInput("x".into()), 400),
      (Error::AgeRestricted("x".into()), 403),
      (Error::Private("x".into()), 403),
      (Error::NotFound("x".into()), 404),
      (Error::Timeout(Duration::from_secs(60)), 408),
      (Error::InvalidFormat("x".into()), 400),
      (Error::UploadDisabled, 403),
      (
        Error::DurationExceeded {
          duration: 10,
          limit: 5,
        },
        400,
      ),
      (Error::ToolExecution("x".into()), 500),
      (Error::Parse("x".into()), 500),
    ];

    for (err, code) in cases {
      assert_eq!(err.status().as_u16(), code, "{err}");
    }
  }

  #[test]
  fn test_io_details_are_hidden() {
    let err = Error::Io(std::io::Error::new(
      std::io::ErrorKind::PermissionDenied,
      "/secret/cookies.txt",
    ));
    assert!(!err.client_message().contains("/secret"));
  }

  #[tokio::test]
  async fn test_error_envelope() {
    let resp = Error::NotFound("no stream found".into()).into_response();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(resp.extensions().get::<ErrorReport>().is_some());

    let body = json_body(resp).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "not found: no stream found");
    // filled in by the router middleware
    assert!(body.get("path").is_none());
  }
}
