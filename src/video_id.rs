use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Error, Result};

// inside a url the id must not run into further id characters
const ID: &str = r"([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)";
const BARE_ID: &str = r"^([A-Za-z0-9_-]{11})$";

static VIDEO_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
  [
    // watch?v=ID, possibly after other query parameters
    r"^(?:https?://)?(?:www\.|m\.|music\.)?youtube\.com/watch\?(?:[^#]*&)?v=",
    r"^(?:https?://)?youtu\.be/",
    r"^(?:https?://)?(?:www\.|m\.)?youtube(?:-nocookie)?\.com/embed/",
    r"^(?:https?://)?(?:www\.|m\.)?youtube\.com/shorts/",
    r"^(?:https?://)?(?:www\.|m\.)?youtube\.com/live/",
    r"^(?:https?://)?(?:www\.|m\.)?youtube\.com/v/",
  ]
  .iter()
  .map(|prefix| format!("{prefix}{ID}"))
  .chain([BARE_ID.to_string()])
  .map(|pattern| Regex::new(&pattern).unwrap())
  .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(String);

impl VideoId {
  pub fn parse(input: &str) -> Result<Self> {
    let input = input.trim();

    VIDEO_ID_PATTERNS
      .iter()
      .find_map(|re| re.captures(input))
      .map(|caps| VideoId(caps[1].to_string()))
      .ok_or_else(|| {
        Error::InvalidInput(format!("not a youtube url or video id: {input}"))
      })
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn watch_url(&self) -> String {
    format!("https://www.youtube.com/watch?v={}", self.0)
  }
}

impl fmt::Display for VideoId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_accepted_shapes() {
    let inputs = [
      "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
      "https://youtube.com/watch?v=dQw4w9WgXcQ&t=42s",
      "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
      "http://m.youtube.com/watch?v=dQw4w9WgXcQ",
      "https://music.youtube.com/watch?v=dQw4w9WgXcQ&list=RDdQw4w9WgXcQ",
      "youtube.com/watch?v=dQw4w9WgXcQ",
      "https://youtu.be/dQw4w9WgXcQ",
      "https://youtu.be/dQw4w9WgXcQ?si=abcdef",
      "https://www.youtube.com/embed/dQw4w9WgXcQ",
      "https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ?rel=0",
      "https://www.youtube.com/shorts/dQw4w9WgXcQ",
      "https://www.youtube.com/live/dQw4w9WgXcQ",
      "https://www.youtube.com/v/dQw4w9WgXcQ",
      "dQw4w9WgXcQ",
      "  dQw4w9WgXcQ\n",
    ];

    for input in inputs {
      let id = VideoId::parse(input).unwrap_or_else(|_| panic!("{input}"));
      assert_eq!(id.as_str(), "dQw4w9WgXcQ", "{input}");
    }
  }

  #[test]
  fn test_rejected_inputs() {
    let inputs = [
      "not-a-url",
      "",
      "https://example.com/watch?v=dQw4w9WgXcQ",
      "https://www.youtube.com/watch",
      "https://youtu.be/short",
      "dQw4w9WgXcQX",
      "dQw4w9WgXcQ and junk",
      "hello_world!!",
      "dQw4w9WgXcQ/../x",
      "https://www.youtube.com/channel/UC1yNl2E66ZzKApQdRuTQ4tw",
    ];

    for input in inputs {
      let err = VideoId::parse(input).unwrap_err();
      assert!(matches!(err, Error::InvalidInput(_)), "{input}");
    }
  }

  #[test]
  fn test_watch_url() {
    let id = VideoId::parse("https://youtu.be/dQw4w9WgXcQ").unwrap();
    assert_eq!(id.watch_url(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    assert_eq!(id.to_string(), "dQw4w9WgXcQ");
  }
}
