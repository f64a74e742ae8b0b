use std::cmp::Ordering;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

const VIDEO_HEIGHTS: &[u32] = &[144, 240, 360, 480, 720, 1080, 1440, 2160];

// looser selectors tried after the requested one fails
const AUDIO_FALLBACKS: &[&str] = &["bestaudio", "140/251/250", "best"];
const VIDEO_FALLBACKS: &[&str] = &["best"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
  Audio,
  Video,
}

/// Translate an audio quality label into a yt-dlp format selector.
///
/// Unknown labels select `bestaudio` instead of being rejected.
pub fn audio_selector(quality: &str) -> String {
  match quality.trim().to_ascii_lowercase().as_str() {
    "high" => "bestaudio[abr>=160]".to_string(),
    "medium" => "worstaudio[abr>=128]".to_string(),
    "low" => "worstaudio[abr>=64]".to_string(),
    _ => "bestaudio".to_string(),
  }
}

/// Translate a video quality label (`best`, `worst`, `720p`, ...) into a
/// yt-dlp format selector.
///
/// Unknown labels select `best` instead of being rejected.
pub fn video_selector(quality: &str) -> String {
  let quality = quality.trim().to_ascii_lowercase();
  if quality == "worst" {
    return "worst".to_string();
  }

  quality
    .strip_suffix('p')
    .and_then(|height| height.parse::<u32>().ok())
    .filter(|height| VIDEO_HEIGHTS.contains(height))
    .map(|height| format!("best[height<={height}]"))
    .unwrap_or_else(|| "best".to_string())
}

pub fn selector(kind: MediaKind, quality: &str) -> String {
  match kind {
    MediaKind::Audio => audio_selector(quality),
    MediaKind::Video => video_selector(quality),
  }
}

/// Selectors to try in order. Without fallback only the primary one.
pub fn selector_chain(
  kind: MediaKind,
  primary: String,
  fallback: bool,
) -> Vec<String> {
  if !fallback {
    return vec![primary];
  }

  let fallbacks = match kind {
    MediaKind::Audio => AUDIO_FALLBACKS,
    MediaKind::Video => VIDEO_FALLBACKS,
  };

  std::iter::once(primary)
    .chain(fallbacks.iter().map(|s| s.to_string()))
    .unique()
    .collect()
}

/// One entry of the `formats` array in yt-dlp's `--dump-json` output.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFormat {
  pub format_id: Option<String>,
  pub format_note: Option<String>,
  pub ext: Option<String>,
  pub url: Option<String>,
  pub protocol: Option<String>,
  pub width: Option<u32>,
  pub height: Option<u32>,
  pub fps: Option<f64>,
  pub vcodec: Option<String>,
  pub acodec: Option<String>,
  pub tbr: Option<f64>,
  pub abr: Option<f64>,
  pub vbr: Option<f64>,
  pub filesize: Option<f64>,
  pub filesize_approx: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatDescriptor {
  pub format_id: String,
  pub ext: Option<String>,
  pub format_note: Option<String>,
  pub width: Option<u32>,
  pub height: Option<u32>,
  pub fps: Option<f64>,
  pub vcodec: Option<String>,
  pub acodec: Option<String>,
  /// kbps
  pub bitrate: Option<f64>,
  pub filesize: Option<u64>,
  pub protocol: Option<String>,
  pub url: String,
  pub has_audio: bool,
  pub has_video: bool,
  pub is_direct: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatFilter {
  #[default]
  All,
  Audio,
  Video,
  Combined,
}

fn codec_present(codec: &Option<String>) -> bool {
  codec
    .as_deref()
    .map_or(false, |c| !c.is_empty() && c != "none")
}

impl RawFormat {
  /// `None` when yt-dlp did not resolve a url for this format.
  pub fn into_descriptor(self) -> Option<FormatDescriptor> {
    let url = self.url.filter(|url| !url.is_empty())?;

    let has_audio = codec_present(&self.acodec);
    let has_video = codec_present(&self.vcodec);
    let bitrate = self.tbr.or(match (self.vbr, self.abr) {
      (None, None) => None,
      (vbr, abr) => Some(vbr.unwrap_or(0.0) + abr.unwrap_or(0.0)),
    });
    let is_direct = matches!(self.protocol.as_deref(), Some("http" | "https"))
      && !url.contains("manifest");

    Some(FormatDescriptor {
      format_id: self.format_id.unwrap_or_default(),
      ext: self.ext,
      format_note: self.format_note,
      width: self.width,
      height: self.height,
      fps: self.fps,
      vcodec: self.vcodec,
      acodec: self.acodec,
      bitrate,
      filesize: self.filesize.or(self.filesize_approx).map(|s| s as u64),
      protocol: self.protocol,
      url,
      has_audio,
      has_video,
      is_direct,
    })
  }
}

impl FormatDescriptor {
  fn is_combined(&self) -> bool {
    self.has_audio && self.has_video
  }

  fn matches(&self, filter: FormatFilter) -> bool {
    match filter {
      FormatFilter::All => true,
      FormatFilter::Audio => self.has_audio && !self.has_video,
      FormatFilter::Video => self.has_video && !self.has_audio,
      FormatFilter::Combined => self.is_combined(),
    }
  }

  /// Descending by (audio+video, height, width, fps, bitrate).
  pub fn rank(a: &Self, b: &Self) -> Ordering {
    let f = |v: Option<f64>| v.unwrap_or(0.0);

    b.is_combined()
      .cmp(&a.is_combined())
      .then_with(|| b.height.unwrap_or(0).cmp(&a.height.unwrap_or(0)))
      .then_with(|| b.width.unwrap_or(0).cmp(&a.width.unwrap_or(0)))
      .then_with(|| f(b.fps).total_cmp(&f(a.fps)))
      .then_with(|| f(b.bitrate).total_cmp(&f(a.bitrate)))
  }
}

/// Drop formats without a url, filter, sort best-first and truncate.
pub fn list_formats(
  formats: Vec<RawFormat>,
  filter: FormatFilter,
  max_results: usize,
) -> Vec<FormatDescriptor> {
  formats
    .into_iter()
    .filter_map(RawFormat::into_descriptor)
    .filter(|f| f.matches(filter))
    // sorted_by is stable, ties keep yt-dlp's order
    .sorted_by(FormatDescriptor::rank)
    .take(max_results)
    .collect()
}
