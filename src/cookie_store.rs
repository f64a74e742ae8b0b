use std::{
  collections::BTreeMap,
  io::Write,
  path::{Path, PathBuf},
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::{Error, Result};

pub const PERMANENT_FILE: &str = "cookies.txt";
pub const TEMPORARY_FILE: &str = "cookies.temp.txt";

const HEADER_MARKERS: &[&str] =
  &["# Netscape HTTP Cookie File", "# HTTP Cookie File"];
const KNOWN_DOMAINS: &[&str] = &["youtube.com", "google.com"];
const MIN_FIELDS: usize = 7;
// curl and browser exports mark http-only cookies this way
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
  Temporary,
  Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
  pub temporary: bool,
  pub permanent: bool,
}

impl Scope {
  pub const TEMPORARY: Scope = Scope {
    temporary: true,
    permanent: false,
  };
  pub const PERMANENT: Scope = Scope {
    temporary: false,
    permanent: true,
  };
  pub const BOTH: Scope = Scope {
    temporary: true,
    permanent: true,
  };

  fn slots(self) -> Vec<Slot> {
    let mut slots = Vec::new();
    if self.temporary {
      slots.push(Slot::Temporary);
    }
    if self.permanent {
      slots.push(Slot::Permanent);
    }
    slots
  }
}

/// Fields of every cookie line. Comments and blank lines are skipped.
fn cookie_lines(text: &str) -> impl Iterator<Item = Vec<&str>> {
  text
    .lines()
    .map(|line| line.strip_prefix(HTTP_ONLY_PREFIX).unwrap_or(line))
    .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
    .map(|line| line.split('\t').collect::<Vec<_>>())
    .filter(|fields| fields.len() >= MIN_FIELDS)
}

/// Structural heuristic for Netscape cookie files, not a parser.
pub fn validate_content(text: &str) -> bool {
  HEADER_MARKERS.iter().any(|marker| text.contains(marker))
    || KNOWN_DOMAINS.iter().any(|domain| text.contains(domain))
    || cookie_lines(text).next().is_some()
}

pub async fn validate(path: &Path) -> bool {
  match tokio::fs::read(path).await {
    Ok(data) => validate_content(&String::from_utf8_lossy(&data)),
    Err(_) => false,
  }
}

#[derive(Debug, Serialize)]
pub struct CookieInfo {
  pub active: Option<Slot>,
  pub temporary: SlotInfo,
  pub permanent: SlotInfo,
}

#[derive(Debug, Serialize)]
pub struct SlotInfo {
  pub path: String,
  pub exists: bool,
  pub valid: bool,
  pub size: Option<u64>,
  pub modified: Option<DateTime<Utc>>,
  pub cookie_count: usize,
  pub domains: BTreeMap<String, usize>,
}

pub struct CookieStore {
  dir: PathBuf,
}

impl CookieStore {
  pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
    std::fs::create_dir_all(&dir)?;
    Ok(Self {
      dir: dir.as_ref().to_owned(),
    })
  }

  pub fn path(&self, slot: Slot) -> PathBuf {
    match slot {
      Slot::Temporary => self.dir.join(TEMPORARY_FILE),
      Slot::Permanent => self.dir.join(PERMANENT_FILE),
    }
  }

  /// The cookie file requests should use: a valid temporary file, else a
  /// valid permanent one.
  pub async fn effective(&self) -> Option<(Slot, PathBuf)> {
    for slot in [Slot::Temporary, Slot::Permanent] {
      let path = self.path(slot);
      if validate(&path).await {
        return Some((slot, path));
      }
    }
    None
  }

  pub async fn effective_path(&self) -> Option<PathBuf> {
    self.effective().await.map(|(_, path)| path)
  }

  /// Store `data` into the slots of `scope`. Existing files are only
  /// replaced once the upload validated, and each replacement is a rename.
  ///
  /// Every slot is staged before the first rename, so a write failure leaves
  /// all slots untouched. A failing second rename leaves the first slot
  /// replaced.
  pub async fn upload(&self, data: Bytes, scope: Scope) -> Result<Vec<Slot>> {
    let slots = scope.slots();
    if slots.is_empty() {
      return Err(Error::InvalidInput("no cookie slot selected".into()));
    }

    if !validate_content(&String::from_utf8_lossy(&data)) {
      return Err(Error::InvalidFormat(
        "expected a Netscape format cookies.txt export".into(),
      ));
    }

    let dir = self.dir.clone();
    let targets: Vec<_> =
      slots.iter().map(|&slot| (slot, self.path(slot))).collect();
    let size = data.len();

    tokio::task::spawn_blocking(move || -> Result<()> {
      let mut staged = Vec::with_capacity(targets.len());
      for (slot, target) in targets {
        let mut file = NamedTempFile::new_in(&dir)?;
        file.write_all(&data)?;
        file.as_file().sync_all()?;
        staged.push((slot, target, file));
      }

      for (slot, target, file) in staged {
        file.persist(target).map_err(|e| Error::Io(e.error))?;
        info!("stored {size} bytes of cookies in {slot:?} slot");
      }
      Ok(())
    })
    .await
    .map_err(std::io::Error::from)??;

    Ok(slots)
  }

  /// Delete the slots of `scope`, returning those that existed.
  pub async fn clear(&self, scope: Scope) -> Result<Vec<Slot>> {
    let mut removed = Vec::new();
    for slot in scope.slots() {
      match tokio::fs::remove_file(self.path(slot)).await {
        Ok(()) => removed.push(slot),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
      }
    }
    Ok(removed)
  }

  pub async fn info(&self) -> Result<CookieInfo> {
    Ok(CookieInfo {
      active: self.effective().await.map(|(slot, _)| slot),
      temporary: self.slot_info(Slot::Temporary).await?,
      permanent: self.slot_info(Slot::Permanent).await?,
    })
  }

  async fn slot_info(&self, slot: Slot) -> Result<SlotInfo> {
    let path = self.path(slot);
    let mut info = SlotInfo {
      path: path.display().to_string(),
      exists: false,
      valid: false,
      size: None,
      modified: None,
      cookie_count: 0,
      domains: BTreeMap::new(),
    };

    let metadata = match tokio::fs::metadata(&path).await {
      Ok(metadata) => metadata,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(info),
      Err(e) => return Err(e.into()),
    };

    info.exists = true;
    info.size = Some(metadata.len());
    info.modified = metadata.modified().ok().map(DateTime::<Utc>::from);

    let text = String::from_utf8_lossy(&tokio::fs::read(&path).await?)
      .into_owned();
    info.valid = validate_content(&text);
    for fields in cookie_lines(&text) {
      let domain = fields[0].trim().trim_start_matches('.').to_string();
      *info.domains.entry(domain).or_default() += 1;
      info.cookie_count += 1;
    }

    if !info.valid {
      warn!("{} does not look like a cookie file", info.path);
    }

    Ok(info)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const COOKIES: &str = "# Netscape HTTP Cookie File\n\
    # This is a generated file! Do not edit.\n\
    \n\
    .youtube.com\tTRUE\t/\tTRUE\t1767225600\tPREF\tf6=40000000\n\
    #HttpOnly_.youtube.com\tTRUE\t/\tTRUE\t1767225600\tLOGIN_INFO\tabc\n\
    .google.com\tTRUE\t/\tTRUE\t1767225600\tSID\txyz\n";

  fn store() -> (tempfile::TempDir, CookieStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = CookieStore::new(dir.path()).unwrap();
    (dir, store)
  }

  #[test]
  fn test_validate_content() {
    assert!(validate_content(COOKIES));
    assert!(validate_content("# HTTP Cookie File\n"));
    assert!(validate_content("some text mentioning youtube.com"));
    assert!(validate_content("example.org\tTRUE\t/\tFALSE\t0\tname\tvalue"));

    assert!(!validate_content(""));
    assert!(!validate_content("hello world"));
    assert!(!validate_content("# example.org\tTRUE\t/\tFALSE\t0\tname\tv"));
    assert!(!validate_content("example.org\tTRUE\t/\tFALSE\t0\tname"));
  }

  #[tokio::test]
  async fn test_effective_path_prefers_temporary() {
    let (_dir, store) = store();
    assert_eq!(store.effective_path().await, None);

    std::fs::write(store.path(Slot::Permanent), COOKIES).unwrap();
    assert_eq!(
      store.effective_path().await,
      Some(store.path(Slot::Permanent))
    );

    std::fs::write(store.path(Slot::Temporary), COOKIES).unwrap();
    assert_eq!(
      store.effective_path().await,
      Some(store.path(Slot::Temporary))
    );
  }

  #[tokio::test]
  async fn test_effective_path_skips_invalid_files() {
    let (_dir, store) = store();
    std::fs::write(store.path(Slot::Temporary), "garbage").unwrap();
    assert_eq!(store.effective_path().await, None);

    std::fs::write(store.path(Slot::Permanent), COOKIES).unwrap();
    assert_eq!(
      store.effective().await,
      Some((Slot::Permanent, store.path(Slot::Permanent)))
    );
  }

  #[tokio::test]
  async fn test_invalid_upload_leaves_files_untouched() {
    let (dir, store) = store();
    let permanent = format!("{COOKIES}# permanent\n");
    let temporary = format!("{COOKIES}# temporary\n");
    std::fs::write(store.path(Slot::Permanent), &permanent).unwrap();
    std::fs::write(store.path(Slot::Temporary), &temporary).unwrap();

    let err = store
      .upload(Bytes::from_static(b"not cookies at all"), Scope::BOTH)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)));

    assert_eq!(
      std::fs::read_to_string(store.path(Slot::Permanent)).unwrap(),
      permanent
    );
    assert_eq!(
      std::fs::read_to_string(store.path(Slot::Temporary)).unwrap(),
      temporary
    );
    // nothing was staged
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
  }

  #[tokio::test]
  async fn test_upload_leaves_only_slot_files() {
    let (dir, store) = store();

    store
      .upload(Bytes::from_static(COOKIES.as_bytes()), Scope::BOTH)
      .await
      .unwrap();

    let mut names: Vec<_> = std::fs::read_dir(dir.path())
      .unwrap()
      .map(|entry| entry.unwrap().file_name().into_string().unwrap())
      .collect();
    names.sort();
    assert_eq!(names, vec![TEMPORARY_FILE, PERMANENT_FILE]);

    let err = store
      .upload(Bytes::from_static(&[0xff, 0xfe, 0x00]), Scope::TEMPORARY)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)));
    assert_eq!(
      std::fs::read_to_string(store.path(Slot::Temporary)).unwrap(),
      COOKIES
    );
  }

  #[tokio::test]
  async fn test_upload_scopes() {
    let (_dir, store) = store();

    let slots = store
      .upload(Bytes::from_static(COOKIES.as_bytes()), Scope::PERMANENT)
      .await
      .unwrap();
    assert_eq!(slots, vec![Slot::Permanent]);
    assert!(store.path(Slot::Permanent).exists());
    assert!(!store.path(Slot::Temporary).exists());

    let slots = store
      .upload(Bytes::from_static(COOKIES.as_bytes()), Scope::BOTH)
      .await
      .unwrap();
    assert_eq!(slots, vec![Slot::Temporary, Slot::Permanent]);
    assert_eq!(
      std::fs::read_to_string(store.path(Slot::Temporary)).unwrap(),
      COOKIES
    );

    let empty = Scope {
      temporary: false,
      permanent: false,
    };
    let err = store
      .upload(Bytes::from_static(COOKIES.as_bytes()), empty)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
  }

  #[tokio::test]
  async fn test_clear_is_idempotent() {
    let (_dir, store) = store();
    std::fs::write(store.path(Slot::Temporary), COOKIES).unwrap();
    std::fs::write(store.path(Slot::Permanent), COOKIES).unwrap();

    let removed = store.clear(Scope::TEMPORARY).await.unwrap();
    assert_eq!(removed, vec![Slot::Temporary]);
    assert!(store.path(Slot::Permanent).exists());

    let removed = store.clear(Scope::BOTH).await.unwrap();
    assert_eq!(removed, vec![Slot::Permanent]);

    let removed = store.clear(Scope::BOTH).await.unwrap();
    assert!(removed.is_empty());
  }

  #[tokio::test]
  async fn test_info() {
    let (_dir, store) = store();
    std::fs::write(store.path(Slot::Permanent), COOKIES).unwrap();

    let info = store.info().await.unwrap();
    assert_eq!(info.active, Some(Slot::Permanent));
    assert!(!info.temporary.exists);
    assert_eq!(info.temporary.size, None);

    let permanent = &info.permanent;
    assert!(permanent.exists && permanent.valid);
    assert_eq!(permanent.size, Some(COOKIES.len() as u64));
    assert!(permanent.modified.is_some());
    assert_eq!(permanent.cookie_count, 3);
    assert_eq!(permanent.domains["youtube.com"], 2);
    assert_eq!(permanent.domains["google.com"], 1);
  }
}
