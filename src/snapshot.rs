// src/snapshot.rs
//! One snapshot file and one raw content file per target, named from the
//! target name. Writes go through a temp file + rename so a crash never
//! leaves a half-written snapshot behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{MonitorError, Result};
use crate::extract::PageDigest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub target: String,
    pub url: String,
    pub content_hash: String,
    pub digest: PageDigest,
    pub checked_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(target: &str, url: &str, digest: PageDigest, now: DateTime<Utc>) -> Self {
        Self {
            target: target.to_string(),
            url: url.to_string(),
            content_hash: digest.content_hash(),
            digest,
            checked_at: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self, target: &str) -> PathBuf {
        self.dir.join(format!("page_snapshot_{}.json", file_stem(target)))
    }

    pub fn content_path(&self, target: &str) -> PathBuf {
        self.dir.join(format!("page_content_{}.html", file_stem(target)))
    }

    /// Previous snapshot for `target`. A missing or corrupt file reads as `None`.
    pub async fn load(&self, target: &str) -> Result<Option<Snapshot>> {
        let path = self.snapshot_path(target);
        let raw = match fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MonitorError::storage(path, e)),
        };
        match serde_json::from_str::<Snapshot>(&raw) {
            Ok(s) => Ok(Some(s)),
            Err(e) => {
                tracing::warn!(
                    target_name = target,
                    path = %path.display(),
                    error = %e,
                    "corrupt snapshot, treating as first observation"
                );
                Ok(None)
            }
        }
    }

    /// Persist raw content then the snapshot, each atomically.
    pub async fn save(&self, snapshot: &Snapshot, raw_content: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| MonitorError::storage(&self.dir, e))?;

        write_atomic(&self.content_path(&snapshot.target), raw_content.as_bytes()).await?;

        let json = serde_json::to_vec_pretty(snapshot).map_err(|e| {
            MonitorError::storage(
                self.snapshot_path(&snapshot.target),
                std::io::Error::new(ErrorKind::InvalidData, e),
            )
        })?;
        write_atomic(&self.snapshot_path(&snapshot.target), &json).await
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp, bytes)
        .await
        .map_err(|e| MonitorError::storage(&tmp, e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| MonitorError::storage(path, e))
}

/// Deterministic file-name fragment: anything outside `[A-Za-z0-9_-]` becomes `_`.
pub fn file_stem(target: &str) -> String {
    let stem: String = target
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "unnamed".to_string()
    } else {
        stem
    }
}
