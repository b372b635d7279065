//! Content-addressed, single-process disk persistence for bitmaps.
//!
//! Generic over the three pluggables ([`Identifier`], [`PathLayout`],
//! [`Codec`]); writes are atomic (write-to-temp-then-rename), grounded on
//! the write-then-rename pattern used for cache files elsewhere in this
//! corpus.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::bitmap::Bitmap;
use crate::codec::Codec;
use crate::error::{DownloaderError, DownloaderResult};
use crate::identifier::Identifier;
use crate::path_layout::PathLayout;

pub struct DiskStore {
    root: PathBuf,
    identifier: Arc<dyn Identifier>,
    path_layout: Arc<dyn PathLayout>,
    codec: Arc<dyn Codec>,
}

impl DiskStore {
    pub fn new(
        root: impl Into<PathBuf>,
        identifier: Arc<dyn Identifier>,
        path_layout: Arc<dyn PathLayout>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            root: root.into(),
            identifier,
            path_layout,
            codec,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve_path(&self, url: &str) -> PathBuf {
        let fingerprint = self.identifier.identifier(url);
        let relative = self
            .path_layout
            .path(url, &fingerprint, self.codec.file_extension());
        self.root.join(relative)
    }

    pub async fn has(&self, url: &str) -> bool {
        let path = self.resolve_path(url);
        tokio::fs::metadata(path).await.is_ok()
    }

    pub async fn read(&self, url: &str) -> DownloaderResult<Option<Bitmap>> {
        let path = self.resolve_path(url);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(DownloaderError::Io {
                path: path.display().to_string(),
                message: source.to_string(),
            }),
        }
    }

    /// Writes atomically via a sibling temp file followed by rename, so
    /// concurrent writers for the same URL never interleave bytes -- the
    /// last completed rename wins.
    pub async fn write(&self, url: &str, bitmap: &Bitmap) -> DownloaderResult<()> {
        let path = self.resolve_path(url);
        let bytes = self.codec.encode(bitmap)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DownloaderError::Io {
                    path: parent.display().to_string(),
                    message: source.to_string(),
                })?;
        }
        // Per-call unique suffix, not just the pid: two concurrent writers for
        // the same URL in this process must not share a temp path, or one
        // writer's rename can steal the other's in-flight temp file.
        let tmp_path = path.with_extension(format!("{}.{}.tmp", std::process::id(), Uuid::new_v4()));
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|source| DownloaderError::Io {
                path: tmp_path.display().to_string(),
                message: source.to_string(),
            })?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|source| DownloaderError::Io {
                path: path.display().to_string(),
                message: source.to_string(),
            })?;
        debug!(url, path = %path.display(), "wrote bitmap to disk store");
        Ok(())
    }

    pub async fn remove(&self, url: &str) -> DownloaderResult<()> {
        let path = self.resolve_path(url);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(DownloaderError::Io {
                path: path.display().to_string(),
                message: source.to_string(),
            }),
        }
    }

    pub async fn clear_all(&self) -> DownloaderResult<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => {
                warn!(root = %self.root.display(), error = %source, "failed to clear disk store");
                Err(DownloaderError::Io {
                    path: self.root.display().to_string(),
                    message: source.to_string(),
                })
            }
        }
    }

    /// Total bytes of all regular files under the root. Walked
    /// synchronously on a blocking thread since `walkdir` has no async
    /// counterpart.
    pub async fn size_bytes(&self) -> u64 {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            WalkDir::new(&root)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| e.metadata().ok())
                .map(|m| m.len())
                .sum()
        })
        .await
        .unwrap_or(0)
    }

    pub async fn file_count(&self) -> u64 {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            WalkDir::new(&root)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .count() as u64
        })
        .await
        .unwrap_or(0)
    }
}
