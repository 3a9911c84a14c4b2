//! On-disk image store.
//!
//! Every relayed image can be persisted once under a path derived from the
//! request alone. The file's existence is the only state: there is no index
//! and nothing is ever evicted. Writes go to a private `.part` file that is
//! renamed into place only after the whole upstream body arrived, so readers
//! never observe a truncated image and concurrent writers cannot interleave.

use crate::path::ImageRequest;
use axum::body::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Counter making temporary file names unique within the process.
static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Message from the relay to the writer task.
#[derive(Debug)]
enum Chunk {
    Data(Bytes),
    End,
}

/// Flat directory of relayed images.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic location for a request.
    pub fn path_for(&self, request: &ImageRequest) -> PathBuf {
        self.root.join(request.file_name())
    }

    /// Returns true if the image for `request` is already stored.
    pub async fn contains(&self, request: &ImageRequest) -> bool {
        tokio::fs::try_exists(self.path_for(request))
            .await
            .unwrap_or(false)
    }

    /// Creates the store directory, replacing a plain file squatting on it.
    pub async fn ensure_root(&self) -> io::Result<()> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => return Ok(()),
            Ok(_) => {
                tracing::warn!(path = %self.root.display(), "removing non-directory at store path");
                tokio::fs::remove_file(&self.root).await?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        tokio::fs::create_dir_all(&self.root).await
    }

    /// Removes `.part` files left behind by writers that never finished,
    /// e.g. when a previous process stopped mid-write. Only safe before any
    /// writer of this process has started.
    pub async fn sweep_parts(&self) -> io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_part = path.extension().is_some_and(|ext| ext == "part");
            if is_part && entry.file_type().await?.is_file() {
                tokio::fs::remove_file(&path).await?;
                tracing::debug!(path = %path.display(), "removed stale partial file");
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Starts persisting the image for `request`.
    ///
    /// Returns `None` when the image is already stored. Otherwise a writer task
    /// is spawned; feed it through the returned [`PendingImage`].
    pub async fn begin(&self, request: &ImageRequest) -> Option<PendingImage> {
        if self.contains(request).await {
            tracing::debug!(file = %request.file_name(), "already stored, skipping write");
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.clone();
        let target = self.path_for(request);

        tokio::spawn(async move {
            match store.write(&target, rx).await {
                Ok(true) => tracing::info!(path = %target.display(), "stored image"),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(path = %target.display(), error = %e, "failed to store image")
                }
            }
        });

        Some(PendingImage { tx })
    }

    /// Drains `rx` into a temporary file and renames it to `target`.
    ///
    /// Returns `Ok(false)` if nothing was stored: the stream was abandoned
    /// before completing, or another writer got there first.
    async fn write(&self, target: &Path, rx: mpsc::UnboundedReceiver<Chunk>) -> io::Result<bool> {
        self.ensure_root().await?;

        let part = part_path(target);
        let result = write_part(&part, target, rx).await;
        if !matches!(result, Ok(true)) {
            let _ = tokio::fs::remove_file(&part).await;
        }

        result
    }
}

async fn write_part(
    part: &Path,
    target: &Path,
    mut rx: mpsc::UnboundedReceiver<Chunk>,
) -> io::Result<bool> {
    let mut file = tokio::fs::File::create(part).await?;
    let completed = loop {
        match rx.recv().await {
            Some(Chunk::Data(bytes)) => file.write_all(&bytes).await?,
            Some(Chunk::End) => break true,
            None => break false,
        }
    };
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    if !completed || tokio::fs::try_exists(target).await? {
        return Ok(false);
    }

    tokio::fs::rename(part, target).await?;
    Ok(true)
}

/// Temporary sibling of `target`, unique per writer.
fn part_path(target: &Path) -> PathBuf {
    let n = PART_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}-{}.part", std::process::id(), n));
    target.with_file_name(name)
}

/// Handle feeding one image to its writer task.
///
/// Dropping it without calling [`PendingImage::finish`] discards the
/// partial file.
#[derive(Debug)]
pub struct PendingImage {
    tx: mpsc::UnboundedSender<Chunk>,
}

impl PendingImage {
    /// Forwards a chunk of the image body.
    pub fn push(&self, bytes: Bytes) {
        // A closed channel means the writer failed and already logged why.
        let _ = self.tx.send(Chunk::Data(bytes));
    }

    /// Marks the body complete so the writer moves it into place.
    pub fn finish(self) {
        let _ = self.tx.send(Chunk::End);
    }
}
