use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use walkdir::WalkDir;

use super::{ObjectStore, ObjectStream, TileRef};
use crate::error::IoError;

/// Entries buffered between the directory walker and the consumer.
const LISTING_CHANNEL_CAPACITY: usize = 1024;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// [`ObjectStore`] over a local directory.
///
/// Keys map to paths below the root. Writes go to a temporary sibling file
/// which is then renamed into place, so readers never observe a partial chunk.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

fn fs_error(path: &Path, err: std::io::Error) -> IoError {
    if err.kind() == ErrorKind::NotFound {
        IoError::NotFound(path.display().to_string())
    } else {
        IoError::Filesystem {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// `/`-joined path of `path` relative to `root`.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Walk `base` in file-name order, sending every file with an extension.
///
/// Runs on a blocking thread. Stops early once the receiver is dropped.
fn walk(root: &Path, base: &Path, tx: &mpsc::Sender<Result<TileRef, IoError>>) {
    for entry in WalkDir::new(base).sort_by_file_name() {
        let item = match entry {
            Ok(entry) => {
                if entry.file_type().is_dir() || entry.path().extension().is_none() {
                    continue;
                }
                match relative_key(root, entry.path()) {
                    Some(key) => Ok(TileRef::new(key)),
                    None => continue,
                }
            }
            Err(err) => {
                let path = err.path().unwrap_or(base).to_path_buf();
                Err(match err.into_io_error() {
                    Some(io) => fs_error(&path, io),
                    None => IoError::Filesystem {
                        path: path.display().to_string(),
                        message: "filesystem loop".to_string(),
                    },
                })
            }
        };

        if tx.blocking_send(item).is_err() {
            return;
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn list(&self, prefix: &str, start_at: usize) -> ObjectStream {
        let root = self.root.clone();
        let base = self.path_for(prefix);

        // The walker is only spawned once the stream is first polled.
        stream::once(async move {
            let (tx, rx) = mpsc::channel(LISTING_CHANNEL_CAPACITY);
            tokio::task::spawn_blocking(move || walk(&root, &base, &tx));
            stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
        })
        .flatten()
        .skip(start_at)
        .boxed()
    }

    async fn get(&self, key: &str) -> Result<Bytes, IoError> {
        let path = self.path_for(key);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| fs_error(&path, e))?;
        Ok(Bytes::from(data))
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), IoError> {
        let path = self.path_for(key);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| IoError::Filesystem {
                path: path.display().to_string(),
                message: "key has no file name".to_string(),
            })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| fs_error(parent, e))?;
        }

        let temp = path.with_file_name(format!(
            ".{}.{}-{}.partial",
            file_name,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&temp, &data)
            .await
            .map_err(|e| fs_error(&temp, e))?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(fs_error(&path, e));
        }
        Ok(())
    }

    fn identifier(&self, key: &str) -> String {
        format!("file://{}", self.path_for(key).display())
    }
}
