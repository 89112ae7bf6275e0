//! Object storage access for tiles, manifests and chunks.
//!
//! Both the source tile set and the destination volume live behind the
//! [`ObjectStore`] trait, so a run can read from a local directory and write
//! to S3, or any other combination.

mod local_store;
mod location;
mod s3_store;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::IoError;

pub use local_store::LocalStore;
pub use location::Location;
pub use s3_store::{create_s3_client, S3Settings, S3Store};

/// A listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRef {
    /// Key relative to the store root, always `/`-separated
    pub key: String,
    /// Final path component of the key
    pub name: String,
}

impl TileRef {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let name = key.rsplit('/').next().unwrap_or(&key).to_string();
        Self { key, name }
    }
}

/// Lazily produced listing. Errors are yielded in place of the entries that
/// could not be listed; the stream keeps going where the backend allows it.
pub type ObjectStream = BoxStream<'static, Result<TileRef, IoError>>;

/// Key/value access to a storage root.
///
/// Keys are relative to the root the store was opened on and use `/` as the
/// separator on every backend. Implementations must be thread-safe; one store
/// is shared by all ingestion workers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream every object under the directory `prefix` (empty for the whole
    /// root), in a stable, deterministic order, skipping the first `start_at`.
    ///
    /// The same contents always list in the same order, so `start_at` can be
    /// used to resume an interrupted run.
    fn list(&self, prefix: &str, start_at: usize) -> ObjectStream;

    /// Read a whole object.
    async fn get(&self, key: &str) -> Result<Bytes, IoError>;

    /// Write a whole object, replacing any previous content.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), IoError>;

    /// Human-readable location of a key (for logging).
    fn identifier(&self, key: &str) -> String;
}

/// Open the store rooted at `location`.
pub async fn open_store(location: &Location, settings: &S3Settings) -> Arc<dyn ObjectStore> {
    match location {
        Location::Local(path) => Arc::new(LocalStore::new(path.clone())),
        Location::S3 { bucket, prefix } => {
            let client = create_s3_client(settings).await;
            Arc::new(S3Store::new(client, bucket.clone(), prefix.clone()))
        }
    }
}

/// Join a directory prefix and a relative key.
pub(crate) fn join_key(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let key = key.trim_start_matches('/');
    match (prefix.is_empty(), key.is_empty()) {
        (true, _) => key.to_string(),
        (false, true) => format!("{}/", prefix),
        (false, false) => format!("{}/{}", prefix, key),
    }
}
