//! 🔌 Backends: where the real I/O happens.
//!
//! 🪣 One trait, three verbs: list the keys, get a key, put a file.
//! Everything above this module talks to `StoreBackend` and never learns
//! whether the bytes came from us-east-1 or from a `HashMap` in a test.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (`S3ObjectStore`, `InMemoryObjectStore`) → `StoreBackend` enum
//! - `get` hands back a streaming [`ObjectBody`]; nobody reads a whole object into memory here
//! - `put` streams a local file and carries the base64 `Content-MD5` along
//! - Retries are NOT a backend concern. The fetcher owns them. 🦆

use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::errors::StoreError;

pub(crate) mod s3;
#[cfg(test)]
pub(crate) mod in_mem;

pub use s3::{S3ObjectStore, S3StoreConfig};
#[cfg(test)]
pub(crate) use in_mem::InMemoryObjectStore;

/// 🌊 A streamed object body. Boxed because the SDK's reader type is unnameable
/// and the in-memory one is a `Cursor`. Dropping it closes the stream.
pub type ObjectBody = Box<dyn AsyncRead + Send + Unpin>;

/// 🪣 The object store gateway.
///
/// # Contract 📜
/// - `list` exhausts every page before returning. Partial listings are not a thing.
/// - `get` fails with [`StoreError::NotFound`] when the key does not exist, so callers
///   can tell "gone" apart from "broken".
/// - `put` uploads `local_path` under `key`, asking the store to verify `content_md5`.
#[async_trait]
pub trait ObjectStore: std::fmt::Debug + Send + Sync {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
    async fn get(&self, key: &str) -> Result<ObjectBody, StoreError>;
    async fn put(&self, key: &str, local_path: &Path, content_md5: &str) -> Result<(), StoreError>;
}

/// 🎭 The many faces of a store. Production gets S3, tests get the in-memory one.
#[derive(Debug)]
pub(crate) enum StoreBackend {
    S3(S3ObjectStore),
    #[cfg(test)]
    InMemory(InMemoryObjectStore),
}

#[async_trait]
impl ObjectStore for StoreBackend {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        match self {
            StoreBackend::S3(store) => store.list(prefix).await,
            #[cfg(test)]
            StoreBackend::InMemory(store) => store.list(prefix).await,
        }
    }

    async fn get(&self, key: &str) -> Result<ObjectBody, StoreError> {
        match self {
            StoreBackend::S3(store) => store.get(key).await,
            #[cfg(test)]
            StoreBackend::InMemory(store) => store.get(key).await,
        }
    }

    async fn put(&self, key: &str, local_path: &Path, content_md5: &str) -> Result<(), StoreError> {
        match self {
            StoreBackend::S3(store) => store.put(key, local_path, content_md5).await,
            #[cfg(test)]
            StoreBackend::InMemory(store) => store.put(key, local_path, content_md5).await,
        }
    }
}
