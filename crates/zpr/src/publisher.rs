//! 📤 The Publisher: takes a finished archive off the local disk and puts it in the bucket.
//!
//! 🎬 *[the zip file is done. it is 2.3 GiB. it has never seen the cloud.]*
//!
//! Before the upload the whole file is read once to compute its MD5, which rides along
//! as `Content-MD5` so the store can refuse a transfer that got mangled on the way.
//! The local temp file is removed afterwards no matter how the upload went.
//! Nothing here retries. A failed publish is a failed job.

use std::io;
use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};
use tempfile::TempPath;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::backends::{ObjectStore, StoreBackend};
use crate::errors::{ArchiveError, StoreError};

// -- 📏 read buffer for hashing; big enough to keep the disk busy, small enough to not care
const HASH_CHUNK_BYTES: usize = 256 * 1024;

/// ✅ Receipt for an archive that made it into the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArchive {
    pub remote_key: String,
    pub size_bytes: u64,
    /// base64 of the raw 16-byte digest, exactly what went into the header
    pub content_md5: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Publisher {
    store: Arc<StoreBackend>,
    archives_folder: String,
}

impl Publisher {
    pub(crate) fn new(store: Arc<StoreBackend>, archives_folder: impl Into<String>) -> Self {
        Self {
            store,
            archives_folder: archives_folder.into(),
        }
    }

    /// 🗂️ `<archives_folder>/<archive_name>`, or just the name when the folder is empty.
    pub(crate) fn remote_key(&self, archive_name: &str) -> String {
        let the_folder = self.archives_folder.trim_end_matches('/');
        if the_folder.is_empty() {
            archive_name.to_string()
        } else {
            format!("{the_folder}/{archive_name}")
        }
    }

    /// 🚀 Upload `local` as `archive_name`, then delete `local`. Both halves always run.
    pub(crate) async fn publish(
        &self,
        local: TempPath,
        archive_name: &str,
    ) -> Result<PublishedArchive, ArchiveError> {
        let remote_key = self.remote_key(archive_name);
        let the_upload = self.upload(&local, &remote_key).await;

        let the_local_path = local.to_path_buf();
        if let Err(e) = local.close() {
            warn!("🧹 could not remove temp file {}: {}", the_local_path.display(), e);
        }

        the_upload.map_err(|source| ArchiveError::PublishFailure {
            archive: archive_name.to_string(),
            remote_key,
            source,
        })
    }

    async fn upload(&self, local: &Path, remote_key: &str) -> Result<PublishedArchive, StoreError> {
        let (content_md5, size_bytes) =
            file_md5(local).await.map_err(|source| StoreError::LocalIo {
                path: local.to_path_buf(),
                source,
            })?;

        info!("📤 uploading {} ({} bytes, md5 {})", remote_key, size_bytes, content_md5);
        self.store.put(remote_key, local, &content_md5).await?;
        info!("✅ uploaded {}", remote_key);

        Ok(PublishedArchive {
            remote_key: remote_key.to_string(),
            size_bytes,
            content_md5,
        })
    }
}

/// 🔒 Base64 MD5 of a byte slice, the `Content-MD5` way.
pub fn md5_base64(bytes: &[u8]) -> String {
    STANDARD.encode(Md5::digest(bytes))
}

/// 🔒 Stream a file through MD5. Returns the base64 digest and the byte count.
pub async fn file_md5(path: &Path) -> io::Result<(String, u64)> {
    let mut the_file = tokio::fs::File::open(path).await?;
    let mut the_hasher = Md5::new();
    let mut the_buffer = vec![0u8; HASH_CHUNK_BYTES];
    let mut the_total: u64 = 0;
    loop {
        let n = the_file.read(&mut the_buffer).await?;
        if n == 0 {
            break;
        }
        the_hasher.update(&the_buffer[..n]);
        the_total += n as u64;
    }
    Ok((STANDARD.encode(the_hasher.finalize()), the_total))
}
