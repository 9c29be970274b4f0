//! 💀 Errors: the taxonomy of everything that can go sideways between S3 and a zip file.
//!
//! Two families live here:
//! - [`StoreError`]: what the object store gateway says when it is unhappy.
//! - [`ArchiveError`]: what a job does about it. Some kinds are "log it and move on"
//!   (a weird key, an object that vanished), the rest end the job.
//!
//! 🧠 Knowledge graph:
//! - `partitions` raises `MalformedKey`
//! - `fetcher` raises `ObjectGone` and `FetchExhausted`
//! - `archive_worker` raises `WriteFailure`, `publisher` raises `PublishFailure`
//! - `supervisors` keeps the first fatal one for the whole run 🦆

use std::path::PathBuf;

use thiserror::Error;

/// 📦 Boxed error for whatever the SDK hands us. We keep the chain, we drop the generics.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 🪣 Failures reported by an [`ObjectStore`](crate::backends::ObjectStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is not there (any more). Deleted between listing and fetch, usually.
    #[error("object '{key}' does not exist")]
    NotFound { key: String },

    #[error("bucket '{bucket}' does not exist")]
    NoSuchBucket { bucket: String },

    /// The store computed a different MD5 than the one we promised it.
    #[error("the store rejected the checksum for '{key}'")]
    ChecksumMismatch { key: String },

    #[error("{operation} on '{target}' failed")]
    Request {
        operation: &'static str,
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("could not read local file '{}'", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// 🔍 "Gone" is the only failure class the fetcher treats differently.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// 🗜️ Everything a job can run into while turning keys into a published archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Non-fatal: the key carries no date we can trust. Logged, skipped.
    #[error("key '{key}' has no usable date token: {reason}")]
    MalformedKey { key: String, reason: String },

    /// Non-fatal: listed a moment ago, gone now. Logged, skipped.
    #[error("object '{key}' vanished between listing and fetch")]
    ObjectGone { key: String },

    #[error("gave up downloading '{key}' after {attempts} attempt(s)")]
    FetchExhausted {
        key: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("could not list objects under '{prefix}'")]
    ListFailure {
        prefix: String,
        #[source]
        source: StoreError,
    },

    #[error("could not write archive '{archive}'")]
    WriteFailure {
        archive: String,
        #[source]
        source: BoxError,
    },

    #[error("could not publish archive '{archive}' to '{remote_key}'")]
    PublishFailure {
        archive: String,
        remote_key: String,
        #[source]
        source: StoreError,
    },

    #[error("could not initialise the object store gateway for bucket '{bucket}'")]
    GatewayInitFailure {
        bucket: String,
        #[source]
        source: StoreError,
    },

    /// The job task died without telling us how. Treated like any other fatal error.
    #[error("the job building '{archive}' panicked or was cancelled")]
    JobPanicked { archive: String },
}

impl ArchiveError {
    /// ⚖️ Fatal kinds abort the owning job; the other two are skip-and-log.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ArchiveError::MalformedKey { .. } | ArchiveError::ObjectGone { .. }
        )
    }

    pub(crate) fn write_failure(
        archive: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        ArchiveError::WriteFailure {
            archive: archive.into(),
            source: source.into(),
        }
    }
}
