//! 🗜️ zpr: turns a bucket full of tiny dated JSON objects into a handful of big zip files.
//!
//! One archive per calendar year, one for the last thirty days, optionally one for
//! everything under a second folder. Each is built locally, checksummed, uploaded next
//! to the content it came from, and deleted from disk.
//!
//! 🧠 Knowledge graph:
//! - [`app_config`]: figment layers → [`AppConfig`]
//! - [`backends`]: the object store gateway (S3 in production)
//! - [`partitions`]: which key goes in which archive
//! - `supervisors`: the scheduler, its jobs, the fetcher and the zip writer (private)
//! - [`publisher`]: Content-MD5 upload
//! - [`summary`]: the table printed at the end

pub mod app_config;
pub mod backends;
pub mod common;
pub mod errors;
pub mod partitions;
pub mod publisher;
pub mod summary;
mod supervisors;

use std::sync::Arc;

use anyhow::Context;

pub use app_config::{AppConfig, ConfigOverrides, load_config};
pub use common::{JobOutcome, JobReport, RunResult};
pub use errors::ArchiveError;

use crate::backends::{S3ObjectStore, StoreBackend};
use crate::supervisors::Supervisor;

/// 🚀 Connect to the bucket, then run every planned job.
///
/// 💀 `Err` only when the store cannot be reached at all, in which case nothing was
/// scheduled. Job failures come back inside the [`RunResult`].
pub async fn run(app_config: AppConfig) -> anyhow::Result<RunResult> {
    let store = S3ObjectStore::connect(&app_config.store).await.with_context(|| {
        format!(
            "💀 Could not open bucket '{}'. No archive jobs were scheduled.",
            app_config.store.bucket
        )
    })?;

    let supervisor = Supervisor::new(app_config, Arc::new(StoreBackend::S3(store)));
    Ok(supervisor.run().await)
}
