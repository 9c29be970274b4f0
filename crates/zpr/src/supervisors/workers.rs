//! 🧵 Workers: the ones who actually do the work while the Supervisor takes all
//! the credit in the sprint retro.
//!
//! 🚀 The factory floor has three stations:
//! - [`JobWorker`]: one per archive. Lists, selects, fetches, hands off, publishes.
//! - [`ArchiveWorker`]: one per job, on a blocking thread, the only hand on the zip file.
//! - [`Heartbeat`](super::heartbeat::Heartbeat): one per run, says "still here" every so often.
//!
//! The [`RetryingFetcher`] is not a worker. It is a tool the job worker carries around. 🦆

use tokio::task::JoinHandle;

mod archive_worker;
mod fetcher;
mod job_worker;

pub(crate) use archive_worker::{ArchiveEntry, ArchiveWorker, WrittenArchive};
pub(crate) use fetcher::RetryingFetcher;
pub(crate) use job_worker::{JobContext, JobWorker};

/// 🏗️ A background worker, that does work. duh.
///
/// Every worker consumes itself on `start` and hands back the handle. What comes out
/// of the handle is the worker's business: a report, a written archive, or nothing.
pub(crate) trait Worker {
    type Output: Send + 'static;

    fn start(self) -> JoinHandle<Self::Output>;
}
