//! 🎬 *[one permit. one partition. one zip file. one shot at getting it into the bucket.]*
//!
//! 🏗️ The JobWorker, turns a [`JobSpec`] into a published archive, or into a very
//! specific error for the scheduler to keep.
//!
//! ```text
//! Listing → Selecting → Fetching → Writing → Publishing → Done
//!    └──────────┴───────────┴─────────┴───────────┴──────→ Aborted
//! ```
//!
//! 🧠 Knowledge graph:
//! - Candidates come from the shared [`ListingCache`]; the job never lists on its own
//! - Fetching happens here, one key at a time; writing happens on the [`ArchiveWorker`]'s thread
//! - `MalformedKey` and `ObjectGone` are counted and skipped, everything else aborts
//! - The first fatal error goes into the scheduler's one-slot channel BEFORE the permit drops,
//!   so the scheduler sees it before it can start anybody new
//! - The temp file is a `TempPath`: whatever happens, it does not outlive the job 🦆

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_channel::Sender;
use chrono::{DateTime, Utc};
use tempfile::{NamedTempFile, TempPath};
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use super::{ArchiveEntry, ArchiveWorker, RetryingFetcher, Worker, WrittenArchive};
use crate::app_config::AppConfig;
use crate::backends::StoreBackend;
use crate::common::{JobOutcome, JobReport, JobSpec, JobState};
use crate::errors::ArchiveError;
use crate::partitions::{PartitionSelector, basename};
use crate::publisher::Publisher;
use crate::supervisors::listing::ListingCache;

// -- 🔎 dateless keys named one by one at warn; past this, only the count
const MALFORMED_KEYS_SHOWN: usize = 5;

/// 🧰 Everything the jobs of one run share. Built once, handed out as an `Arc`.
#[derive(Debug)]
pub(crate) struct JobContext {
    pub(crate) listings: ListingCache,
    pub(crate) selector: PartitionSelector,
    pub(crate) fetcher: RetryingFetcher,
    pub(crate) publisher: Publisher,
    pub(crate) temp_dir: Option<PathBuf>,
    pub(crate) queue_capacity: usize,
    /// the run's one and only "now": every rolling window is measured from here
    pub(crate) now: DateTime<Utc>,
}

impl JobContext {
    pub(crate) fn new(store: Arc<StoreBackend>, app_config: &AppConfig, now: DateTime<Utc>) -> Self {
        let archive = &app_config.archive;
        let runtime = &app_config.runtime;
        Self {
            listings: ListingCache::new(store.clone()),
            selector: PartitionSelector::new(archive.date_token, archive.key_suffix.clone()),
            fetcher: RetryingFetcher::new(
                store.clone(),
                runtime.fetch_max_retries,
                Duration::from_secs(runtime.retry_delay_secs),
            ),
            publisher: Publisher::new(store, archive.archives_folder.clone()),
            temp_dir: archive.temp_dir.clone(),
            queue_capacity: runtime.queue_capacity.max(1),
            now,
        }
    }
}

/// 🏗️ One job, holding its permit for dear life.
#[derive(Debug)]
pub(crate) struct JobWorker {
    spec: JobSpec,
    ctx: Arc<JobContext>,
    permit: OwnedSemaphorePermit,
    error_tx: Sender<ArchiveError>,
}

impl JobWorker {
    pub(crate) fn new(
        spec: JobSpec,
        ctx: Arc<JobContext>,
        permit: OwnedSemaphorePermit,
        error_tx: Sender<ArchiveError>,
    ) -> Self {
        Self {
            spec,
            ctx,
            permit,
            error_tx,
        }
    }

    async fn run(self) -> JobReport {
        let JobWorker {
            spec,
            ctx,
            permit,
            error_tx,
        } = self;
        let the_clock = Instant::now();
        info!("🚀 building {} from {} under '{}'", spec.archive_name, spec.partition, spec.source_prefix);

        let mut the_run = JobRun {
            spec: &spec,
            ctx: &ctx,
            report: JobReport::new(&spec),
            state: JobState::Listing,
        };
        match the_run.drive().await {
            Ok(outcome) => the_run.report.outcome = outcome,
            Err(err) => {
                error!("💀 {} aborted while {}: {}", spec.archive_name, the_run.state, err);
                the_run.report.outcome = JobOutcome::Aborted {
                    during: the_run.state,
                    reason: err.to_string(),
                };
                the_run.state = JobState::Aborted;
                if error_tx.try_send(err).is_err() {
                    debug!("another job already reported the run's first error");
                }
            }
        }

        let mut report = the_run.report;
        report.elapsed = the_clock.elapsed();
        info!(
            "🏁 {} {} in {:?}: {} archived, {} malformed, {} gone",
            report.archive_name,
            if report.outcome.is_done() { "finished" } else { "gave up" },
            report.elapsed,
            report.archived,
            report.malformed_skipped,
            report.gone_skipped,
        );
        drop(permit);
        report
    }
}

impl Worker for JobWorker {
    type Output = JobReport;

    fn start(self) -> JoinHandle<JobReport> {
        let the_span = info_span!("job", archive = %self.spec.archive_name);
        tokio::spawn(self.run().instrument(the_span))
    }
}

/// 🔄 The state machine for one pass through a job.
struct JobRun<'a> {
    spec: &'a JobSpec,
    ctx: &'a JobContext,
    report: JobReport,
    state: JobState,
}

impl JobRun<'_> {
    fn enter(&mut self, next: JobState) {
        debug!("🔄 {} → {}", self.state, next);
        self.state = next;
    }

    async fn drive(&mut self) -> Result<JobOutcome, ArchiveError> {
        let the_candidates = self.ctx.listings.keys(&self.spec.source_prefix).await?;
        self.report.candidates = the_candidates.len();

        self.enter(JobState::Selecting);
        let the_selected = self.select(&the_candidates);
        self.report.selected = the_selected.len();

        self.enter(JobState::Fetching);
        let (the_archive, written) = self.fetch_and_write(&the_selected).await?;
        debug!(
            "🗜️ {} entries, {} bytes in, {} bytes on disk",
            written.entries, written.uncompressed_bytes, written.size_bytes
        );
        self.report.archived = written.entries;
        self.report.duplicates_skipped = written.duplicates_skipped;

        if written.entries == 0 {
            warn!(
                "🫙 no content for {} under '{}' ({}), nothing to publish",
                self.spec.archive_name, self.spec.source_prefix, self.spec.partition
            );
            drop(the_archive);
            self.enter(JobState::Done);
            return Ok(JobOutcome::NothingToPublish);
        }

        self.enter(JobState::Publishing);
        let the_receipt = self
            .ctx
            .publisher
            .publish(the_archive, &self.spec.archive_name)
            .await?;
        self.enter(JobState::Done);
        Ok(JobOutcome::Published(the_receipt))
    }

    fn select<'k>(&mut self, candidates: &'k [String]) -> Vec<&'k str> {
        let mut the_selected = Vec::new();
        for key in candidates {
            if basename(key).is_empty() {
                trace!("📁 '{}' is a folder marker", key);
                continue;
            }
            match self
                .ctx
                .selector
                .belongs_to(self.spec.partition, key, self.ctx.now)
            {
                Ok(true) => the_selected.push(key.as_str()),
                Ok(false) => {}
                Err(err) => {
                    if self.report.malformed_keys.len() < MALFORMED_KEYS_SHOWN {
                        warn!("🤷 skipping '{}': {}", key, err);
                        self.report.malformed_keys.push(key.clone());
                    } else {
                        debug!("🤷 {}", err);
                    }
                    self.report.malformed_skipped += 1;
                }
            }
        }
        if self.report.malformed_skipped > self.report.malformed_keys.len() {
            warn!(
                "🤷 skipped {} key(s) without a usable date under '{}', only the first {} named above",
                self.report.malformed_skipped,
                self.spec.source_prefix,
                self.report.malformed_keys.len()
            );
        }
        the_selected
    }

    async fn fetch_and_write(
        &mut self,
        selected: &[&str],
    ) -> Result<(TempPath, WrittenArchive), ArchiveError> {
        let (the_file, the_archive) = self.temp_file()?.into_parts();
        let (tx, rx) = async_channel::bounded(self.ctx.queue_capacity);
        let the_writer =
            ArchiveWorker::new(self.spec.archive_name.as_str(), rx, the_file, self.ctx.now).start();

        let fetched = self.produce(selected, tx).await;
        if fetched.is_ok() {
            self.enter(JobState::Writing);
        }
        // -- the writer is always awaited, so its file handle is closed before the temp path goes
        let written = match the_writer.await {
            Ok(written) => written,
            Err(join_err) => Err(ArchiveError::write_failure(
                self.spec.archive_name.as_str(),
                join_err,
            )),
        };

        fetched?;
        Ok((the_archive, written?))
    }

    async fn produce(&mut self, selected: &[&str], tx: Sender<ArchiveEntry>) -> Result<(), ArchiveError> {
        for key in selected {
            match self.ctx.fetcher.fetch(key).await {
                Ok(body) => {
                    let the_entry = ArchiveEntry {
                        name: basename(key).to_string(),
                        body,
                    };
                    if tx.send(the_entry).await.is_err() {
                        debug!("✋ the writer hung up, it will explain");
                        break;
                    }
                }
                Err(ArchiveError::ObjectGone { key }) => {
                    warn!("👻 '{}' vanished since listing, skipping", key);
                    self.report.gone_skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn temp_file(&self) -> Result<NamedTempFile, ArchiveError> {
        let the_prefix = format!("{}-", self.spec.archive_name.trim_end_matches(".zip"));
        let mut the_builder = tempfile::Builder::new();
        the_builder.prefix(&the_prefix).suffix(".zip");
        let the_file = match &self.ctx.temp_dir {
            Some(dir) => the_builder.tempfile_in(dir),
            None => the_builder.tempfile(),
        };
        the_file.map_err(|e| ArchiveError::write_failure(self.spec.archive_name.as_str(), e))
    }
}
