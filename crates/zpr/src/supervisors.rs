//! 🎬 *[camera pans across a bucket holding eleven million JSON files]*
//! 🎬 "In a world where every article needs a yearly zip..."
//! 🎬 "One supervisor dared to run three at a time."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module, the scheduler. Part middle manager, part bouncer.
//!
//! 🧠 Knowledge graph:
//! - `plan_jobs`: years `year_to_start..=now`, then the rolling window, then the optional unfiltered dump
//! - A counting semaphore of `max_parallel_jobs` permits. A job holds one from spawn to report.
//! - A one-slot error channel. First fatal error wins, later ones are shrugged off.
//! - Before starting each job the supervisor peeks at that slot. Non-empty means: stop hiring.
//!   Jobs already running are left alone to finish or fail on their own.
//! - A heartbeat task logs elapsed time while all this happens, and is put down at the end.
//!
//! ⚠️ Workers are the supervisor's private little minions. They stay `mod`, not `pub mod`.

mod heartbeat;
mod listing;
mod workers;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::app_config::{AppConfig, ListingStrategy};
use crate::backends::StoreBackend;
use crate::common::{JobOutcome, JobReport, JobSpec, RunResult, archive_name};
use crate::errors::ArchiveError;
use crate::partitions::Partition;
use crate::summary::format_duration;
use heartbeat::Heartbeat;
use listing::folder_prefix;
use workers::{JobContext, JobWorker, Worker};

/// 📦 The Supervisor: plans the jobs, hands out permits, keeps the first bad news.
pub(crate) struct Supervisor {
    app_config: AppConfig,
    store: Arc<StoreBackend>,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig, store: Arc<StoreBackend>) -> Self {
        Self { app_config, store }
    }

    /// 🗺️ Every job this run will attempt, in the order it will attempt them.
    pub(crate) fn plan_jobs(&self, current_year: i32) -> Vec<JobSpec> {
        let archive = &self.app_config.archive;
        let the_shared_prefix = folder_prefix(&archive.source_folder);
        let name_for = |partition| archive_name(&archive.name_prefix, partition, &archive.unfiltered_name);

        let mut plan: Vec<JobSpec> = (archive.year_to_start..=current_year)
            .map(|year| {
                let source_prefix = match archive.listing {
                    ListingStrategy::Shared => the_shared_prefix.clone(),
                    ListingStrategy::PerYear => format!("{the_shared_prefix}{year}/"),
                };
                JobSpec {
                    archive_name: name_for(Partition::Year(year)),
                    partition: Partition::Year(year),
                    source_prefix,
                }
            })
            .collect();

        let the_window = Partition::RollingWindow {
            days: archive.rolling_window_days,
        };
        plan.push(JobSpec {
            archive_name: name_for(the_window),
            partition: the_window,
            source_prefix: the_shared_prefix.clone(),
        });

        if let Some(folder) = &archive.unfiltered_folder {
            plan.push(JobSpec {
                archive_name: name_for(Partition::Unfiltered),
                partition: Partition::Unfiltered,
                source_prefix: folder_prefix(folder),
            });
        }
        plan
    }

    /// 🧵 Run the plan. Always returns a result; a failed run says so in `first_error`.
    pub(crate) async fn run(&self) -> RunResult {
        let started_at = Utc::now();
        let the_clock = tokio::time::Instant::now();
        let runtime = &self.app_config.runtime;

        let heartbeat =
            Heartbeat::new(Duration::from_secs(runtime.heartbeat_interval_secs), the_clock).start();

        let plan = self.plan_jobs(started_at.year());
        info!(
            "🗜️ {} archive job(s) from '{}' into '{}', {} at a time, starting with {}",
            plan.len(),
            self.app_config.archive.source_folder,
            self.app_config.archive.archives_folder,
            runtime.max_parallel_jobs,
            self.app_config.archive.year_to_start,
        );

        let ctx = Arc::new(JobContext::new(self.store.clone(), &self.app_config, started_at));
        let semaphore = Arc::new(Semaphore::new(runtime.max_parallel_jobs.max(1)));
        let (error_tx, error_rx) = async_channel::bounded::<ArchiveError>(1);

        let mut running = FuturesUnordered::new();
        let mut jobs_skipped = 0;
        for (index, spec) in plan.iter().enumerate() {
            // -- the semaphore is never closed, so this only fails if the runtime is going away
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                jobs_skipped = plan.len() - index;
                break;
            };
            if !error_rx.is_empty() {
                jobs_skipped = plan.len() - index;
                warn!("⛔ a job failed, the remaining {} job(s) will not be started", jobs_skipped);
                break;
            }
            let the_handle = JobWorker::new(spec.clone(), ctx.clone(), permit, error_tx.clone()).start();
            running.push(async move { (index, the_handle.await) });
        }

        let mut reports = Vec::with_capacity(running.len());
        while let Some((index, joined)) = running.next().await {
            match joined {
                Ok(report) => reports.push((index, report)),
                Err(join_err) => {
                    let spec = &plan[index];
                    error!("💥 the job for {} died: {}", spec.archive_name, join_err);
                    let _ = error_tx.try_send(ArchiveError::JobPanicked {
                        archive: spec.archive_name.clone(),
                    });
                    let mut report = JobReport::new(spec);
                    report.outcome = JobOutcome::Panicked;
                    reports.push((index, report));
                }
            }
        }
        reports.sort_by_key(|(index, _)| *index);

        heartbeat.abort();
        drop(error_tx);
        let first_error = error_rx.try_recv().ok();
        let elapsed = the_clock.elapsed();
        info!("🏁 all jobs settled in {}", format_duration(elapsed));

        RunResult {
            started_at,
            elapsed,
            reports: reports.into_iter().map(|(_, report)| report).collect(),
            jobs_skipped,
            first_error,
        }
    }
}
