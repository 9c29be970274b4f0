//! 📦 Common data structures: what a job is, what it did, and what the whole run amounts to.
//!
//! 🎬 COLD OPEN, INT. SCHEDULER, THE PLAN IS WRITTEN BEFORE ANYONE TOUCHES S3
//!
//! Thirty-one `JobSpec`s line up, one per year since 1995, plus one for the last thirty
//! days. Each one knows its archive name, its partition, and where to list. None of them
//! knows which keys it will get. That is decided later, in the Listing state, from a
//! listing that most of them share.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::errors::ArchiveError;
use crate::partitions::Partition;
use crate::publisher::PublishedArchive;

/// 📋 One job's marching orders. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub archive_name: String,
    pub partition: Partition,
    /// the listing prefix whose keys become this job's candidates
    pub source_prefix: String,
}

/// 🏷️ `<prefix>-<year>.zip`, `<prefix>-last-<days>-days.zip`, `<prefix>-<unfiltered_name>.zip`.
pub fn archive_name(prefix: &str, partition: Partition, unfiltered_name: &str) -> String {
    match partition {
        Partition::Year(year) => format!("{prefix}-{year}.zip"),
        Partition::RollingWindow { days } => format!("{prefix}-last-{days}-days.zip"),
        Partition::Unfiltered => format!("{prefix}-{unfiltered_name}.zip"),
    }
}

/// 🔄 Where a job is in its life. `Done` and `Aborted` are the only ways out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Listing,
    Selecting,
    Fetching,
    Writing,
    Publishing,
    Done,
    Aborted,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let the_label = match self {
            JobState::Listing => "listing",
            JobState::Selecting => "selecting",
            JobState::Fetching => "fetching",
            JobState::Writing => "writing",
            JobState::Publishing => "publishing",
            JobState::Done => "done",
            JobState::Aborted => "aborted",
        };
        f.write_str(the_label)
    }
}

/// 🏁 How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Published(PublishedArchive),
    /// Done, but the archive came out empty and was never uploaded.
    NothingToPublish,
    /// The job hit a fatal error while in `during`. The error itself went to the scheduler.
    Aborted { during: JobState, reason: String },
    /// The job's task died without handing back a report.
    Panicked,
}

impl JobOutcome {
    /// ✅ Reached `Done`, with or without an upload.
    pub fn is_done(&self) -> bool {
        matches!(self, JobOutcome::Published(_) | JobOutcome::NothingToPublish)
    }
}

/// 📊 What one job did, counted.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub archive_name: String,
    pub partition: Partition,
    /// keys listed under the job's prefix
    pub candidates: usize,
    /// keys the partition selector said yes to
    pub selected: usize,
    /// entries actually written to the archive
    pub archived: usize,
    pub malformed_skipped: usize,
    /// the first few dateless keys, by name, so somebody can go and look at them
    pub malformed_keys: Vec<String>,
    pub gone_skipped: usize,
    pub duplicates_skipped: usize,
    pub elapsed: Duration,
    pub outcome: JobOutcome,
}

impl JobReport {
    pub(crate) fn new(spec: &JobSpec) -> Self {
        Self {
            archive_name: spec.archive_name.clone(),
            partition: spec.partition,
            candidates: 0,
            selected: 0,
            archived: 0,
            malformed_skipped: 0,
            malformed_keys: Vec::new(),
            gone_skipped: 0,
            duplicates_skipped: 0,
            elapsed: Duration::ZERO,
            outcome: JobOutcome::NothingToPublish,
        }
    }
}

/// 🧾 The whole run, summed up.
#[derive(Debug)]
pub struct RunResult {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// one per scheduled job, in plan order
    pub reports: Vec<JobReport>,
    /// jobs that were planned but never started because an earlier job failed
    pub jobs_skipped: usize,
    pub first_error: Option<ArchiveError>,
}

impl RunResult {
    /// ✅ Every scheduled job reached `Done` and nothing fatal was reported.
    pub fn is_success(&self) -> bool {
        self.first_error.is_none()
            && self.jobs_skipped == 0
            && self.reports.iter().all(|r| r.outcome.is_done())
    }

    pub fn total_archived(&self) -> usize {
        self.reports.iter().map(|r| r.archived).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_archives_are_named_after_their_partitions() {
        assert_eq!(archive_name("FT-archive", Partition::Year(2022), "concepts"), "FT-archive-2022.zip");
        assert_eq!(
            archive_name("FT-archive", Partition::RollingWindow { days: 30 }, "concepts"),
            "FT-archive-last-30-days.zip"
        );
        assert_eq!(
            archive_name("FT-archive", Partition::Unfiltered, "concepts"),
            "FT-archive-concepts.zip"
        );
    }

    #[test]
    fn the_one_where_one_aborted_job_spoils_the_run() {
        let spec = JobSpec {
            archive_name: "FT-archive-2022.zip".into(),
            partition: Partition::Year(2022),
            source_prefix: "a/".into(),
        };
        let mut aborted = JobReport::new(&spec);
        aborted.outcome = JobOutcome::Aborted {
            during: JobState::Fetching,
            reason: "gave up".into(),
        };
        let mut result = RunResult {
            started_at: Utc::now(),
            elapsed: Duration::from_secs(1),
            reports: vec![JobReport::new(&spec)],
            jobs_skipped: 0,
            first_error: None,
        };
        assert!(result.is_success());

        result.reports.push(aborted);
        assert!(!result.is_success());
    }
}
