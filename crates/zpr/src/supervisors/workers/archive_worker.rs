//! 🎬 *[a channel fills with object bodies. somewhere, a zip file waits.]*
//! *[it is the only file in the building with exactly one author.]*
//!
//! 🗜️ The ArchiveWorker module, patient, single-threaded, and deeply unbothered by
//! the retries happening upstream. It receives entries. It deflates entries. In order.
//!
//! 🧠 Knowledge graph:
//! - Lives on a `spawn_blocking` thread because the zip codec wants `Write + Seek`
//! - Entries arrive over a bounded `async_channel`; the producer blocks when we fall behind
//! - Bodies are async streams, bridged to `std::io::Read` with `SyncIoBridge`
//! - Channel closed = "all producers done" = write the central directory
//! - Any error drops the receiver, which tells the producer to stop sending 🦆

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};

use async_channel::Receiver;
use chrono::{DateTime, Datelike, Timelike, Utc};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::io::SyncIoBridge;
use tracing::{Span, debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::Worker;
use crate::backends::ObjectBody;
use crate::errors::ArchiveError;

/// 📄 One thing to put in the archive: a flat entry name and the stream behind it.
pub(crate) struct ArchiveEntry {
    pub(crate) name: String,
    pub(crate) body: ObjectBody,
}

impl std::fmt::Debug for ArchiveEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveEntry").field("name", &self.name).finish()
    }
}

/// ✅ What the writer reports after the central directory is on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct WrittenArchive {
    pub(crate) entries: usize,
    pub(crate) duplicates_skipped: usize,
    pub(crate) uncompressed_bytes: u64,
    pub(crate) size_bytes: u64,
}

/// 🗜️ The one and only writer of one archive.
#[derive(Debug)]
pub(crate) struct ArchiveWorker {
    archive_name: String,
    rx: Receiver<ArchiveEntry>,
    file: File,
    modified_at: zip::DateTime,
    runtime: Handle,
    span: Span,
}

impl ArchiveWorker {
    /// 🏗️ Must be called from inside the runtime: the handle is captured here so the
    /// blocking thread can drive the async bodies later.
    pub(crate) fn new(
        archive_name: impl Into<String>,
        rx: Receiver<ArchiveEntry>,
        file: File,
        modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            archive_name: archive_name.into(),
            rx,
            file,
            modified_at: zip_timestamp(modified_at),
            runtime: Handle::current(),
            span: Span::current(),
        }
    }

    fn write_all(self) -> Result<WrittenArchive, ArchiveError> {
        let _entered = self.span.enter();
        let the_name = self.archive_name.as_str();
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(self.modified_at);

        let mut zip = ZipWriter::new(BufWriter::new(self.file));
        let mut the_names_so_far = HashSet::new();
        let mut written = WrittenArchive::default();

        while let Ok(entry) = self.rx.recv_blocking() {
            if !the_names_so_far.insert(entry.name.clone()) {
                warn!("🪞 '{}' is already in {}, skipping the later copy", entry.name, the_name);
                written.duplicates_skipped += 1;
                continue;
            }

            zip.start_file(entry.name.as_str(), options)
                .map_err(|e| ArchiveError::write_failure(the_name, e))?;
            let mut the_body = SyncIoBridge::new_with_handle(entry.body, self.runtime.clone());
            let copied = std::io::copy(&mut the_body, &mut zip)
                .map_err(|e| ArchiveError::write_failure(the_name, e))?;

            debug!("🗜️ added {} ({} bytes)", entry.name, copied);
            written.entries += 1;
            written.uncompressed_bytes += copied;
        }

        let mut the_buffer = zip
            .finish()
            .map_err(|e| ArchiveError::write_failure(the_name, e))?;
        the_buffer
            .flush()
            .map_err(|e| ArchiveError::write_failure(the_name, e))?;
        let the_file = the_buffer
            .into_inner()
            .map_err(|e| ArchiveError::write_failure(the_name, e.into_error()))?;
        the_file
            .sync_all()
            .map_err(|e| ArchiveError::write_failure(the_name, e))?;
        written.size_bytes = the_file
            .metadata()
            .map_err(|e| ArchiveError::write_failure(the_name, e))?
            .len();

        Ok(written)
    }
}

impl Worker for ArchiveWorker {
    type Output = Result<WrittenArchive, ArchiveError>;

    fn start(self) -> JoinHandle<Self::Output> {
        tokio::task::spawn_blocking(move || self.write_all())
    }
}

// -- 🕰️ zip timestamps start in 1980 and have two-second resolution; anything out of range gets the epoch
fn zip_timestamp(at: DateTime<Utc>) -> zip::DateTime {
    let the_year = u16::try_from(at.year()).unwrap_or_default();
    zip::DateTime::from_date_and_time(
        the_year,
        at.month() as u8,
        at.day() as u8,
        at.hour() as u8,
        at.minute() as u8,
        at.second() as u8,
    )
    .unwrap_or_default()
}
