//! 📅 Partitions: deciding which year (or which month-ish) a key belongs to.
//!
//! 🎬 COLD OPEN, INT. S3 BUCKET, A MILLION KEYS, ONE QUESTION
//!
//! `content/2022/7a1b..._2022-06-01.json` walks up to the selector. "Am I in 2022?"
//! The selector squints at the last underscore, reads ten characters, and says yes.
//! `content/notes.txt` walks up next. The selector says nothing nice. It says `MalformedKey`.
//!
//! Membership is a pure function of `(partition, key, now)`. No I/O, no clock reads,
//! no surprises. The caller brings `now`, which is how the tests get to time travel.
//!
//! 🧠 Knowledge graph:
//! - [`Partition`]: `Year`, `RollingWindow`, `Unfiltered`
//! - [`DateTokenMode`]: strict trailing `_YYYY-MM-DD` token, or first date-shaped run anywhere
//! - [`PartitionSelector::belongs_to`]: the one operation the job cares about
//! - The loose scan uses `memchr` to jump between dashes instead of a regex engine 🦆

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ArchiveError;

/// 🗂️ A time-based grouping rule applied to object keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    /// Calendar year of the key's date token.
    Year(i32),
    /// `now - date < days * 24h`, measured in elapsed time, not calendar days.
    RollingWindow { days: u32 },
    /// Everything goes in. No date required.
    Unfiltered,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Year(year) => write!(f, "year {year}"),
            Partition::RollingWindow { days } => write!(f, "last {days} days"),
            Partition::Unfiltered => write!(f, "unfiltered"),
        }
    }
}

/// 🔍 Where to look for the date inside a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateTokenMode {
    /// `<anything>_YYYY-MM-DD<suffix>` in the final path segment. Nothing else counts.
    #[default]
    Trailing,
    /// First `(19|20)YY-MM-DD` run anywhere in the key, like the old 30-day zipper did.
    Anywhere,
}

/// 🧭 The partition selector: pure, cheap, and deeply opinionated about dates.
#[derive(Debug, Clone)]
pub struct PartitionSelector {
    mode: DateTokenMode,
    suffix: String,
}

impl PartitionSelector {
    pub fn new(mode: DateTokenMode, suffix: impl Into<String>) -> Self {
        Self {
            mode,
            suffix: suffix.into(),
        }
    }

    /// 🎯 Does `key` belong to `partition`, as seen from `now`?
    ///
    /// `Unfiltered` never looks at the key. Every other partition needs a valid date
    /// token, and a key without one is a `MalformedKey` error, never a default answer.
    pub fn belongs_to(
        &self,
        partition: Partition,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ArchiveError> {
        match partition {
            Partition::Unfiltered => Ok(true),
            Partition::Year(year) => Ok(self.extract_date(key)?.year() == year),
            Partition::RollingWindow { days } => {
                let the_date = self.extract_date(key)?;
                let the_midnight = the_date.and_time(chrono::NaiveTime::MIN).and_utc();
                Ok(now - the_midnight < TimeDelta::days(i64::from(days)))
            }
        }
    }

    /// 📅 Pull the date token out of `key` according to the configured mode.
    pub fn extract_date(&self, key: &str) -> Result<NaiveDate, ArchiveError> {
        match self.mode {
            DateTokenMode::Trailing => self.trailing_date(key),
            DateTokenMode::Anywhere => anywhere_date(key),
        }
    }

    fn trailing_date(&self, key: &str) -> Result<NaiveDate, ArchiveError> {
        let the_basename = basename(key);
        let the_stem = the_basename
            .strip_suffix(self.suffix.as_str())
            .unwrap_or(the_basename);

        let mut the_segments = the_stem.rsplit('_');
        let the_token = the_segments.next().unwrap_or_default();
        if the_segments.next().is_none() {
            return Err(malformed(key, "fewer than two underscore-delimited segments"));
        }

        if !looks_like_date(the_token.as_bytes()) {
            return Err(malformed(
                key,
                format!("trailing token '{the_token}' is not YYYY-MM-DD"),
            ));
        }
        parse_date(key, the_token)
    }
}

impl Default for PartitionSelector {
    fn default() -> Self {
        Self::new(DateTokenMode::Trailing, ".json")
    }
}

/// ✂️ Final path segment of a key. `a/b/c.json` → `c.json`. No slash → the whole key.
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

// -- 🔍 The loose mode: find the leftmost ten-byte window shaped like (19|20)YY-MM-DD.
// -- Every such window has a dash at offset 4, so walking dashes left to right visits
// -- candidate starts in order. First shape match wins, even if it is not a real date.
fn anywhere_date(key: &str) -> Result<NaiveDate, ArchiveError> {
    let the_bytes = key.as_bytes();
    for dash in memchr::memchr_iter(b'-', the_bytes) {
        let Some(start) = dash.checked_sub(4) else {
            continue;
        };
        let Some(window) = the_bytes.get(start..start + 10) else {
            break;
        };
        if looks_like_date(window) && within_calendar_ranges(window) {
            // -- ✅ shape checks only passed ASCII, so the slice is on char boundaries
            return parse_date(key, &key[start..start + 10]);
        }
    }
    Err(malformed(key, "no YYYY-MM-DD token anywhere in the key"))
}

fn looks_like_date(token: &[u8]) -> bool {
    token.len() == 10
        && token
            .iter()
            .enumerate()
            .all(|(i, b)| if i == 4 || i == 7 { *b == b'-' } else { b.is_ascii_digit() })
}

// -- 📐 (19|20)\d\d-(0[1-9]|1[012])-(0[1-9]|[12][0-9]|3[01]) without the regex
fn within_calendar_ranges(token: &[u8]) -> bool {
    let century_ok = matches!(&token[0..2], b"19" | b"20");
    let month = two_digits(token[5], token[6]);
    let day = two_digits(token[8], token[9]);
    century_ok && (1..=12).contains(&month) && (1..=31).contains(&day)
}

fn two_digits(tens: u8, ones: u8) -> u32 {
    u32::from(tens - b'0') * 10 + u32::from(ones - b'0')
}

fn parse_date(key: &str, token: &str) -> Result<NaiveDate, ArchiveError> {
    NaiveDate::parse_from_str(token, "%Y-%m-%d")
        .map_err(|e| malformed(key, format!("'{token}' is not a calendar date: {e}")))
}

fn malformed(key: &str, reason: impl Into<String>) -> ArchiveError {
    ArchiveError::MalformedKey {
        key: key.to_string(),
        reason: reason.into(),
    }
}
