//! 🔧 App Configuration: the sacred defaults-env-TOML-flags pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing.", every developer at 3am 🦆
//!
//! 🏗️ Layers, weakest first:
//! 1. built-in defaults (`AppConfig::default()`)
//! 2. `ZPR_*` environment variables, `__` for nesting (`ZPR_RUNTIME__MAX_PARALLEL_JOBS=5`)
//! 3. the old flat names the cron job still exports (`YEAR_TO_START`, `BUCKET_NAME`, ...)
//! 4. an optional TOML file
//! 5. command-line flags

use std::path::{Path, PathBuf};

use anyhow::{Context, ensure};
use chrono::{Datelike, Utc};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::info;

use crate::backends::S3StoreConfig;
use crate::partitions::DateTokenMode;

// -- 🦖 the bare variable names older deployments still export, and where they live now
const LEGACY_ENV_KEYS: [(&str, &str); 5] = [
    ("YEAR_TO_START", "archive.year_to_start"),
    ("BUCKET_NAME", "store.bucket"),
    ("S3_DOMAIN", "store.endpoint_url"),
    ("S3_CONTENT_FOLDER", "archive.source_folder"),
    ("AWS_REGION", "store.region"),
];

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// 💤 `false` turns the whole run into a polite no-op.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub store: S3StoreConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

fn default_enabled() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            store: S3StoreConfig::default(),
            archive: ArchiveConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

/// 📜 How keys are listed for the jobs of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStrategy {
    /// list `source_folder` once, every dated job filters the same key set
    #[default]
    Shared,
    /// list `<source_folder>/<year>/` for each yearly job; the rolling window still lists the whole folder
    PerYear,
}

/// 🗂️ What gets archived, from where, to where, and under which name.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_source_folder")]
    pub source_folder: String,
    #[serde(default = "default_archives_folder")]
    pub archives_folder: String,
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    #[serde(default = "default_year_to_start")]
    pub year_to_start: i32,
    #[serde(default = "default_rolling_window_days")]
    pub rolling_window_days: u32,
    /// when set, one extra job zips everything under this folder, dates or no dates
    #[serde(default)]
    pub unfiltered_folder: Option<String>,
    #[serde(default = "default_unfiltered_name")]
    pub unfiltered_name: String,
    #[serde(default)]
    pub date_token: DateTokenMode,
    #[serde(default = "default_key_suffix")]
    pub key_suffix: String,
    #[serde(default)]
    pub listing: ListingStrategy,
    /// where archives are assembled before upload; the OS temp dir when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

fn default_source_folder() -> String {
    "unarchived-content".to_string()
}
fn default_archives_folder() -> String {
    "yearly-archives".to_string()
}
fn default_name_prefix() -> String {
    "FT-archive".to_string()
}
fn default_year_to_start() -> i32 {
    1995
}
fn default_rolling_window_days() -> u32 {
    30
}
fn default_unfiltered_name() -> String {
    "concepts".to_string()
}
fn default_key_suffix() -> String {
    ".json".to_string()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            source_folder: default_source_folder(),
            archives_folder: default_archives_folder(),
            name_prefix: default_name_prefix(),
            year_to_start: default_year_to_start(),
            rolling_window_days: default_rolling_window_days(),
            unfiltered_folder: None,
            unfiltered_name: default_unfiltered_name(),
            date_token: DateTokenMode::default(),
            key_suffix: default_key_suffix(),
            listing: ListingStrategy::default(),
            temp_dir: None,
        }
    }
}

/// ⚙️ Runtime knobs: how many jobs at once, how stubborn the fetcher is.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_max_parallel_jobs")]
    pub max_parallel_jobs: usize,
    /// retries after the first attempt; 2 means three tries in total
    #[serde(default = "default_fetch_max_retries")]
    pub fetch_max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// fetched bodies waiting for the writer, per job
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_max_parallel_jobs() -> usize {
    3
}
fn default_fetch_max_retries() -> u32 {
    2
}
fn default_retry_delay_secs() -> u64 {
    5
}
fn default_heartbeat_interval_secs() -> u64 {
    30
}
fn default_queue_capacity() -> usize {
    4
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_jobs: default_max_parallel_jobs(),
            fetch_max_retries: default_fetch_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// 🎛️ Values from the command line. `None` means "not given, let the lower layers speak".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub year_to_start: Option<i32>,
    pub max_parallel_jobs: Option<usize>,
    pub bucket: Option<String>,
    pub source_folder: Option<String>,
}

impl ConfigOverrides {
    fn apply(&self, figment: Figment) -> Figment {
        let mut figment = figment;
        if let Some(year) = self.year_to_start {
            figment = figment.merge(Serialized::default("archive.year_to_start", year));
        }
        if let Some(jobs) = self.max_parallel_jobs {
            figment = figment.merge(Serialized::default("runtime.max_parallel_jobs", jobs));
        }
        if let Some(bucket) = &self.bucket {
            figment = figment.merge(Serialized::default("store.bucket", bucket));
        }
        if let Some(folder) = &self.source_folder {
            figment = figment.merge(Serialized::default("archive.source_folder", folder));
        }
        figment
    }
}

impl AppConfig {
    /// ✅ Catch the nonsense before it reaches S3.
    pub fn validate(&self, current_year: i32) -> anyhow::Result<()> {
        ensure!(
            (1..=Semaphore::MAX_PERMITS).contains(&self.runtime.max_parallel_jobs),
            "💀 runtime.max_parallel_jobs must be between 1 and {}, got {}",
            Semaphore::MAX_PERMITS,
            self.runtime.max_parallel_jobs
        );
        ensure!(
            self.runtime.queue_capacity >= 1,
            "💀 runtime.queue_capacity must be at least 1, got {}",
            self.runtime.queue_capacity
        );
        ensure!(
            self.archive.rolling_window_days >= 1,
            "💀 archive.rolling_window_days must be at least 1"
        );
        ensure!(
            self.archive.year_to_start <= current_year,
            "💀 archive.year_to_start ({}) is in the future; it is only {} out here",
            self.archive.year_to_start,
            current_year
        );
        ensure!(
            !self.store.bucket.trim().is_empty(),
            "💀 store.bucket is empty. Set BUCKET_NAME, ZPR_STORE__BUCKET, or --bucket-name."
        );
        Ok(())
    }
}

fn figment_for(config_file_name: Option<&Path>, overrides: &ConfigOverrides) -> Figment {
    let the_legacy_env = Env::raw().filter_map(|key| {
        LEGACY_ENV_KEYS
            .iter()
            .find(|(legacy, _)| key == *legacy)
            .map(|(_, nested)| (*nested).into())
    });

    let figment = Figment::from(Serialized::defaults(AppConfig::default()))
        .merge(Env::prefixed("ZPR_").split("__"))
        .merge(the_legacy_env);
    let figment = match config_file_name {
        Some(file_name) => figment.merge(Toml::file(file_name)),
        None => figment,
    };
    overrides.apply(figment)
}

/// 🚀 Load the config, from a file, from env vars, or from the sheer power of hoping.
///
/// 💀 Fails when the layers do not parse into an [`AppConfig`], or when an enabled
/// config does not validate. A disabled config is returned as-is: nobody is going to use it.
pub fn load_config(
    config_file_name: Option<&Path>,
    overrides: &ConfigOverrides,
) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {}",
        config_file_name.map_or_else(|| "(environment only)".to_string(), |p| p.display().to_string())
    );

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (ZPR_*). \
             The file exists in our hearts, but apparently not in a shape serde recognises.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (ZPR_*). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };
    let app_config: AppConfig = figment_for(config_file_name, overrides)
        .extract()
        .context(context_msg)?;

    if app_config.enabled {
        app_config
            .validate(Utc::now().year())
            .context("💀 Configuration loaded but does not make sense")?;
    }
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("zpr_app_config_")
            .suffix(".toml")
            .tempfile()
            .expect("💀 Failed to create test config. The filesystem said 'new phone who dis'.");
        file.write_all(contents.as_bytes())
            .expect("💀 Failed to write test config.");
        file
    }

    #[test]
    fn the_one_where_a_toml_file_fills_in_the_blanks() {
        let config_file = write_test_config(
            r#"
            [store]
            bucket = "ft-content"
            force_path_style = true

            [archive]
            year_to_start = 2020
            unfiltered_folder = "concepts"
            date_token = "anywhere"
            listing = "per_year"

            [runtime]
            max_parallel_jobs = 5
            "#,
        );

        let app_config = load_config(Some(config_file.path()), &ConfigOverrides::default())
            .expect("💀 A perfectly good TOML file should parse.");

        assert_eq!(app_config.store.bucket, "ft-content");
        assert!(app_config.store.force_path_style);
        assert_eq!(app_config.archive.year_to_start, 2020);
        assert_eq!(app_config.archive.unfiltered_folder.as_deref(), Some("concepts"));
        assert_eq!(app_config.archive.date_token, DateTokenMode::Anywhere);
        assert_eq!(app_config.archive.listing, ListingStrategy::PerYear);
        assert_eq!(app_config.runtime.max_parallel_jobs, 5);
        // 🧺 untouched knobs keep their defaults
        assert_eq!(app_config.archive.archives_folder, "yearly-archives");
        assert_eq!(app_config.runtime.fetch_max_retries, 2);
        assert_eq!(app_config.runtime.retry_delay_secs, 5);
    }

    #[test]
    fn the_one_where_the_command_line_has_the_last_word() {
        let config_file = write_test_config(
            r#"
            [store]
            bucket = "from-the-file"

            [archive]
            year_to_start = 2001
            "#,
        );
        let overrides = ConfigOverrides {
            year_to_start: Some(2019),
            max_parallel_jobs: Some(1),
            bucket: Some("from-the-flag".to_string()),
            source_folder: Some("other-content".to_string()),
        };

        let app_config = load_config(Some(config_file.path()), &overrides).unwrap();

        assert_eq!(app_config.archive.year_to_start, 2019);
        assert_eq!(app_config.runtime.max_parallel_jobs, 1);
        assert_eq!(app_config.store.bucket, "from-the-flag");
        assert_eq!(app_config.archive.source_folder, "other-content");
    }

    #[test]
    fn the_one_where_zero_parallel_jobs_is_not_a_plan() {
        let config_file = write_test_config(
            r#"
            [store]
            bucket = "ft-content"

            [runtime]
            max_parallel_jobs = 0
            "#,
        );

        let err = load_config(Some(config_file.path()), &ConfigOverrides::default()).unwrap_err();
        assert!(format!("{err:#}").contains("max_parallel_jobs"));
    }

    #[test]
    fn the_one_where_a_disabled_config_skips_the_inspection() {
        let config_file = write_test_config(
            r#"
            enabled = false

            [runtime]
            max_parallel_jobs = 0
            "#,
        );
        let overrides = ConfigOverrides {
            bucket: Some(String::new()),
            ..ConfigOverrides::default()
        };

        let app_config = load_config(Some(config_file.path()), &overrides).unwrap();
        assert!(!app_config.enabled);
    }

    #[test]
    fn the_one_where_validation_catches_time_travellers_and_empty_buckets() {
        let mut app_config = AppConfig::default();
        app_config.store.bucket = "ft-content".to_string();
        assert!(app_config.validate(2024).is_ok());

        app_config.archive.year_to_start = 2025;
        assert!(app_config.validate(2024).is_err());

        app_config.archive.year_to_start = 2020;
        app_config.store.bucket = "   ".to_string();
        assert!(app_config.validate(2024).is_err());

        app_config.store.bucket = "ft-content".to_string();
        app_config.archive.rolling_window_days = 0;
        assert!(app_config.validate(2024).is_err());
    }

    #[test]
    fn the_one_where_a_million_billion_parallel_jobs_is_also_not_a_plan() {
        let mut app_config = AppConfig::default();
        app_config.store.bucket = "ft-content".to_string();

        app_config.runtime.max_parallel_jobs = Semaphore::MAX_PERMITS;
        assert!(app_config.validate(2024).is_ok());

        app_config.runtime.max_parallel_jobs = Semaphore::MAX_PERMITS + 1;
        let err = app_config.validate(2024).unwrap_err();
        assert!(err.to_string().contains("max_parallel_jobs"), "{err}");
    }

    #[test]
    fn the_one_where_defaults_show_up_uninvited_but_helpful() {
        let app_config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .extract()
            .expect("💀 The defaults should at least agree with themselves.");

        assert!(app_config.enabled);
        assert_eq!(app_config.store.region, "us-east-1");
        assert_eq!(app_config.archive.source_folder, "unarchived-content");
        assert_eq!(app_config.archive.name_prefix, "FT-archive");
        assert_eq!(app_config.archive.year_to_start, 1995);
        assert_eq!(app_config.archive.rolling_window_days, 30);
        assert_eq!(app_config.archive.unfiltered_name, "concepts");
        assert_eq!(app_config.archive.date_token, DateTokenMode::Trailing);
        assert_eq!(app_config.archive.listing, ListingStrategy::Shared);
        assert_eq!(app_config.runtime.max_parallel_jobs, 3);
        assert_eq!(app_config.runtime.heartbeat_interval_secs, 30);
        assert_eq!(app_config.runtime.queue_capacity, 4);
    }
}
