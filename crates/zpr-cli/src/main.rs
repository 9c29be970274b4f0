//! 🚀 zpr-cli: the front door, the bouncer, the maitre d' of zpr.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Parses flags, sets up logging, loads config, and lets the library do the
//! heavy lifting. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🗜️ Zip the content bucket into yearly archives.
#[derive(Debug, Parser)]
#[command(name = "zpr", version, about)]
struct Cli {
    /// TOML config file; environment variables alone work too
    #[arg(short, long, env = "ZPR_CONFIG")]
    config: Option<PathBuf>,

    /// first year to build an archive for
    #[arg(long, env = "YEAR_TO_START")]
    year_to_start: Option<i32>,

    /// how many archives may be built at the same time
    #[arg(long)]
    max_parallel_jobs: Option<usize>,

    #[arg(long, env = "BUCKET_NAME")]
    bucket_name: Option<String>,

    /// folder holding the objects to archive
    #[arg(long, env = "S3_CONTENT_FOLDER")]
    s3_content_folder: Option<String>,
}

impl Cli {
    fn overrides(&self) -> zpr::ConfigOverrides {
        zpr::ConfigOverrides {
            year_to_start: self.year_to_start,
            max_parallel_jobs: self.max_parallel_jobs,
            bucket: self.bucket_name.clone(),
            source_folder: self.s3_content_folder.clone(),
        }
    }
}

fn print_chain(err: &anyhow::Error) {
    error!("💀 error: {}", err);
    for cause in err.chain().skip(1) {
        error!("⚠️  cause: {}", cause);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let loaded = zpr::load_config(cli.config.as_deref(), &cli.overrides())
        .context("💀 In zpr-cli, main, we couldn't load the configuration. Check the file, the ZPR_* variables, and the flags.");
    let app_config = match loaded {
        Ok(app_config) => app_config,
        Err(err) => {
            print_chain(&err);
            std::process::exit(1);
        }
    };

    if !app_config.enabled {
        info!("💤 zpr is disabled in the configuration. Nothing to do.");
        return Ok(());
    }

    let result = match zpr::run(app_config).await {
        Ok(result) => result,
        Err(err) => {
            print_chain(&err);
            std::process::exit(1);
        }
    };

    info!("\n{}", zpr::summary::render_summary(&result));

    if !result.is_success() {
        match result.first_error {
            Some(first) => print_chain(&anyhow::Error::new(first).context("💀 at least one archive job failed")),
            None => error!("💀 at least one archive job did not finish"),
        }
        std::process::exit(1);
    }

    Ok(())
}
