// src/cli.rs

use chrono::{NaiveDate, Utc};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::dataset::Schema;
use crate::pipeline::{MinerConfig, ReleaseSource, DEFAULT_COLD_START_PROPORTION};
use crate::tracker::DEFAULT_JIRA_URL;

#[derive(Parser, Debug)]
#[command(author, version, about = "Mines a per-release defect dataset from git history and Jira", long_about = None)]
pub struct Args {
    /// Jira project key, also used to name the output file
    #[arg(short, long, env = "DEFECT_MINER_PROJECT")]
    pub project: String,

    /// Path to the git repository to analyze
    #[arg(short, long)]
    pub repo: PathBuf,

    /// Directory the dataset is written to
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// End of the analysed history (YYYY-MM-DD, exclusive); defaults to today
    #[arg(long, env = "DEFECT_MINER_CUTOFF")]
    pub cutoff: Option<NaiveDate>,

    /// Base URL of the Jira instance
    #[arg(long, default_value = DEFAULT_JIRA_URL)]
    pub jira_url: String,

    /// Only files with this suffix are tracked
    #[arg(long, default_value = ".java")]
    pub extension: String,

    /// Proportion used before any release offers a usable sample
    #[arg(long, default_value_t = DEFAULT_COLD_START_PROPORTION)]
    pub cold_start_proportion: f64,

    /// Where the release list comes from
    #[arg(long, value_enum, default_value_t = Versions::Jira)]
    pub versions: Versions,

    /// Keep every release instead of the first half
    #[arg(long)]
    pub all_releases: bool,

    /// Add the MAX_* columns
    #[arg(long)]
    pub extended: bool,

    /// Log debug events
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum Versions {
    /// Released versions of the Jira project
    Jira,
    /// Tags of the git repository
    Tags,
}

impl Args {
    pub fn to_config(&self) -> MinerConfig {
        let cutoff = self.cutoff.unwrap_or_else(|| Utc::now().date_naive());
        let mut config = MinerConfig::new(&self.project, cutoff);
        config.cold_start_proportion = self.cold_start_proportion;
        config.reliable_only = !self.all_releases;
        config.schema = if self.extended { Schema::Extended } else { Schema::Compact };
        config.release_source = match self.versions {
            Versions::Jira => ReleaseSource::Tracker,
            Versions::Tags => ReleaseSource::Tags,
        };
        config
    }

    /// `<output>/<PROJECT>.csv`
    pub fn dataset_path(&self) -> PathBuf {
        self.output.join(format!("{}.csv", self.project))
    }
}

/// Installs the fmt subscriber; `RUST_LOG` takes precedence over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

pub fn replay_progress() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} commits ({eta})") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}
