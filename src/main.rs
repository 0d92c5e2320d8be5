// src/main.rs

use clap::Parser;
use defect_miner::cli::{self, Args};
use defect_miner::dataset::write_csv;
use defect_miner::error::Result;
use defect_miner::pipeline;
use defect_miner::tracker::JiraClient;
use defect_miner::vcs::GitRepository;
use std::fs::{self, File};
use std::io::BufWriter;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};

fn run(args: &Args) -> Result<()> {
    let start_time = Instant::now();
    let config = args.to_config();
    let schema = config.schema;

    let repo = GitRepository::open(&args.repo, &args.extension)?;
    let jira = JiraClient::new(&args.jira_url, &args.project);
    let outcome = pipeline::mine(config, &repo, &jira, cli::replay_progress())?;

    fs::create_dir_all(&args.output)?;
    let path = args.dataset_path();
    let mut writer = BufWriter::new(File::create(&path)?);
    write_csv(&mut writer, &outcome.rows, schema)?;

    info!(
        path = %path.display(),
        rows = outcome.rows.len(),
        elapsed = ?start_time.elapsed(),
        "Dataset written"
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    cli::init_tracing(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Error mining {}: {}", args.project, e);
            ExitCode::FAILURE
        }
    }
}
