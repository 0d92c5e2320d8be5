//! Per-release defect datasets mined from a git history and an issue tracker.
//!
//! Bug tickets are linked to their fix commits, their injected releases are
//! resolved (or estimated with the proportion method), and every source file
//! is replayed through the history to collect change metrics and buggy labels
//! for each release.

pub mod bugs;
pub mod cli;
pub mod commits;
pub mod dataset;
pub mod error;
pub mod lineage;
pub mod linkage;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod releases;
pub mod tracker;
pub mod vcs;

pub use error::{Anomaly, Diagnostics, MinerError, Result};
pub use pipeline::{mine, AnalysisContext, MinerConfig, MiningOutcome, ReleaseSource};
