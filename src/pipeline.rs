//! End-to-end mining: releases, bugs, file lineage, dataset.

use chrono::NaiveDate;
use indicatif::ProgressBar;
use tracing::info;

use crate::bugs::{BugLifecycleResolver, Resolution};
use crate::commits::assign_commits;
use crate::dataset::{DatasetAssembler, DatasetRow, Schema};
use crate::error::{Diagnostics, MinerError, Result};
use crate::lineage::{FileLineageTracker, ReleaseSnapshot};
use crate::linkage::TicketLinker;
use crate::releases::ReleaseWindowIndex;
use crate::tracker::IssueTracker;
use crate::vcs::VersionControl;

pub const DEFAULT_COLD_START_PROPORTION: f64 = 0.68;

/// Where the release list comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReleaseSource {
    /// Released versions of the issue tracker
    #[default]
    Tracker,
    /// Tags of the repository, dated by their tagged commit
    Tags,
}

/// Everything a run needs to know, independent of how it was parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct MinerConfig {
    pub project: String,
    /// Exclusive end of the analysed history.
    pub cutoff: NaiveDate,
    pub cold_start_proportion: f64,
    pub reliable_only: bool,
    pub schema: Schema,
    pub release_source: ReleaseSource,
}

impl MinerConfig {
    pub fn new(project: &str, cutoff: NaiveDate) -> Self {
        Self {
            project: project.to_string(),
            cutoff,
            cold_start_proportion: DEFAULT_COLD_START_PROPORTION,
            reliable_only: true,
            schema: Schema::Compact,
            release_source: ReleaseSource::Tracker,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            return Err(MinerError::InvalidConfiguration("project key is empty".into()));
        }
        if !self.cold_start_proportion.is_finite() || self.cold_start_proportion < 0.0 {
            return Err(MinerError::InvalidConfiguration(format!(
                "cold-start proportion must be a non-negative number, got {}",
                self.cold_start_proportion
            )));
        }
        Ok(())
    }
}

/// Configuration and release index of one analysis, shared by every stage.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub config: MinerConfig,
    pub releases: ReleaseWindowIndex,
}

impl AnalysisContext {
    pub fn new(config: MinerConfig, releases: ReleaseWindowIndex) -> Self {
        Self { config, releases }
    }

    pub fn resolver(&self) -> BugLifecycleResolver<'_> {
        BugLifecycleResolver::new(&self.releases, self.config.cold_start_proportion)
    }

    pub fn assembler(&self) -> DatasetAssembler<'_> {
        DatasetAssembler::new(&self.config.project, &self.releases)
            .reliable_only(self.config.reliable_only)
    }
}

#[derive(Debug)]
pub struct MiningOutcome {
    pub context: AnalysisContext,
    pub rows: Vec<DatasetRow>,
    pub snapshots: Vec<ReleaseSnapshot>,
    pub resolution: Resolution,
    pub diagnostics: Diagnostics,
    /// Percentage of commits linked to a bug ticket.
    pub linkage_ratio: f64,
}

impl MiningOutcome {
    pub fn buggy_rows(&self) -> usize {
        self.rows.iter().filter(|row| row.buggy).count()
    }
}

pub fn mine<V, T>(config: MinerConfig, vcs: &V, tracker: &T, progress: ProgressBar) -> Result<MiningOutcome>
where
    V: VersionControl + ?Sized,
    T: IssueTracker + ?Sized,
{
    config.validate()?;

    let versions = match config.release_source {
        ReleaseSource::Tracker => tracker.released_versions()?,
        ReleaseSource::Tags => vcs.release_tags()?,
    };
    let releases = ReleaseWindowIndex::new(versions, config.cutoff)?;
    info!(
        project = %config.project,
        releases = releases.len(),
        cutoff = %config.cutoff,
        "Built release windows"
    );
    let context = AnalysisContext::new(config, releases);
    let mut diagnostics = Diagnostics::new();

    let issues = tracker.fixed_bugs()?;
    let commits = vcs.commits(context.config.cutoff)?;

    let linkage = TicketLinker::new()?.link(issues, &commits, &mut diagnostics);
    let linkage_ratio = linkage.ratio();
    let resolution = context.resolver().resolve(linkage.issues, &mut diagnostics);

    let by_release = assign_commits(commits, &context.releases);
    let mut lineage = FileLineageTracker::new(resolution.affected_by_fix_commit()).with_progress(progress);
    lineage.track(vcs, &by_release, &mut diagnostics)?;
    let snapshots = lineage.into_snapshots();

    let rows = context.assembler().assemble(&snapshots);

    let outcome = MiningOutcome { context, rows, snapshots, resolution, diagnostics, linkage_ratio };
    info!(
        rows = outcome.rows.len(),
        buggy = outcome.buggy_rows(),
        bugs = outcome.resolution.bugs.len(),
        linkage = %format!("{:.2}%", outcome.linkage_ratio),
        "Mining finished"
    );
    outcome.diagnostics.log_summary();
    Ok(outcome)
}
