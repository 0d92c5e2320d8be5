// src/vcs.rs

use crate::error::{MinerError, Result};
use crate::model::*;
use chrono::{DateTime, NaiveDate, Utc};
use git2::{Delta, DiffFindOptions, DiffOptions, Oid, Patch, Repository, Tree};
use std::path::Path;
use tracing::{debug, info};

/// The version-control queries the miner relies on
pub trait VersionControl {
    /// Release tags with the author date of the tagged commit
    fn release_tags(&self) -> Result<Vec<(ReleaseName, NaiveDate)>>;

    /// Every commit authored before `until`, oldest first
    fn commits(&self, until: NaiveDate) -> Result<Vec<Commit>>;

    /// Source-file changes between two commits; `from = None` diffs against the empty tree
    fn diff(&self, from: Option<&CommitId>, to: &CommitId) -> Result<Vec<DiffEntry>>;
}

/// A git working copy read through libgit2
pub struct GitRepository {
    repo: Repository,
    extension: String,
}

impl GitRepository {
    pub fn open(path: &Path, extension: &str) -> Result<Self> {
        let repo = Repository::open(path)?;
        info!(repo = %path.display(), extension, "Opened repository");
        Ok(Self { repo, extension: extension.to_string() })
    }

    fn is_source(&self, path: Option<&str>) -> bool {
        path.is_some_and(|p| p.ends_with(&self.extension))
    }

    fn tree_of(&self, id: &CommitId) -> Result<Tree<'_>> {
        let oid = Oid::from_str(id.as_str())?;
        Ok(self.repo.find_commit(oid)?.tree()?)
    }
}

fn author_date(commit: &git2::Commit) -> Result<DateTime<Utc>> {
    let seconds = commit.author().when().seconds();
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
        MinerError::InvalidConfiguration(format!("commit {} has an invalid author time", commit.id()))
    })
}

impl VersionControl for GitRepository {
    fn release_tags(&self) -> Result<Vec<(ReleaseName, NaiveDate)>> {
        let mut tags = Vec::new();
        let names = self.repo.tag_names(None)?;
        for name in names.iter().flatten() {
            let object = self.repo.revparse_single(&format!("refs/tags/{name}"))?;
            let commit = object.peel_to_commit()?;
            tags.push((name.to_string(), author_date(&commit)?.date_naive()));
        }
        tags.sort_by_key(|(_, date)| *date);
        Ok(tags)
    }

    fn commits(&self, until: NaiveDate) -> Result<Vec<Commit>> {
        // Collect all commits and sort them chronologically
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(git2::Sort::TIME)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;
            let author_date = author_date(&commit)?;
            if author_date.date_naive() >= until {
                continue;
            }
            commits.push(Commit {
                id: CommitId(commit.id().to_string()),
                author_date,
                author: commit.author().name().unwrap_or("Unknown").to_string(),
                message: commit.message().unwrap_or_default().to_string(),
            });
        }
        // Walk from the first commit to the last
        commits.sort_by_key(|commit| commit.author_date);
        debug!(count = commits.len(), %until, "Collected commits");
        Ok(commits)
    }

    fn diff(&self, from: Option<&CommitId>, to: &CommitId) -> Result<Vec<DiffEntry>> {
        let old_tree = from.map(|id| self.tree_of(id)).transpose()?;
        let new_tree = self.tree_of(to)?;

        let mut diff_opts = DiffOptions::new();
        diff_opts.ignore_filemode(true);
        diff_opts.context_lines(0);

        let mut diff = self
            .repo
            .diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), Some(&mut diff_opts))?;

        let mut find_opts = DiffFindOptions::new();
        find_opts.renames(true);
        find_opts.copies(true);
        diff.find_similar(Some(&mut find_opts))?;

        let mut entries = Vec::new();
        for (idx, delta) in diff.deltas().enumerate() {
            let old_path = delta.old_file().path().and_then(|p| p.to_str()).map(String::from);
            let new_path = delta.new_file().path().and_then(|p| p.to_str()).map(String::from);
            if !self.is_source(old_path.as_deref()) && !self.is_source(new_path.as_deref()) {
                continue;
            }

            let change = match delta.status() {
                Delta::Added => ChangeKind::Add,
                Delta::Modified => ChangeKind::Modify,
                Delta::Deleted => ChangeKind::Delete,
                Delta::Renamed => ChangeKind::Rename,
                Delta::Copied => ChangeKind::Copy,
                _ => continue,
            };

            // With zero context lines every hunk is a single edit region
            let mut edits = Vec::new();
            if let Some(patch) = Patch::from_diff(&diff, idx)? {
                for hunk_idx in 0..patch.num_hunks() {
                    let (hunk, _) = patch.hunk(hunk_idx)?;
                    edits.extend(Edit::from_lengths(hunk.old_lines(), hunk.new_lines()));
                }
            }

            // libgit2 fills both sides even for additions and deletions
            let (old_path, new_path) = match change {
                ChangeKind::Add => (None, new_path),
                ChangeKind::Delete => (old_path, None),
                _ => (old_path, new_path),
            };
            entries.push(DiffEntry { change, old_path, new_path, edits });
        }
        Ok(entries)
    }
}
