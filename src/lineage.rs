//! File lineage across releases.
//!
//! Releases are replayed oldest first and, inside a release, commit by commit.
//! Each commit is diffed against the previously replayed one and its entries
//! are applied to the current release's snapshot. A new release starts from a
//! deep copy of the previous snapshot, so a closed release is never touched
//! again except for buggy labels discovered by later fixes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use tracing::{debug, info, trace};

use crate::commits::CommitsByRelease;
use crate::error::{Anomaly, Diagnostics, Result};
use crate::metrics::{FileRecord, LineageId};
use crate::model::{ChangeKind, Commit, CommitId, DiffEntry, ReleaseIndex};
use crate::vcs::VersionControl;

/// Live files of one release.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseSnapshot {
    pub release: ReleaseIndex,
    files: BTreeMap<String, FileRecord>,
    /// Records deleted while this release was open.
    retired: Vec<FileRecord>,
}

impl ReleaseSnapshot {
    fn new(release: ReleaseIndex) -> Self {
        Self { release, ..Self::default() }
    }

    /// Live files in filename order.
    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    pub fn get(&self, filename: &str) -> Option<&FileRecord> {
        self.files.get(filename)
    }

    pub fn retired(&self) -> &[FileRecord] {
        &self.retired
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The live record descending from the nearest ancestor in `lineage`.
    fn find_lineage_mut(&mut self, lineage: &[LineageId]) -> Option<&mut FileRecord> {
        let depth = |record: &FileRecord| lineage.iter().rposition(|id| *id == record.identity());
        self.files
            .values_mut()
            .filter_map(|record| depth(&*record).map(|d| (d, record)))
            .max_by_key(|(d, _)| *d)
            .map(|(_, record)| record)
    }
}

pub struct FileLineageTracker {
    affected_by_fix: BTreeMap<CommitId, Vec<ReleaseIndex>>,
    snapshots: Vec<ReleaseSnapshot>,
    change_set: BTreeSet<String>,
    previous: Option<CommitId>,
    next_lineage: LineageId,
    progress: ProgressBar,
}

impl FileLineageTracker {
    /// `affected_by_fix` maps each bug-fix commit to the releases its bugs affected.
    pub fn new(affected_by_fix: BTreeMap<CommitId, Vec<ReleaseIndex>>) -> Self {
        Self {
            affected_by_fix,
            snapshots: Vec::new(),
            change_set: BTreeSet::new(),
            previous: None,
            next_lineage: 1,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn snapshots(&self) -> &[ReleaseSnapshot] {
        &self.snapshots
    }

    pub fn into_snapshots(self) -> Vec<ReleaseSnapshot> {
        self.snapshots
    }

    pub fn track<V: VersionControl + ?Sized>(
        &mut self,
        vcs: &V,
        commits: &CommitsByRelease,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        self.progress.set_length(commits.values().map(|c| c.len() as u64).sum());
        self.progress.set_message("Replaying commits");

        for (&release, release_commits) in commits {
            self.open_release(release);

            for commit in release_commits {
                let entries = vcs.diff(self.previous.as_ref(), &commit.id)?;
                self.apply_commit(release, commit, &entries, diagnostics);
                self.previous = Some(commit.id.clone());
                self.progress.inc(1);
            }

            if let Some(last) = release_commits.last() {
                self.close_release(last.author_date);
            }
            debug!(
                release,
                commits = release_commits.len(),
                files = self.snapshots.last().map_or(0, ReleaseSnapshot::len),
                "Release replayed"
            );
        }

        self.progress.finish_with_message("Replay complete");
        info!(releases = self.snapshots.len(), "File lineage tracked");
        Ok(())
    }

    /// Starts a release from a deep copy of the previous release's live files.
    pub fn open_release(&mut self, release: ReleaseIndex) {
        let mut snapshot = ReleaseSnapshot::new(release);
        if let Some(previous) = self.snapshots.last() {
            snapshot.files = previous
                .files
                .iter()
                .filter(|(_, record)| !record.deleted)
                .map(|(name, record)| (name.clone(), record.clone()))
                .collect();
        }
        self.snapshots.push(snapshot);
    }

    /// Recomputes the age of every live file as of the release's last commit.
    pub fn close_release(&mut self, last_commit: DateTime<Utc>) {
        if let Some(current) = self.snapshots.last_mut() {
            for record in current.files.values_mut() {
                record.refresh_age(last_commit);
            }
        }
    }

    pub fn apply_commit(
        &mut self,
        release: ReleaseIndex,
        commit: &Commit,
        entries: &[DiffEntry],
        diagnostics: &mut Diagnostics,
    ) {
        if self.snapshots.last().map(|s| s.release) != Some(release) {
            self.open_release(release);
        }
        self.change_set.clear();

        for entry in entries {
            let applied = match entry.change {
                ChangeKind::Add => {
                    self.add(release, commit, entry);
                    true
                }
                ChangeKind::Modify => self.modify(release, commit, entry),
                ChangeKind::Delete => self.delete(commit, entry),
                ChangeKind::Rename => self.rename(entry),
                ChangeKind::Copy => self.copy(entry),
            };
            if !applied {
                diagnostics.record(Anomaly::OrphanDiffEntry {
                    commit: commit.id.clone(),
                    change: entry.change,
                    path: entry.old_path.clone().unwrap_or_else(|| entry.path().to_string()),
                });
            }
        }

        let others = self.change_set.len().saturating_sub(1);
        if let Some(current) = self.snapshots.last_mut() {
            for name in &self.change_set {
                if let Some(record) = current.files.get_mut(name) {
                    record.metrics.record_change_set(release, &commit.id, others);
                }
            }
        }
        self.change_set.clear();
    }

    fn current(&mut self) -> &mut ReleaseSnapshot {
        if self.snapshots.is_empty() {
            self.snapshots.push(ReleaseSnapshot::new(1));
        }
        let last = self.snapshots.len() - 1;
        &mut self.snapshots[last]
    }

    fn allocate_lineage(&mut self) -> LineageId {
        let id = self.next_lineage;
        self.next_lineage += 1;
        id
    }

    fn add(&mut self, release: ReleaseIndex, commit: &Commit, entry: &DiffEntry) {
        let Some(path) = entry.new_path.as_deref() else {
            return;
        };
        if self.current().files.contains_key(path) {
            trace!(path, "Add of a file that is already live");
            return;
        }

        let lineage = self.allocate_lineage();
        let mut record = FileRecord::new(path, lineage, release, commit);
        record.apply_edits(release, &commit.id, &entry.edits);
        self.current().files.insert(path.to_string(), record);
        self.change_set.insert(path.to_string());
    }

    fn modify(&mut self, release: ReleaseIndex, commit: &Commit, entry: &DiffEntry) -> bool {
        let path = entry.path().to_string();
        let affected = self.affected_by_fix.get(&commit.id).cloned().unwrap_or_default();

        let Some(record) = self.current().files.get_mut(&path) else {
            return false;
        };
        if record.last_modified.is_some_and(|last| last >= commit.author_date) {
            debug!(path = %path, commit = %commit.id, "Modification not newer than the last one");
            return true;
        }

        let marked = record.record_modification(release, commit, &affected);
        record.apply_edits(release, &commit.id, &entry.edits);
        let lineage = record.lineage.clone();

        self.change_set.insert(path);
        self.propagate_labels(&lineage, &marked);
        true
    }

    /// Writes buggy labels found by a fix into the closed snapshots of the same lineage.
    fn propagate_labels(&mut self, lineage: &[LineageId], marked: &[ReleaseIndex]) {
        let Some((_, closed)) = self.snapshots.split_last_mut() else {
            return;
        };
        for &buggy in marked {
            for snapshot in closed.iter_mut().filter(|s| s.release >= buggy) {
                if let Some(record) = snapshot.find_lineage_mut(lineage) {
                    record.mark_buggy(buggy);
                }
            }
        }
    }

    fn delete(&mut self, commit: &Commit, entry: &DiffEntry) -> bool {
        let Some(path) = entry.old_path.as_deref() else {
            return false;
        };
        let current = self.current();
        let Some(mut record) = current.files.remove(path) else {
            return false;
        };
        record.mark_deleted(commit.author_date);
        current.retired.push(record);
        true
    }

    fn rename(&mut self, entry: &DiffEntry) -> bool {
        let (Some(from), Some(to)) = (entry.old_path.as_deref(), entry.new_path.as_deref()) else {
            return false;
        };
        let current = self.current();
        let Some(mut record) = current.files.remove(from) else {
            return false;
        };
        record.filename = to.to_string();
        if current.files.insert(to.to_string(), record).is_some() {
            debug!(from, to, "Rename replaced a live file");
        }
        self.change_set.insert(to.to_string());
        true
    }

    fn copy(&mut self, entry: &DiffEntry) -> bool {
        let (Some(from), Some(to)) = (entry.old_path.as_deref(), entry.new_path.as_deref()) else {
            return false;
        };
        let lineage = self.allocate_lineage();
        let current = self.current();
        let Some(source) = current.files.get(from) else {
            return false;
        };
        let copy = source.copy_as(to, lineage);
        current.files.entry(to.to_string()).or_insert(copy);
        self.change_set.insert(to.to_string());
        true
    }
}
