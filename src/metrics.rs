//! Per-file state and the change metrics derived from it.
//!
//! A [`FileRecord`] is one file as seen by one release. Its [`ChangeMetrics`]
//! keep, per release and per revision, the lines added, deleted and touched
//! and the size of the change set; every feature of the dataset is a read-only
//! projection over those ledgers.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::model::{Commit, CommitId, Edit, EditKind, ReleaseIndex};

/// Identity of a file across renames. Copies start a new lineage.
pub type LineageId = u64;

/// What happened to one file in one release, keyed by revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionLedger {
    pub revisions: Vec<CommitId>,
    pub loc_added: BTreeMap<CommitId, u64>,
    pub loc_deleted: BTreeMap<CommitId, u64>,
    pub loc_touched: BTreeMap<CommitId, u64>,
    /// Number of other files committed together with this one.
    pub change_set: BTreeMap<CommitId, usize>,
}

impl RevisionLedger {
    fn add_revision(&mut self, commit: &CommitId) {
        if !self.revisions.contains(commit) {
            self.revisions.push(commit.clone());
        }
    }
}

fn bump(bucket: &mut BTreeMap<CommitId, u64>, commit: &CommitId, lines: u64) {
    *bucket.entry(commit.clone()).or_insert(0) += lines;
}

fn mean(total: u64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeMetrics {
    ledgers: BTreeMap<ReleaseIndex, RevisionLedger>,
}

impl ChangeMetrics {
    pub fn ledger(&self, release: ReleaseIndex) -> Option<&RevisionLedger> {
        self.ledgers.get(&release)
    }

    pub fn has_revision_in(&self, release: ReleaseIndex) -> bool {
        self.ledgers
            .get(&release)
            .is_some_and(|ledger| !ledger.revisions.is_empty())
    }

    pub fn record_revision(&mut self, release: ReleaseIndex, commit: &CommitId) {
        self.ledgers.entry(release).or_default().add_revision(commit);
    }

    /// Buckets an edit script into added/deleted/touched lines and returns the net size change.
    pub fn record_edits(&mut self, release: ReleaseIndex, commit: &CommitId, edits: &[Edit]) -> i64 {
        let ledger = self.ledgers.entry(release).or_default();
        let mut net = 0i64;

        for edit in edits {
            let old_len = u64::from(edit.old_len);
            let new_len = u64::from(edit.new_len);
            match edit.kind {
                EditKind::Insert => {
                    net += new_len as i64;
                    bump(&mut ledger.loc_added, commit, new_len);
                }
                EditKind::Delete => {
                    net -= old_len as i64;
                    bump(&mut ledger.loc_deleted, commit, old_len);
                }
                EditKind::Replace => {
                    net += new_len as i64 - old_len as i64;
                    if new_len > old_len {
                        bump(&mut ledger.loc_added, commit, new_len - old_len);
                        bump(&mut ledger.loc_touched, commit, old_len);
                    } else if new_len < old_len {
                        bump(&mut ledger.loc_deleted, commit, old_len - new_len);
                        bump(&mut ledger.loc_touched, commit, new_len);
                    } else {
                        bump(&mut ledger.loc_touched, commit, old_len);
                    }
                }
            }
        }
        net
    }

    pub fn record_change_set(&mut self, release: ReleaseIndex, commit: &CommitId, others: usize) {
        self.ledgers
            .entry(release)
            .or_default()
            .change_set
            .insert(commit.clone(), others);
    }

    fn sum(&self, release: ReleaseIndex, pick: fn(&RevisionLedger) -> &BTreeMap<CommitId, u64>) -> u64 {
        self.ledgers
            .get(&release)
            .map_or(0, |ledger| pick(ledger).values().sum())
    }

    pub fn revision_count(&self, release: ReleaseIndex) -> usize {
        self.ledgers.get(&release).map_or(0, |ledger| ledger.revisions.len())
    }

    pub fn loc_added(&self, release: ReleaseIndex) -> u64 {
        self.sum(release, |ledger| &ledger.loc_added)
    }

    pub fn loc_deleted(&self, release: ReleaseIndex) -> u64 {
        self.sum(release, |ledger| &ledger.loc_deleted)
    }

    pub fn loc_modified(&self, release: ReleaseIndex) -> u64 {
        self.sum(release, |ledger| &ledger.loc_touched)
    }

    /// Added + deleted + touched lines in the release.
    pub fn loc_touched(&self, release: ReleaseIndex) -> u64 {
        self.loc_added(release) + self.loc_deleted(release) + self.loc_modified(release)
    }

    pub fn max_loc_added(&self, release: ReleaseIndex) -> u64 {
        self.ledgers
            .get(&release)
            .and_then(|ledger| ledger.loc_added.values().max().copied())
            .unwrap_or(0)
    }

    pub fn avg_loc_added(&self, release: ReleaseIndex) -> f64 {
        let count = self.ledgers.get(&release).map_or(0, |ledger| ledger.loc_added.len());
        mean(self.loc_added(release), count)
    }

    /// `|added - deleted|` over the release.
    pub fn churn(&self, release: ReleaseIndex) -> u64 {
        self.loc_added(release).abs_diff(self.loc_deleted(release))
    }

    /// Revisions that added or deleted at least one bucketed line.
    fn churn_revisions(&self, release: ReleaseIndex) -> BTreeSet<&CommitId> {
        self.ledgers
            .get(&release)
            .map(|ledger| ledger.loc_added.keys().chain(ledger.loc_deleted.keys()).collect())
            .unwrap_or_default()
    }

    pub fn max_churn(&self, release: ReleaseIndex) -> u64 {
        let Some(ledger) = self.ledgers.get(&release) else {
            return 0;
        };
        self.churn_revisions(release)
            .into_iter()
            .map(|commit| {
                let added = ledger.loc_added.get(commit).copied().unwrap_or(0);
                let deleted = ledger.loc_deleted.get(commit).copied().unwrap_or(0);
                added.abs_diff(deleted)
            })
            .max()
            .unwrap_or(0)
    }

    pub fn avg_churn(&self, release: ReleaseIndex) -> f64 {
        mean(self.churn(release), self.churn_revisions(release).len())
    }

    /// Sum of co-committed file counts across the release's revisions.
    pub fn change_set_size(&self, release: ReleaseIndex) -> usize {
        self.ledgers
            .get(&release)
            .map_or(0, |ledger| ledger.change_set.values().sum())
    }

    pub fn max_change_set(&self, release: ReleaseIndex) -> usize {
        self.ledgers
            .get(&release)
            .and_then(|ledger| ledger.change_set.values().max().copied())
            .unwrap_or(0)
    }

    pub fn avg_change_set(&self, release: ReleaseIndex) -> f64 {
        let count = self.ledgers.get(&release).map_or(0, |ledger| ledger.change_set.len());
        mean(self.change_set_size(release) as u64, count)
    }
}

/// One file as of one release.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub filename: String,
    /// Lineage ids from the oldest ancestor to this record's own id.
    pub lineage: Vec<LineageId>,
    pub created_by: CommitId,
    pub created_at: DateTime<Utc>,
    /// Lines of code, as accumulated from edit scripts.
    pub size: i64,
    pub age_weeks: i64,
    pub authors: BTreeSet<String>,
    pub fix_count: u32,
    pub deleted: bool,
    pub last_modified: Option<DateTime<Utc>>,
    pub metrics: ChangeMetrics,
    buggy: BTreeSet<ReleaseIndex>,
}

impl FileRecord {
    pub fn new(filename: &str, lineage: LineageId, release: ReleaseIndex, commit: &Commit) -> Self {
        let mut metrics = ChangeMetrics::default();
        metrics.record_revision(release, &commit.id);
        Self {
            filename: filename.to_string(),
            lineage: vec![lineage],
            created_by: commit.id.clone(),
            created_at: commit.author_date,
            size: 0,
            age_weeks: 0,
            authors: BTreeSet::from([commit.author.clone()]),
            fix_count: 0,
            deleted: false,
            last_modified: None,
            metrics,
            buggy: BTreeSet::new(),
        }
    }

    pub fn identity(&self) -> LineageId {
        self.lineage.last().copied().unwrap_or_default()
    }

    /// Independent copy under a new name and lineage, keeping all accrued history.
    pub fn copy_as(&self, filename: &str, lineage: LineageId) -> Self {
        let mut copy = self.clone();
        copy.filename = filename.to_string();
        copy.lineage.push(lineage);
        copy
    }

    pub fn apply_edits(&mut self, release: ReleaseIndex, commit: &CommitId, edits: &[Edit]) {
        self.size += self.metrics.record_edits(release, commit, edits);
    }

    /// Records a modifying revision. `affected` are the releases affected by the bugs
    /// this commit fixes; those in which the file already has a revision become buggy.
    /// Returns the releases newly marked buggy.
    pub fn record_modification(
        &mut self,
        release: ReleaseIndex,
        commit: &Commit,
        affected: &[ReleaseIndex],
    ) -> Vec<ReleaseIndex> {
        self.last_modified = Some(commit.author_date);
        self.metrics.record_revision(release, &commit.id);
        self.authors.insert(commit.author.clone());

        let mut marked = Vec::new();
        for &affected_release in affected {
            if self.metrics.has_revision_in(affected_release) {
                self.fix_count += 1;
                if self.buggy.insert(affected_release) {
                    marked.push(affected_release);
                }
            }
        }
        marked
    }

    pub fn mark_buggy(&mut self, release: ReleaseIndex) {
        self.buggy.insert(release);
    }

    pub fn is_buggy(&self, release: ReleaseIndex) -> bool {
        self.buggy.contains(&release)
    }

    pub fn buggy_releases(&self) -> &BTreeSet<ReleaseIndex> {
        &self.buggy
    }

    pub fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted = true;
        self.refresh_age(at);
    }

    /// Age in whole weeks between the creation day and `at`.
    pub fn refresh_age(&mut self, at: DateTime<Utc>) {
        self.age_weeks = (at.date_naive() - self.created_at.date_naive()).num_weeks();
    }

    pub fn author_count(&self) -> usize {
        self.authors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn commit(id: &str, author: &str, day: u32) -> Commit {
        Commit {
            id: CommitId::from(id),
            author_date: Utc.with_ymd_and_hms(2020, 1, day, 12, 0, 0).unwrap(),
            author: author.into(),
            message: String::new(),
        }
    }

    #[test]
    fn insert_then_delete_keeps_buckets_apart() {
        let c1 = commit("c1", "ann", 1);
        let c2 = commit("c2", "ann", 2);
        let mut file = FileRecord::new("A.java", 1, 1, &c1);

        file.apply_edits(1, &c1.id, &[Edit::insert(10)]);
        assert_eq!(file.size, 10);

        file.apply_edits(1, &c2.id, &[Edit::delete(4)]);
        assert_eq!(file.size, 6);
        assert_eq!(file.metrics.loc_added(1), 10);
        assert_eq!(file.metrics.loc_deleted(1), 4);
        assert_eq!(file.metrics.churn(1), 6);
        assert_eq!(file.metrics.loc_touched(1), 14);
    }

    #[test]
    fn replacements_split_into_surplus_and_touched() {
        let c1 = commit("c1", "ann", 1);
        let mut file = FileRecord::new("A.java", 1, 1, &c1);

        file.apply_edits(
            1,
            &c1.id,
            &[Edit::replace(2, 5), Edit::replace(6, 1), Edit::replace(3, 3)],
        );

        assert_eq!(file.size, 3 - 5);
        assert_eq!(file.metrics.loc_added(1), 3);
        assert_eq!(file.metrics.loc_deleted(1), 5);
        assert_eq!(file.metrics.loc_modified(1), 2 + 1 + 3);
        assert_eq!(file.metrics.loc_touched(1), 3 + 5 + 6);
    }

    #[test]
    fn per_revision_aggregates() {
        let c1 = commit("c1", "ann", 1);
        let c2 = commit("c2", "bob", 2);
        let c3 = commit("c3", "bob", 3);
        let mut file = FileRecord::new("A.java", 1, 1, &c1);

        file.apply_edits(1, &c1.id, &[Edit::insert(8)]);
        file.apply_edits(1, &c2.id, &[Edit::insert(2), Edit::delete(5)]);
        file.apply_edits(1, &c3.id, &[Edit::delete(1)]);

        assert_eq!(file.metrics.max_loc_added(1), 8);
        assert_eq!(file.metrics.avg_loc_added(1), 5.0);
        assert_eq!(file.metrics.churn(1), 4);
        assert_eq!(file.metrics.max_churn(1), 8);
        assert!((file.metrics.avg_churn(1) - 4.0 / 3.0).abs() < 1e-9);

        file.metrics.record_change_set(1, &c1.id, 2);
        file.metrics.record_change_set(1, &c2.id, 0);
        assert_eq!(file.metrics.change_set_size(1), 2);
        assert_eq!(file.metrics.max_change_set(1), 2);
        assert_eq!(file.metrics.avg_change_set(1), 1.0);

        assert_eq!(file.metrics.revision_count(2), 0);
        assert_eq!(file.metrics.avg_churn(2), 0.0);
    }

    #[test]
    fn fixes_only_mark_releases_the_file_lived_in() {
        let c1 = commit("c1", "ann", 1);
        let fix = commit("fix", "bob", 20);
        let mut file = FileRecord::new("A.java", 1, 2, &c1);

        let marked = file.record_modification(3, &fix, &[1, 2]);

        assert_eq!(marked, vec![2]);
        assert_eq!(file.fix_count, 1);
        assert!(file.is_buggy(2));
        assert!(!file.is_buggy(1));
        assert_eq!(file.author_count(), 2);
        assert_eq!(file.metrics.revision_count(3), 1);
        assert_eq!(file.last_modified, Some(fix.author_date));
    }

    #[test]
    fn clones_are_deep() {
        let c1 = commit("c1", "ann", 1);
        let mut original = FileRecord::new("A.java", 1, 1, &c1);
        original.apply_edits(1, &c1.id, &[Edit::insert(3)]);

        let carried = original.clone();
        original.apply_edits(1, &CommitId::from("c2"), &[Edit::insert(7)]);
        original.mark_buggy(1);

        assert_eq!(carried.size, 3);
        assert_eq!(carried.metrics.loc_added(1), 3);
        assert!(!carried.is_buggy(1));
    }

    #[test]
    fn copies_extend_the_lineage() {
        let c1 = commit("c1", "ann", 1);
        let file = FileRecord::new("A.java", 7, 1, &c1);
        let copy = file.copy_as("B.java", 9);

        assert_eq!(copy.lineage, vec![7, 9]);
        assert_eq!(copy.identity(), 9);
        assert_eq!(copy.created_by, file.created_by);
    }

    #[test]
    fn age_counts_whole_weeks() {
        let c1 = commit("c1", "ann", 1);
        let mut file = FileRecord::new("A.java", 1, 1, &c1);
        file.refresh_age(Utc.with_ymd_and_hms(2020, 1, 21, 0, 0, 0).unwrap());
        assert_eq!(file.age_weeks, 2);

        file.mark_deleted(Utc.with_ymd_and_hms(2020, 1, 29, 0, 0, 0).unwrap());
        assert!(file.deleted);
        assert_eq!(file.age_weeks, 4);
    }
}
