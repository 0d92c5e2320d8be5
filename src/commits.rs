//! Commit-to-release partitioning.

use std::collections::BTreeMap;

use tracing::debug;

use crate::model::{Commit, ReleaseIndex};
use crate::releases::ReleaseWindowIndex;

/// Commits of every release, oldest first. Every release of the index has an entry.
pub type CommitsByRelease = BTreeMap<ReleaseIndex, Vec<Commit>>;

/// Buckets commits into their release windows, oldest to newest within each release.
/// Commits outside every window are dropped.
pub fn assign_commits(commits: Vec<Commit>, releases: &ReleaseWindowIndex) -> CommitsByRelease {
    let mut buckets: CommitsByRelease = (1..=releases.len()).map(|i| (i, Vec::new())).collect();
    let mut dropped = 0usize;

    for commit in commits {
        match releases.index_for(commit.day()) {
            Some(index) => buckets.entry(index).or_default().push(commit),
            None => dropped += 1,
        }
    }

    for commits in buckets.values_mut() {
        // Stable sort keeps the incoming order for commits sharing a timestamp.
        commits.sort_by_key(|commit| commit.author_date);
    }

    if dropped > 0 {
        debug!(dropped, "Commits outside every release window");
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CommitId;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn commit(id: &str, y: i32, m: u32, d: u32, h: u32) -> Commit {
        Commit {
            id: CommitId::from(id),
            author_date: Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap(),
            author: "dev".into(),
            message: String::new(),
        }
    }

    fn releases() -> ReleaseWindowIndex {
        ReleaseWindowIndex::new(
            vec![
                ("1.0".into(), NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()),
                ("1.1".into(), NaiveDate::from_ymd_opt(2020, 6, 1).unwrap()),
            ],
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn commits_land_in_their_window_in_chronological_order() {
        let commits = vec![
            commit("c3", 2020, 7, 1, 9),
            commit("c2", 2020, 3, 1, 12),
            commit("c1", 2020, 3, 1, 8),
            commit("early", 2019, 12, 31, 23),
            commit("late", 2021, 1, 1, 0),
        ];

        let buckets = assign_commits(commits, &releases());

        let ids = |r: ReleaseIndex| -> Vec<String> {
            buckets[&r].iter().map(|c| c.id.to_string()).collect()
        };
        assert_eq!(ids(1), vec!["c1", "c2"]);
        assert_eq!(ids(2), vec!["c3"]);
        assert_eq!(buckets.len(), 2);
    }

    #[test]
    fn empty_releases_still_get_a_bucket() {
        let buckets = assign_commits(vec![commit("c1", 2020, 2, 1, 0)], &releases());
        assert_eq!(buckets[&1].len(), 1);
        assert!(buckets[&2].is_empty());
    }
}
