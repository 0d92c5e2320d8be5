//! Release windows.
//!
//! Releases are sorted by date and turned into contiguous half-open windows
//! `[start, end)`. Each window ends where the next release starts; the last one
//! ends at the analysis cutoff.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::{MinerError, Result};
use crate::model::{ReleaseIndex, ReleaseName};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub name: ReleaseName,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Release {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

#[derive(Debug, Clone)]
pub struct ReleaseWindowIndex {
    releases: Vec<Release>,
    by_name: HashMap<ReleaseName, ReleaseIndex>,
    cutoff: NaiveDate,
}

impl ReleaseWindowIndex {
    pub fn new(mut tags: Vec<(ReleaseName, NaiveDate)>, cutoff: NaiveDate) -> Result<Self> {
        if tags.is_empty() {
            return Err(MinerError::InvalidConfiguration("release list is empty".into()));
        }
        tags.sort_by_key(|(_, date)| *date);

        let last_date = tags[tags.len() - 1].1;
        if cutoff < last_date {
            return Err(MinerError::InvalidConfiguration(format!(
                "cutoff {cutoff} precedes the last release date {last_date}"
            )));
        }

        let mut by_name = HashMap::with_capacity(tags.len());
        for (i, (name, _)) in tags.iter().enumerate() {
            if by_name.insert(name.clone(), i + 1).is_some() {
                return Err(MinerError::InvalidConfiguration(format!(
                    "release {name} is listed twice"
                )));
            }
        }

        let ends: Vec<NaiveDate> = tags
            .iter()
            .skip(1)
            .map(|(_, date)| *date)
            .chain(std::iter::once(cutoff))
            .collect();

        let releases = tags
            .into_iter()
            .zip(ends)
            .map(|((name, start), end)| Release { name, start, end })
            .collect();

        Ok(Self { releases, by_name, cutoff })
    }

    pub fn windows(&self) -> &[Release] {
        &self.releases
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    pub fn cutoff(&self) -> NaiveDate {
        self.cutoff
    }

    /// Index of the window containing `date`, or `None` outside `[first start, cutoff)`.
    pub fn index_for(&self, date: NaiveDate) -> Option<ReleaseIndex> {
        // Last window whose start is not after the date; empty windows are skipped naturally.
        let pos = self.releases.partition_point(|release| release.start <= date);
        if pos == 0 {
            return None;
        }
        self.releases[pos - 1].contains(date).then_some(pos)
    }

    pub fn window_for(&self, date: NaiveDate) -> Option<&Release> {
        self.index_for(date).and_then(|index| self.get(index))
    }

    pub fn get(&self, index: ReleaseIndex) -> Option<&Release> {
        index.checked_sub(1).and_then(|i| self.releases.get(i))
    }

    pub fn name(&self, index: ReleaseIndex) -> Option<&str> {
        self.get(index).map(|release| release.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<ReleaseIndex> {
        self.by_name.get(name).copied()
    }

    /// Number of leading releases whose labels are considered reliable (`ceil(n / 2)`).
    pub fn reliable_prefix(&self) -> usize {
        self.releases.len().div_ceil(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn index() -> ReleaseWindowIndex {
        ReleaseWindowIndex::new(
            vec![
                ("1.1".to_string(), date("2020-06-01")),
                ("1.0".to_string(), date("2020-01-01")),
                ("1.2".to_string(), date("2020-09-01")),
            ],
            date("2021-01-01"),
        )
        .unwrap()
    }

    #[test]
    fn windows_are_sorted_and_contiguous() {
        let index = index();
        let names: Vec<_> = index.windows().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["1.0", "1.1", "1.2"]);
        assert_eq!(index.windows()[0].end, date("2020-06-01"));
        assert_eq!(index.windows()[1].end, date("2020-09-01"));
        assert_eq!(index.windows()[2].end, date("2021-01-01"));
    }

    #[test]
    fn lookup_is_half_open() {
        let index = index();
        assert_eq!(index.index_for(date("2019-12-31")), None);
        assert_eq!(index.index_for(date("2020-01-01")), Some(1));
        assert_eq!(index.index_for(date("2020-05-31")), Some(1));
        assert_eq!(index.index_for(date("2020-06-01")), Some(2));
        assert_eq!(index.index_for(date("2020-12-31")), Some(3));
        assert_eq!(index.index_for(date("2021-01-01")), None);
        assert_eq!(index.window_for(date("2020-07-01")).map(|r| r.name.as_str()), Some("1.1"));
    }

    #[test]
    fn names_and_indices_round_trip() {
        let index = index();
        assert_eq!(index.index_of("1.2"), Some(3));
        assert_eq!(index.name(1), Some("1.0"));
        assert_eq!(index.name(0), None);
        assert_eq!(index.name(4), None);
        assert_eq!(index.reliable_prefix(), 2);
    }

    #[test]
    fn empty_list_is_rejected() {
        let err = ReleaseWindowIndex::new(Vec::new(), date("2021-01-01")).unwrap_err();
        assert!(matches!(err, MinerError::InvalidConfiguration(_)));
    }

    #[test]
    fn cutoff_before_last_release_is_rejected() {
        let err = ReleaseWindowIndex::new(
            vec![("1.0".to_string(), date("2020-01-01"))],
            date("2019-01-01"),
        )
        .unwrap_err();
        assert!(matches!(err, MinerError::InvalidConfiguration(_)));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = ReleaseWindowIndex::new(
            vec![
                ("1.0".to_string(), date("2020-01-01")),
                ("1.0".to_string(), date("2020-02-01")),
            ],
            date("2021-01-01"),
        )
        .unwrap_err();
        assert!(matches!(err, MinerError::InvalidConfiguration(_)));
    }

    proptest! {
        #[test]
        fn every_date_maps_to_its_covering_window(
            offsets in proptest::collection::vec(0i64..2000, 1..12),
            probe in -100i64..2500,
            tail in 0i64..400,
        ) {
            let base = date("2015-01-01");
            let tags: Vec<_> = offsets
                .iter()
                .enumerate()
                .map(|(i, days)| (format!("r{i}"), base + chrono::Duration::days(*days)))
                .collect();
            let last = tags.iter().map(|(_, d)| *d).max().unwrap();
            let cutoff = last + chrono::Duration::days(tail);
            let index = ReleaseWindowIndex::new(tags, cutoff).unwrap();

            for pair in index.windows().windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
                prop_assert!(pair[0].start <= pair[0].end);
            }

            let probe = base + chrono::Duration::days(probe);
            let covering: Vec<_> = index
                .windows()
                .iter()
                .enumerate()
                .filter(|(_, r)| r.contains(probe))
                .map(|(i, _)| i + 1)
                .collect();
            prop_assert!(covering.len() <= 1);
            prop_assert_eq!(index.index_for(probe), covering.first().copied());

            let first = index.windows()[0].start;
            let inside = first <= probe && probe < cutoff;
            prop_assert_eq!(index.index_for(probe).is_some(), inside);
        }
    }
}
