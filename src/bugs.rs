//! Bug lifecycle resolution.
//!
//! Every linked issue is placed into its opening and fix release. Issues whose
//! reported affected versions are consistent take the oldest of them as the
//! injected release. The rest get an estimated injected release from the
//! proportion `P = (FV - IV) / (FV - OV)`, averaged over the consistent bugs
//! fixed in earlier releases only:
//!
//! ```text
//! IV = floor(FV - P * (FV - OV)), clamped to >= 1
//! ```
//!
//! The average is a fold over releases in order: bugs fixed in release `R`
//! are estimated before the consistent bugs of `R` join the average.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{Anomaly, Diagnostics};
use crate::linkage::LinkedIssue;
use crate::model::{CommitId, ReleaseIndex};
use crate::releases::ReleaseWindowIndex;

/// Where a bug's injected release comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Injection {
    /// Oldest of the tracker's affected versions.
    Reported,
    /// Estimated with the given proportion factor.
    Estimated { proportion: f64 },
}

/// A bug whose lifecycle has been resolved against the release windows.
#[derive(Debug, Clone, PartialEq)]
pub struct Bug {
    pub key: String,
    pub opened: NaiveDate,
    pub fixed: NaiveDate,
    pub opening: ReleaseIndex,
    pub fix: ReleaseIndex,
    pub injected: ReleaseIndex,
    /// Releases in `[injected, fix)`.
    pub affected: Vec<ReleaseIndex>,
    pub fix_commit: CommitId,
    pub injection: Injection,
}

impl Bug {
    /// Proportion sample contributed by this bug; `None` when opened and fixed in the same release.
    pub fn proportion_sample(&self) -> Option<f64> {
        let fix = self.fix as f64;
        let opening = self.opening as f64;
        if self.fix == self.opening {
            return None;
        }
        Some((fix - self.injected as f64) / (fix - opening))
    }

    pub fn affected_names<'r>(&self, releases: &'r ReleaseWindowIndex) -> Vec<&'r str> {
        self.affected.iter().filter_map(|&index| releases.name(index)).collect()
    }
}

/// Running mean of proportion samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Proportion {
    sum: f64,
    samples: usize,
}

impl Proportion {
    pub fn observe(&mut self, bug: &Bug) {
        if let Some(sample) = bug.proportion_sample() {
            self.sum += sample;
            self.samples += 1;
        }
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn value(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.sum / self.samples as f64)
    }
}

/// Estimated injected release index for the given opening/fix indices.
pub fn estimate_injected(opening: ReleaseIndex, fix: ReleaseIndex, proportion: f64) -> ReleaseIndex {
    let fix = fix as f64;
    let estimate = (fix - proportion * (fix - opening as f64)).floor();
    if estimate < 1.0 {
        1
    } else {
        estimate as ReleaseIndex
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Resolved bugs ordered by fix release, then ticket key.
    pub bugs: Vec<Bug>,
    /// Proportion factor used for each fix release that needed estimates.
    pub proportions: BTreeMap<ReleaseIndex, f64>,
}

impl Resolution {
    /// Affected releases of every bug, keyed by fix commit.
    pub fn affected_by_fix_commit(&self) -> BTreeMap<CommitId, Vec<ReleaseIndex>> {
        let mut map: BTreeMap<CommitId, Vec<ReleaseIndex>> = BTreeMap::new();
        for bug in &self.bugs {
            let entry = map.entry(bug.fix_commit.clone()).or_default();
            entry.extend(bug.affected.iter().copied());
            entry.sort_unstable();
            entry.dedup();
        }
        map
    }
}

/// Issue with opening and fix releases located, waiting for an injected release.
#[derive(Debug, Clone)]
struct Located {
    linked: LinkedIssue,
    opening: ReleaseIndex,
    fix: ReleaseIndex,
}

impl Located {
    fn into_bug(self, injected: ReleaseIndex, injection: Injection) -> Bug {
        Bug {
            key: self.linked.issue.key,
            opened: self.linked.issue.opened,
            fixed: self.linked.issue.fixed,
            opening: self.opening,
            fix: self.fix,
            injected,
            affected: (injected..self.fix).collect(),
            fix_commit: self.linked.fix_commit,
            injection,
        }
    }
}

pub struct BugLifecycleResolver<'a> {
    releases: &'a ReleaseWindowIndex,
    cold_start: f64,
}

impl<'a> BugLifecycleResolver<'a> {
    /// `cold_start` is the proportion used while no earlier release offers a usable sample.
    pub fn new(releases: &'a ReleaseWindowIndex, cold_start: f64) -> Self {
        Self { releases, cold_start }
    }

    pub fn resolve(&self, issues: Vec<LinkedIssue>, diagnostics: &mut Diagnostics) -> Resolution {
        let mut reported: BTreeMap<ReleaseIndex, Vec<Bug>> = BTreeMap::new();
        let mut missing: BTreeMap<ReleaseIndex, Vec<Located>> = BTreeMap::new();

        for linked in issues {
            let Some(located) = self.locate(linked, diagnostics) else {
                continue;
            };
            match self.reported_injection(&located) {
                Some(injected) => {
                    let bug = located.into_bug(injected, Injection::Reported);
                    reported.entry(bug.fix).or_default().push(bug);
                }
                None => missing.entry(located.fix).or_default().push(located),
            }
        }

        let valid = reported.values().map(Vec::len).sum::<usize>();
        let invalid = missing.values().map(Vec::len).sum::<usize>();
        info!(valid, invalid, "Classified reported affected versions");

        let mut resolution = Resolution::default();
        let mut proportion = Proportion::default();

        for release in 1..=self.releases.len() {
            if let Some(group) = missing.remove(&release) {
                let p = proportion.value().unwrap_or(self.cold_start);
                debug!(release, p, samples = proportion.samples(), "Estimating injected releases");
                resolution.proportions.insert(release, p);

                // Estimates within a group only read the frozen factor.
                let estimated: Vec<Bug> = group
                    .into_par_iter()
                    .map(|located| {
                        let injected = estimate_injected(located.opening, located.fix, p);
                        located.into_bug(injected, Injection::Estimated { proportion: p })
                    })
                    .collect();
                self.keep_affecting(estimated, &mut resolution.bugs, diagnostics);
            }

            if let Some(valid) = reported.remove(&release) {
                for bug in &valid {
                    proportion.observe(bug);
                }
                self.keep_affecting(valid, &mut resolution.bugs, diagnostics);
            }
        }

        resolution
            .bugs
            .sort_by(|a, b| a.fix.cmp(&b.fix).then_with(|| a.key.cmp(&b.key)));
        info!(bugs = resolution.bugs.len(), "Resolved bug lifecycles");
        resolution
    }

    fn locate(&self, linked: LinkedIssue, diagnostics: &mut Diagnostics) -> Option<Located> {
        let opening = self.releases.index_for(linked.issue.opened);
        let fix = self.releases.index_for(linked.issue.fixed);
        match (opening, fix) {
            (Some(opening), Some(fix)) => Some(Located { linked, opening, fix }),
            _ => {
                diagnostics.record(Anomaly::UnresolvableBug { ticket: linked.issue.key });
                None
            }
        }
    }

    /// Oldest reported affected release, when the reported versions are consistent:
    /// all known, the oldest not released after the opening date, the fix release not listed.
    fn reported_injection(&self, located: &Located) -> Option<ReleaseIndex> {
        let issue = &located.linked.issue;
        if issue.affected_versions.is_empty() {
            return None;
        }

        let indices = issue
            .affected_versions
            .iter()
            .map(|name| self.releases.index_of(name))
            .collect::<Option<Vec<_>>>()?;

        if indices.contains(&located.fix) {
            return None;
        }

        let oldest = indices.into_iter().min()?;
        let release = self.releases.get(oldest)?;
        (release.start <= issue.opened).then_some(oldest)
    }

    fn keep_affecting(&self, bugs: Vec<Bug>, into: &mut Vec<Bug>, diagnostics: &mut Diagnostics) {
        for bug in bugs {
            if bug.injected >= bug.fix {
                diagnostics.record(Anomaly::DegenerateBug { ticket: bug.key });
            } else {
                into.push(bug);
            }
        }
    }
}
