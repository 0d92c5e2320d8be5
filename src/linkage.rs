//! Commit to ticket linkage.
//!
//! A commit references a ticket when its message mentions the ticket key. The
//! commit authored on the ticket's fix date is the fix commit; the others are
//! plain references. Tickets with no same-day commit fall back to their latest
//! reference.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use tracing::info;

use crate::error::{Anomaly, Diagnostics, Result};
use crate::model::{Commit, CommitId, Issue};

const TICKET_KEY_PATTERN: &str = r"\b[A-Z][A-Z0-9_]*-\d+\b";

/// An issue together with the commits that mention it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedIssue {
    pub issue: Issue,
    pub fix_commit: CommitId,
    pub referencing: Vec<CommitId>,
}

#[derive(Debug, Clone)]
pub struct Linkage {
    pub issues: Vec<LinkedIssue>,
    pub linked_commits: usize,
    pub total_commits: usize,
}

impl Linkage {
    /// Percentage of commits linked to a bug ticket.
    pub fn ratio(&self) -> f64 {
        if self.total_commits == 0 {
            return 0.0;
        }
        self.linked_commits as f64 / self.total_commits as f64 * 100.0
    }
}

pub struct TicketLinker {
    pattern: Regex,
}

impl TicketLinker {
    pub fn new() -> Result<Self> {
        Ok(Self { pattern: Regex::new(TICKET_KEY_PATTERN)? })
    }

    /// Ticket keys mentioned in a commit message, without duplicates.
    pub fn ticket_keys<'m>(&self, message: &'m str) -> HashSet<&'m str> {
        self.pattern.find_iter(message).map(|m| m.as_str()).collect()
    }

    pub fn link(
        &self,
        issues: Vec<Issue>,
        commits: &[Commit],
        diagnostics: &mut Diagnostics,
    ) -> Linkage {
        let mut mentions: HashMap<&str, Vec<&Commit>> = HashMap::new();
        for commit in commits {
            for key in self.ticket_keys(&commit.message) {
                mentions.entry(key).or_default().push(commit);
            }
        }

        let mut linked = Vec::with_capacity(issues.len());
        let mut linked_commits: HashSet<&CommitId> = HashSet::new();

        for issue in issues {
            let Some(candidates) = mentions.get(issue.key.as_str()) else {
                diagnostics.record(Anomaly::UnlinkedBug { ticket: issue.key.clone() });
                continue;
            };

            let fix = candidates
                .iter()
                .filter(|commit| commit.day() == issue.fixed)
                .max_by_key(|commit| commit.author_date)
                .or_else(|| candidates.iter().max_by_key(|commit| commit.author_date));

            let Some(fix) = fix else {
                diagnostics.record(Anomaly::UnlinkedBug { ticket: issue.key.clone() });
                continue;
            };

            let referencing: Vec<CommitId> = candidates
                .iter()
                .filter(|commit| commit.id != fix.id)
                .map(|commit| commit.id.clone())
                .collect();

            linked_commits.extend(candidates.iter().map(|commit| &commit.id));
            linked.push(LinkedIssue { fix_commit: fix.id.clone(), referencing, issue });
        }

        let linkage = Linkage {
            issues: linked,
            linked_commits: linked_commits.len(),
            total_commits: commits.len(),
        };
        info!(
            bugs = linkage.issues.len(),
            linkage = %format!("{:.2}%", linkage.ratio()),
            "Linked bug tickets to commits"
        );
        linkage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnomalyKind;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn commit(id: &str, day: u32, hour: u32, message: &str) -> Commit {
        Commit {
            id: CommitId::from(id),
            author_date: Utc.with_ymd_and_hms(2020, 3, day, hour, 0, 0).unwrap(),
            author: "dev".into(),
            message: message.into(),
        }
    }

    fn issue(key: &str, fixed_day: u32) -> Issue {
        Issue {
            key: key.into(),
            opened: NaiveDate::from_ymd_opt(2020, 2, 1).unwrap(),
            fixed: NaiveDate::from_ymd_opt(2020, 3, fixed_day).unwrap(),
            affected_versions: Vec::new(),
        }
    }

    #[test]
    fn keys_are_word_bounded() {
        let linker = TicketLinker::new().unwrap();
        let keys = linker.ticket_keys("PROJ-12: fix, see PROJ-12 and OTHER-3");
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("PROJ-12"));
        assert!(!keys.contains("PROJ-1"));
    }

    #[test]
    fn same_day_commit_is_the_fix() {
        let linker = TicketLinker::new().unwrap();
        let commits = vec![
            commit("a", 2, 10, "PROJ-1 first attempt"),
            commit("b", 5, 9, "PROJ-1 real fix"),
            commit("c", 7, 9, "PROJ-1 follow-up"),
        ];
        let mut diagnostics = Diagnostics::new();

        let linkage = linker.link(vec![issue("PROJ-1", 5)], &commits, &mut diagnostics);

        assert_eq!(linkage.issues.len(), 1);
        assert_eq!(linkage.issues[0].fix_commit, CommitId::from("b"));
        assert_eq!(linkage.issues[0].referencing.len(), 2);
        assert_eq!(linkage.linked_commits, 3);
    }

    #[test]
    fn latest_reference_is_the_fallback_fix() {
        let linker = TicketLinker::new().unwrap();
        let commits = vec![commit("a", 2, 10, "PROJ-1"), commit("b", 4, 9, "PROJ-1 again")];
        let mut diagnostics = Diagnostics::new();

        let linkage = linker.link(vec![issue("PROJ-1", 20)], &commits, &mut diagnostics);

        assert_eq!(linkage.issues[0].fix_commit, CommitId::from("b"));
        assert_eq!(linkage.issues[0].referencing, vec![CommitId::from("a")]);
    }

    #[test]
    fn unreferenced_issues_are_dropped() {
        let linker = TicketLinker::new().unwrap();
        let commits = vec![commit("a", 2, 10, "PROJ-12 unrelated")];
        let mut diagnostics = Diagnostics::new();

        let linkage = linker.link(vec![issue("PROJ-1", 2)], &commits, &mut diagnostics);

        assert!(linkage.issues.is_empty());
        assert_eq!(diagnostics.count(AnomalyKind::UnlinkedBug), 1);
        assert_eq!(linkage.ratio(), 0.0);
    }
}
