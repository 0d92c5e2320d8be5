// src/model.rs

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

/// Name of a release as published by the issue tracker
pub type ReleaseName = String;

/// 1-based position of a release in the date-sorted release list
pub type ReleaseIndex = usize;

/// Uniquely identifies a commit (hex object id for git)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(pub String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A single commit from the version-control history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: CommitId,
    pub author_date: DateTime<Utc>,
    pub author: String,
    pub message: String,
}

impl Commit {
    /// Calendar day of the author date, used for release windows and fix-date matching.
    pub fn day(&self) -> NaiveDate {
        self.author_date.date_naive()
    }
}

/// How a diff entry changed a path between two commits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
    Rename,
    Copy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Insert,
    Delete,
    Replace,
}

/// One contiguous region of an edit script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    pub kind: EditKind,
    pub old_len: u32,
    pub new_len: u32,
}

impl Edit {
    pub fn insert(lines: u32) -> Self {
        Self { kind: EditKind::Insert, old_len: 0, new_len: lines }
    }

    pub fn delete(lines: u32) -> Self {
        Self { kind: EditKind::Delete, old_len: lines, new_len: 0 }
    }

    pub fn replace(old_len: u32, new_len: u32) -> Self {
        Self { kind: EditKind::Replace, old_len, new_len }
    }

    /// Classifies a region from its old/new line counts. Empty regions yield `None`.
    pub fn from_lengths(old_len: u32, new_len: u32) -> Option<Self> {
        match (old_len, new_len) {
            (0, 0) => None,
            (0, new) => Some(Self::insert(new)),
            (old, 0) => Some(Self::delete(old)),
            (old, new) => Some(Self::replace(old, new)),
        }
    }
}

/// A path-level change between two commits, with its edit script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub change: ChangeKind,
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub edits: Vec<Edit>,
}

impl DiffEntry {
    pub fn added(path: &str, edits: Vec<Edit>) -> Self {
        Self { change: ChangeKind::Add, old_path: None, new_path: Some(path.to_string()), edits }
    }

    pub fn modified(path: &str, edits: Vec<Edit>) -> Self {
        Self {
            change: ChangeKind::Modify,
            old_path: Some(path.to_string()),
            new_path: Some(path.to_string()),
            edits,
        }
    }

    pub fn deleted(path: &str) -> Self {
        Self { change: ChangeKind::Delete, old_path: Some(path.to_string()), new_path: None, edits: Vec::new() }
    }

    pub fn renamed(from: &str, to: &str) -> Self {
        Self {
            change: ChangeKind::Rename,
            old_path: Some(from.to_string()),
            new_path: Some(to.to_string()),
            edits: Vec::new(),
        }
    }

    pub fn copied(from: &str, to: &str) -> Self {
        Self {
            change: ChangeKind::Copy,
            old_path: Some(from.to_string()),
            new_path: Some(to.to_string()),
            edits: Vec::new(),
        }
    }

    /// The path the entry is about: the new path when present, otherwise the old one.
    pub fn path(&self) -> &str {
        self.new_path.as_deref().or(self.old_path.as_deref()).unwrap_or_default()
    }
}

/// A fixed issue as reported by the issue tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub key: String,
    pub opened: NaiveDate,
    pub fixed: NaiveDate,
    /// Affected versions as reported; may be empty or inconsistent.
    pub affected_versions: Vec<ReleaseName>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_classification_follows_lengths() {
        assert_eq!(Edit::from_lengths(0, 0), None);
        assert_eq!(Edit::from_lengths(0, 3), Some(Edit::insert(3)));
        assert_eq!(Edit::from_lengths(2, 0), Some(Edit::delete(2)));
        assert_eq!(Edit::from_lengths(2, 5), Some(Edit::replace(2, 5)));
    }

    #[test]
    fn diff_entry_path_prefers_new_name() {
        assert_eq!(DiffEntry::renamed("A.java", "B.java").path(), "B.java");
        assert_eq!(DiffEntry::deleted("A.java").path(), "A.java");
    }
}
