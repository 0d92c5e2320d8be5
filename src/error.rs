//! Error types for the miner.
//!
//! Fatal failures abort a run through [`MinerError`]. Data anomalies that only
//! drop a single bug or diff entry are [`Anomaly`] values collected into a
//! [`Diagnostics`] sink so a run can be audited afterwards.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::model::{ChangeKind, CommitId};

#[derive(Debug, thiserror::Error)]
pub enum MinerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Issue tracker error: {0}")]
    Tracker(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parse error: {0}")]
    Date(#[from] chrono::ParseError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, MinerError>;

/// A non-fatal irregularity in the input data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Anomaly {
    #[error("bug {ticket} is not referenced by any commit")]
    UnlinkedBug { ticket: String },

    #[error("bug {ticket} was opened or fixed outside every release window")]
    UnresolvableBug { ticket: String },

    #[error("bug {ticket} was injected in its fix release")]
    DegenerateBug { ticket: String },

    #[error("{change:?} of {path} in {commit} has no live file record")]
    OrphanDiffEntry { commit: CommitId, change: ChangeKind, path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnomalyKind {
    UnlinkedBug,
    UnresolvableBug,
    DegenerateBug,
    OrphanDiffEntry,
}

impl Anomaly {
    pub fn kind(&self) -> AnomalyKind {
        match self {
            Self::UnlinkedBug { .. } => AnomalyKind::UnlinkedBug,
            Self::UnresolvableBug { .. } => AnomalyKind::UnresolvableBug,
            Self::DegenerateBug { .. } => AnomalyKind::DegenerateBug,
            Self::OrphanDiffEntry { .. } => AnomalyKind::OrphanDiffEntry,
        }
    }
}

/// Collects anomalies observed during a run.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    counts: BTreeMap<AnomalyKind, usize>,
    anomalies: Vec<Anomaly>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, anomaly: Anomaly) {
        debug!(kind = ?anomaly.kind(), "{anomaly}");
        *self.counts.entry(anomaly.kind()).or_insert(0) += 1;
        self.anomalies.push(anomaly);
    }

    pub fn count(&self, kind: AnomalyKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.anomalies.len()
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn log_summary(&self) {
        if self.anomalies.is_empty() {
            info!("No data anomalies recorded");
            return;
        }
        for (kind, count) in &self.counts {
            info!(?kind, count, "Data anomalies recorded");
        }
    }
}
