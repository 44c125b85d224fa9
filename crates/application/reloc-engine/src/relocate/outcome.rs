use camino::{Utf8Path, Utf8PathBuf};
use reloc_core::DependencyKind;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Copied { dest: Utf8PathBuf },
    /// The destination already held this file; nothing was written.
    UpToDate { dest: Utf8PathBuf },
    /// The record carries nothing to relocate.
    Skipped { reason: String },
    Missing,
    Failed { reason: String },
}

/// Result of relocating one physical file (or one file-less record).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub kind: DependencyKind,
    pub record: String,
    pub source: Utf8PathBuf,
    pub status: OutcomeStatus,
}

impl TransferOutcome {
    pub fn copied(&self) -> bool {
        matches!(self.status, OutcomeStatus::Copied { .. })
    }

    pub fn destination(&self) -> Option<&Utf8Path> {
        match &self.status {
            OutcomeStatus::Copied { dest } | OutcomeStatus::UpToDate { dest } => Some(dest),
            _ => None,
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        matches!(self.status, OutcomeStatus::UpToDate { .. })
    }

    pub fn label(&self) -> &'static str {
        match self.status {
            OutcomeStatus::Copied { .. } => "copied",
            OutcomeStatus::UpToDate { .. } | OutcomeStatus::Skipped { .. } => "skipped",
            OutcomeStatus::Missing => "missing",
            OutcomeStatus::Failed { .. } => "failed",
        }
    }
}

/// `<kind-index> <outcome> <source> -> <destination-or-reason>`
impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.kind.index(), self.label())?;
        if self.source.as_str().is_empty() {
            write!(f, "[{}]", self.record)?;
        } else {
            write!(f, "{}", self.source)?;
        }
        match &self.status {
            OutcomeStatus::Copied { dest } => write!(f, " -> {dest}"),
            OutcomeStatus::UpToDate { dest } => write!(f, " -> {dest} (up to date)"),
            OutcomeStatus::Skipped { reason } | OutcomeStatus::Failed { reason } => {
                write!(f, " -> {reason}")
            }
            OutcomeStatus::Missing => write!(f, " -> file not found"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTransfer {
    pub source: Utf8PathBuf,
    pub reason: String,
}

/// A root-owned library whose file now lives in the export tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocatedLibrary {
    pub name: String,
    pub original: Utf8PathBuf,
    pub relocated: Utf8PathBuf,
}

/// Tally of one relocation pass.
#[derive(Debug, Clone, Default)]
pub struct PassSummary {
    pub copied: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub missing: BTreeSet<Utf8PathBuf>,
    pub failed: Vec<FailedTransfer>,
    /// Paths referenced by the project that no record accounted for.
    pub unaccounted: BTreeSet<Utf8PathBuf>,
    pub relocated_libraries: Vec<RelocatedLibrary>,
    pub cancelled: bool,
}

impl PassSummary {
    pub(crate) fn record(&mut self, outcome: &TransferOutcome) {
        match &outcome.status {
            OutcomeStatus::Copied { .. } => self.copied += 1,
            OutcomeStatus::UpToDate { .. } => self.up_to_date += 1,
            OutcomeStatus::Skipped { .. } => self.skipped += 1,
            OutcomeStatus::Missing => {
                self.missing.insert(outcome.source.clone());
            }
            OutcomeStatus::Failed { reason } => self.failed.push(FailedTransfer {
                source: outcome.source.clone(),
                reason: reason.clone(),
            }),
        }
    }
}
