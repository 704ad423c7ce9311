//! Error types for reorder operations
//!
//! A failed write never gets undone by the executor: whenever
//! `completed_writes` is non-zero the scope is left partially applied and the
//! caller has to re-read it.

use crate::db::StoreError;
use crate::models::ScopeId;
use std::fmt;
use thiserror::Error;

/// The two phases of a reorder run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReorderPhase {
    /// Phase 1: every member moves to a temporary key
    Displacement,
    /// Phase 2: every member moves to its final key
    Settlement,
}

impl fmt::Display for ReorderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReorderPhase::Displacement => write!(f, "displacement"),
            ReorderPhase::Settlement => write!(f, "settlement"),
        }
    }
}

/// Errors that can occur during a reorder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReorderError {
    /// Malformed request, rejected before any store access
    #[error("Invalid reorder request: {reason}")]
    Validation { reason: String },

    /// A write's key was held by a live member of the scope
    ///
    /// Not retried: with correct phase ordering this only happens when
    /// another writer touched the scope mid-run.
    #[error("Ordering key conflict in {phase} phase after {completed_writes} write(s): {source}")]
    Conflict {
        phase: ReorderPhase,
        completed_writes: usize,
        source: StoreError,
    },

    /// Any other failed write (transport failure, vanished member)
    #[error("Write failed in {phase} phase after {completed_writes} write(s): {source}")]
    WriteFailed {
        phase: ReorderPhase,
        completed_writes: usize,
        source: StoreError,
    },

    /// Reading the scope failed (temp base lookup, generation check, resync)
    #[error("Failed to read scope {scope}: {source}")]
    ReadFailed { scope: ScopeId, source: StoreError },

    /// The scope was written by someone else since the caller's snapshot
    #[error("Scope {scope} changed since it was read: expected generation {expected}, found {actual}")]
    StaleScope {
        scope: ScopeId,
        expected: u64,
        actual: u64,
    },
}

impl ReorderError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Classify a failed write
    pub fn write(phase: ReorderPhase, completed_writes: usize, source: StoreError) -> Self {
        if source.is_conflict() {
            Self::Conflict {
                phase,
                completed_writes,
                source,
            }
        } else {
            Self::WriteFailed {
                phase,
                completed_writes,
                source,
            }
        }
    }

    pub fn read(scope: ScopeId, source: StoreError) -> Self {
        Self::ReadFailed { scope, source }
    }

    /// Writes that landed before the failure
    pub fn completed_writes(&self) -> usize {
        match self {
            Self::Conflict {
                completed_writes, ..
            }
            | Self::WriteFailed {
                completed_writes, ..
            } => *completed_writes,
            _ => 0,
        }
    }

    /// `true` when the scope was left with some of the run's writes applied
    pub fn is_partial(&self) -> bool {
        self.completed_writes() > 0
    }
}
