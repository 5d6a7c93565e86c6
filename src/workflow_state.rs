//! Backup Workflow State Machine
//!
//! Tracks the phase of a single target's backup and enforces the legal
//! transitions between phases. The driver records every step here, so a
//! programming error that skips the unquiesce phase or re-enters a finished
//! workflow fails loudly instead of silently leaving a database in backup mode.
//!
//! # Phase Flow
//!
//! ```text
//! Idle
//!   ↓
//! Quiescing ──────────────→ QuiesceFailed (terminal)
//!   ↓
//! Quiesced
//!   ↓
//! SnapshotInFlight
//!   ↓                ↘
//! SnapshotDone      SnapshotFailed
//!   ↓                ↙
//! Unquiescing ────────────→ UnquiesceFailed (terminal)
//!   ↓
//! Complete (terminal)
//! ```

use std::fmt;
use std::time::SystemTime;
use thiserror::Error;

/// Phases of one target's backup workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupPhase {
    Idle,
    /// Database is being put into backup mode
    Quiescing,
    Quiesced,
    /// Snapshot requested, job not yet terminal
    SnapshotInFlight,
    SnapshotDone,
    /// Snapshot failed; the database still has to leave backup mode
    SnapshotFailed,
    Unquiescing,
    Complete,
    QuiesceFailed,
    UnquiesceFailed,
}

impl BackupPhase {
    /// Returns true if no further transition is possible
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Complete | Self::QuiesceFailed | Self::UnquiesceFailed
        )
    }

    /// Returns true for terminal phases that end the remaining run
    #[inline]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::QuiesceFailed | Self::UnquiesceFailed)
    }

    /// Returns true while the database may be in backup mode
    #[inline]
    pub const fn holds_database(self) -> bool {
        matches!(
            self,
            Self::Quiesced
                | Self::SnapshotInFlight
                | Self::SnapshotDone
                | Self::SnapshotFailed
                | Self::Unquiescing
        )
    }

    /// Phases reachable from this one
    pub const fn successors(self) -> &'static [Self] {
        match self {
            Self::Idle => &[Self::Quiescing],
            Self::Quiescing => &[Self::Quiesced, Self::QuiesceFailed],
            Self::Quiesced => &[Self::SnapshotInFlight],
            Self::SnapshotInFlight => &[Self::SnapshotDone, Self::SnapshotFailed],
            Self::SnapshotDone | Self::SnapshotFailed => &[Self::Unquiescing],
            Self::Unquiescing => &[Self::Complete, Self::UnquiesceFailed],
            Self::Complete | Self::QuiesceFailed | Self::UnquiesceFailed => &[],
        }
    }

    /// Returns true if `next` directly follows this phase
    pub fn can_transition_to(self, next: Self) -> bool {
        self.successors().contains(&next)
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Quiescing => "quiescing",
            Self::Quiesced => "quiesced",
            Self::SnapshotInFlight => "snapshot in flight",
            Self::SnapshotDone => "snapshot done",
            Self::SnapshotFailed => "snapshot failed",
            Self::Unquiescing => "unquiescing",
            Self::Complete => "complete",
            Self::QuiesceFailed => "quiesce failed",
            Self::UnquiesceFailed => "unquiesce failed",
        }
    }
}

impl fmt::Display for BackupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Errors that can occur during phase transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowTransitionError {
    #[error("Cannot move from {from} to {to}")]
    Illegal { from: BackupPhase, to: BackupPhase },

    #[error("Workflow already finished in state {from}")]
    FromTerminalState { from: BackupPhase },

    #[error("Already in state {phase}")]
    AlreadyInPhase { phase: BackupPhase },
}

/// Current phase and history of one target's workflow
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    current: BackupPhase,
    history: Vec<(BackupPhase, SystemTime)>,
}

impl Default for WorkflowContext {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self {
            current: BackupPhase::Idle,
            history: Vec::with_capacity(7),
        }
    }

    #[inline]
    pub fn current_phase(&self) -> BackupPhase {
        self.current
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.current.is_terminal()
    }

    /// Phases entered so far, with the time each was entered
    pub fn history(&self) -> &[(BackupPhase, SystemTime)] {
        &self.history
    }

    /// Phases entered so far, without timestamps
    pub fn phases(&self) -> Vec<BackupPhase> {
        self.history.iter().map(|(phase, _)| *phase).collect()
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if the workflow already finished
    /// - `AlreadyInPhase` if `next` is the current phase
    /// - `Illegal` if `next` does not directly follow the current phase
    pub fn transition_to(&mut self, next: BackupPhase) -> Result<BackupPhase, WorkflowTransitionError> {
        if self.current.is_terminal() {
            return Err(WorkflowTransitionError::FromTerminalState { from: self.current });
        }
        if next == self.current {
            return Err(WorkflowTransitionError::AlreadyInPhase { phase: next });
        }
        if !self.current.can_transition_to(next) {
            return Err(WorkflowTransitionError::Illegal {
                from: self.current,
                to: next,
            });
        }

        tracing::debug!("Workflow phase {} -> {}", self.current, next);
        self.history.push((next, SystemTime::now()));
        self.current = next;
        Ok(next)
    }
}
