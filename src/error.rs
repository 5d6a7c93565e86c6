//! Error handling module for smartbackup
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Errors that end or redirect a backup workflow live here. Notification and
//! rendering errors stay in their own modules since they never change a
//! workflow's outcome.

use thiserror::Error;

use crate::collaborators::CollaboratorError;
use crate::logic::poller::SnapshotError;
use crate::workflow_state::WorkflowTransitionError;

/// Main error type for smartbackup
#[derive(Error, Debug)]
pub enum SmartBackupError {
    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backup target declarations that do not resolve
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Database could not be put into backup mode
    #[error("Database {database} did not quiesce: {source}")]
    Quiesce {
        database: String,
        #[source]
        source: CollaboratorError,
    },

    /// Database could not be taken out of backup mode
    #[error("Database {database} did not unquiesce: {source}")]
    Unquiesce {
        database: String,
        #[source]
        source: CollaboratorError,
    },

    /// Snapshot request or job failure
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Workflow state machine transition errors
    #[error("Workflow transition error: {0}")]
    WorkflowTransition(#[from] WorkflowTransitionError),
}

/// Result type alias for smartbackup operations
pub type Result<T> = std::result::Result<T, SmartBackupError>;

// Convenient error constructors
impl SmartBackupError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SmartBackupError::config("missing targets");
        assert_eq!(err.to_string(), "Configuration error: missing targets");

        let err = SmartBackupError::resolution("no valid targets");
        assert_eq!(err.to_string(), "Resolution error: no valid targets");
    }

    #[test]
    fn test_snapshot_error_keeps_its_message() {
        let err: SmartBackupError = SnapshotError::JobFailed {
            job: "job-1".to_string(),
            code: 500,
            message: "insufficient space".to_string(),
        }
        .into();
        assert!(matches!(err, SmartBackupError::Snapshot(_)));
        assert_eq!(err.to_string(), "Snapshot job job-1 failed with code 500: insufficient space");
    }

    #[test]
    fn test_quiesce_error_names_database_and_cause() {
        let err = SmartBackupError::Quiesce {
            database: "orders".to_string(),
            source: CollaboratorError::rejected("start-backup", "lock timeout"),
        };
        assert_eq!(
            err.to_string(),
            "Database orders did not quiesce: start-backup rejected: lock timeout"
        );
    }
}
