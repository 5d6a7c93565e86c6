//! Collaborator contracts.
//!
//! The storage array, the database, the mail relay and the paging service are
//! reached only through the traits in this module. Their wire protocols live
//! outside this crate; the binary binds each trait to a hook command
//! (see [`crate::hooks`]), tests bind them to in-memory recorders.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::config::MailSettings;
use crate::types::{DatabaseTarget, VolumeTarget};

/// Failure reported by (or while talking to) a collaborator
#[derive(Error, Debug)]
pub enum CollaboratorError {
    /// The collaborator could not be started at all
    #[error("{operation}: could not run collaborator: {source}")]
    Spawn {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// The collaborator answered but refused the request
    #[error("{operation} rejected: {reason}")]
    Rejected { operation: String, reason: String },

    /// The collaborator's answer could not be understood
    #[error("{operation}: malformed response: {reason}")]
    MalformedResponse { operation: String, reason: String },
}

impl CollaboratorError {
    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Checkpoint identifier marking a consistent point in the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint: String,
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.checkpoint)
    }
}

/// Accepted snapshot request, identified by its asynchronous job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub uuid: String,
}

/// Snapshot job states as reported by the storage array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Paused,
    Success,
    Failure,
}

impl JobState {
    /// `success` and `failure` are final; everything else is still in flight
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// Status of an asynchronous snapshot job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotJob {
    pub uuid: String,
    pub state: JobState,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One existing snapshot on a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub snapshot_id: String,
    pub name: String,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub expiry_time: Option<String>,
}

/// Snapshots found on a volume
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SnapshotListing {
    #[serde(default)]
    pub records: Vec<SnapshotRecord>,
}

/// Paging-service alert keyed by a deduplication identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    #[serde(skip_serializing, default)]
    pub service_key: String,
    pub incident_key: String,
    pub description: String,
    pub details: BTreeMap<String, String>,
}

/// Snapshot operations on a storage array
pub trait StorageArray {
    /// Ask the array to snapshot `volume_id`. Acceptance yields an asynchronous job.
    fn create_snapshot(
        &self,
        volume: &VolumeTarget,
        volume_id: &str,
        snapshot_name: &str,
    ) -> CollaboratorResult<JobHandle>;

    /// Fetch the current status of a job
    fn job_status(&self, volume: &VolumeTarget, job_id: &str) -> CollaboratorResult<SnapshotJob>;

    fn list_snapshots(
        &self,
        volume: &VolumeTarget,
        volume_id: &str,
    ) -> CollaboratorResult<SnapshotListing>;

    fn delete_snapshot(
        &self,
        volume: &VolumeTarget,
        volume_id: &str,
        snapshot_id: &str,
    ) -> CollaboratorResult<()>;
}

/// Backup-mode control of a database
pub trait DatabaseControl {
    /// Enter backup mode under `label`, returning the consistent-start checkpoint
    fn start_backup(&self, database: &DatabaseTarget, label: &str) -> CollaboratorResult<Checkpoint>;

    /// Leave backup mode, returning the completion checkpoint
    fn stop_backup(&self, database: &DatabaseTarget) -> CollaboratorResult<Checkpoint>;
}

/// Outbound mail relay
pub trait MailTransport {
    fn send(&self, settings: &MailSettings, subject: &str, body: &str) -> CollaboratorResult<()>;
}

/// Incident paging service
pub trait PagingClient {
    fn send_incident(&self, incident: &Incident) -> CollaboratorResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_terminal() {
        assert!(JobState::Success.is_terminal());
        assert!(JobState::Failure.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Paused.is_terminal());
    }

    #[test]
    fn test_snapshot_job_parses_array_response() {
        let job: SnapshotJob = serde_json::from_str(
            r#"{"uuid":"j-1","state":"failure","end_time":"2024-05-01T02:00:00Z","code":500,"message":"insufficient space"}"#,
        )
        .unwrap();
        assert_eq!(job.state, JobState::Failure);
        assert_eq!(job.code, Some(500));
        assert_eq!(job.message.as_deref(), Some("insufficient space"));

        let job: SnapshotJob = serde_json::from_str(r#"{"uuid":"j-2","state":"running"}"#).unwrap();
        assert_eq!(job.state, JobState::Running);
        assert!(job.end_time.is_none());
    }

    #[test]
    fn test_incident_json_omits_service_key() {
        let incident = Incident {
            service_key: "secret".to_string(),
            incident_key: "smartbackup-orders-vol1".to_string(),
            description: "backup failed".to_string(),
            details: BTreeMap::new(),
        };
        let json = serde_json::to_string(&incident).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("smartbackup-orders-vol1"));
    }
}
