//! Storage array hook: snapshot requests, job status, listing and deletion.
//!
//! | Operation         | Flags | Output |
//! |-------------------|-------|--------|
//! | `create-snapshot` | `--endpoint --svm --volume-id --name` | `{"job": {"uuid": "..."}}` |
//! | `job-status`      | `--endpoint --job-id` | job object |
//! | `list-snapshots`  | `--endpoint --volume-id` | `{"records": [...]}` |
//! | `delete-snapshot` | `--endpoint --volume-id --snapshot-id` | ignored |
//!
//! Credentials are exported as `SMARTBACKUP_STORAGE_USER` and
//! `SMARTBACKUP_STORAGE_PASSWORD`.

use serde::Deserialize;

use crate::collaborators::{
    CollaboratorResult, JobHandle, SnapshotJob, SnapshotListing, StorageArray,
};
use crate::config::HookCommandConfig;
use crate::hook_runner::{run_hook, HookOutput};
use crate::hook_traits::{flag, HookArgs};
use crate::types::VolumeTarget;

fn credentials(volume: &VolumeTarget) -> Vec<(String, String)> {
    vec![
        ("SMARTBACKUP_STORAGE_USER".to_string(), volume.user.clone()),
        ("SMARTBACKUP_STORAGE_PASSWORD".to_string(), volume.password.clone()),
    ]
}

/// Storage operation with its flags, run against one volume's endpoint
#[derive(Debug, Clone)]
pub struct StorageArgs<'a> {
    pub operation: StorageOperation<'a>,
    pub volume: &'a VolumeTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOperation<'a> {
    CreateSnapshot { volume_id: &'a str, name: &'a str },
    JobStatus { job_id: &'a str },
    ListSnapshots { volume_id: &'a str },
    DeleteSnapshot { volume_id: &'a str, snapshot_id: &'a str },
}

impl HookArgs for StorageArgs<'_> {
    fn operation(&self) -> &'static str {
        match self.operation {
            StorageOperation::CreateSnapshot { .. } => "create-snapshot",
            StorageOperation::JobStatus { .. } => "job-status",
            StorageOperation::ListSnapshots { .. } => "list-snapshots",
            StorageOperation::DeleteSnapshot { .. } => "delete-snapshot",
        }
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args: Vec<String> = flag("endpoint", &self.volume.endpoint).into();
        match &self.operation {
            StorageOperation::CreateSnapshot { volume_id, name } => {
                args.extend(flag("svm", &self.volume.svm));
                args.extend(flag("volume-id", volume_id));
                args.extend(flag("name", name));
            }
            StorageOperation::JobStatus { job_id } => {
                args.extend(flag("job-id", job_id));
            }
            StorageOperation::ListSnapshots { volume_id } => {
                args.extend(flag("volume-id", volume_id));
            }
            StorageOperation::DeleteSnapshot { volume_id, snapshot_id } => {
                args.extend(flag("volume-id", volume_id));
                args.extend(flag("snapshot-id", snapshot_id));
            }
        }
        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        credentials(self.volume)
    }
}

#[derive(Debug, Deserialize)]
struct CreateSnapshotResponse {
    job: JobHandle,
}

/// [`StorageArray`] backed by a hook command
#[derive(Debug, Clone)]
pub struct HookStorage {
    hook: HookCommandConfig,
}

impl HookStorage {
    pub fn new(hook: HookCommandConfig) -> Self {
        Self { hook }
    }

    fn run<'a>(
        &self,
        volume: &'a VolumeTarget,
        operation: StorageOperation<'a>,
    ) -> CollaboratorResult<HookOutput> {
        run_hook(&self.hook, &StorageArgs { operation, volume })
    }
}

impl StorageArray for HookStorage {
    fn create_snapshot(
        &self,
        volume: &VolumeTarget,
        volume_id: &str,
        snapshot_name: &str,
    ) -> CollaboratorResult<JobHandle> {
        let op = StorageOperation::CreateSnapshot { volume_id, name: snapshot_name };
        let response: CreateSnapshotResponse = self.run(volume, op)?.parse_json("create-snapshot")?;
        Ok(response.job)
    }

    fn job_status(&self, volume: &VolumeTarget, job_id: &str) -> CollaboratorResult<SnapshotJob> {
        self.run(volume, StorageOperation::JobStatus { job_id })?
            .parse_json("job-status")
    }

    fn list_snapshots(&self, volume: &VolumeTarget, volume_id: &str) -> CollaboratorResult<SnapshotListing> {
        self.run(volume, StorageOperation::ListSnapshots { volume_id })?
            .parse_json("list-snapshots")
    }

    fn delete_snapshot(&self, volume: &VolumeTarget, volume_id: &str, snapshot_id: &str) -> CollaboratorResult<()> {
        self.run(volume, StorageOperation::DeleteSnapshot { volume_id, snapshot_id })?
            .ensure_success("delete-snapshot")
    }
}
