//! One-shot operator checks that run instead of a backup.
//!
//! Each check exercises one collaborator end to end so an operator can confirm
//! the configuration before the first scheduled run.

use crate::collaborators::{CollaboratorResult, SnapshotListing, StorageArray};
use crate::notify::{NotificationDispatcher, NotifyError};
use crate::template::{TEST_BODY, TEST_ERROR, TEST_SUBJECT};
use crate::types::ResolvedBackupTarget;

/// Snapshots found for one target
#[derive(Debug)]
pub struct VolumeListing {
    pub target: String,
    pub result: CollaboratorResult<SnapshotListing>,
}

/// Send a failure notification for a placeholder target.
///
/// Unlike notifications sent during a backup, the outcome is returned so the
/// operator sees it.
pub fn send_test_message(notifier: &NotificationDispatcher) -> Result<(), NotifyError> {
    tracing::info!(
        "Sending test message to {:?}",
        notifier.mail_settings().send_to
    );
    notifier.notify(
        &ResolvedBackupTarget::synthetic(),
        TEST_SUBJECT,
        TEST_BODY,
        TEST_ERROR,
    )
}

/// List the snapshots on every target's volume, logging what was found
pub fn list_snapshots(
    storage: &dyn StorageArray,
    targets: &[ResolvedBackupTarget],
) -> Vec<VolumeListing> {
    targets
        .iter()
        .map(|target| {
            let result = storage.list_snapshots(&target.volume, &target.volume_id);
            match &result {
                Ok(listing) => {
                    tracing::info!(
                        "Found {} snapshots for {}",
                        listing.records.len(),
                        target.name
                    );
                    for rec in &listing.records {
                        tracing::info!(
                            "\t[{}] {} created at {}, expiry time {}",
                            rec.snapshot_id,
                            rec.name,
                            rec.create_time.as_deref().unwrap_or("-"),
                            rec.expiry_time.as_deref().unwrap_or("-")
                        );
                    }
                }
                Err(e) => tracing::error!("Could not list snapshots for {}: {}", target.name, e),
            }
            VolumeListing {
                target: target.name.clone(),
                result,
            }
        })
        .collect()
}

/// Delete one snapshot from `target`'s volume
pub fn delete_snapshot(
    storage: &dyn StorageArray,
    target: &ResolvedBackupTarget,
    snapshot_id: &str,
) -> CollaboratorResult<()> {
    tracing::info!(
        "Testing delete of snapshot {} on volume {} ({})",
        snapshot_id,
        target.volume_id,
        target.volume.name
    );
    storage.delete_snapshot(&target.volume, &target.volume_id, snapshot_id)
}
