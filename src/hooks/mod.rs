//! Collaborator adapters backed by hook commands.
//!
//! Each module maps one collaborator trait onto an external executable (see
//! [`crate::hook_runner`] for the process contract). A collaborator without a
//! configured hook is bound to [`Unconfigured`], which refuses every call.

pub mod database;
pub mod mail;
pub mod paging;
pub mod storage;

pub use database::HookDatabase;
pub use mail::HookMail;
pub use paging::HookPager;
pub use storage::HookStorage;

use strum::{Display, EnumString};

use crate::collaborators::{
    Checkpoint, CollaboratorError, CollaboratorResult, DatabaseControl, Incident, JobHandle,
    MailTransport, PagingClient, SnapshotJob, SnapshotListing, StorageArray,
};
use crate::config::{HookCommandConfig, HookSettings, MailSettings};
use crate::error::{Result, SmartBackupError};
use crate::types::{DatabaseTarget, VolumeTarget};

/// The collaborators a hook can be configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum HookRole {
    Database,
    Storage,
    Mail,
    Paging,
}

impl HookRole {
    pub fn hook(self, settings: &HookSettings) -> Option<&HookCommandConfig> {
        match self {
            Self::Database => settings.database.as_ref(),
            Self::Storage => settings.storage.as_ref(),
            Self::Mail => settings.mail.as_ref(),
            Self::Paging => settings.paging.as_ref(),
        }
    }
}

/// Fail unless every role in `roles` has a hook configured
pub fn require(settings: &HookSettings, roles: &[HookRole]) -> Result<()> {
    let missing: Vec<String> = roles
        .iter()
        .filter(|role| role.hook(settings).is_none())
        .map(|role| format!("hooks.{}", role))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SmartBackupError::config(format!(
            "missing hook command for {}",
            missing.join(", ")
        )))
    }
}

pub fn storage_array(settings: &HookSettings) -> Box<dyn StorageArray> {
    match &settings.storage {
        Some(hook) => Box::new(HookStorage::new(hook.clone())),
        None => Box::new(Unconfigured(HookRole::Storage)),
    }
}

pub fn database_control(settings: &HookSettings) -> Box<dyn DatabaseControl> {
    match &settings.database {
        Some(hook) => Box::new(HookDatabase::new(hook.clone())),
        None => Box::new(Unconfigured(HookRole::Database)),
    }
}

pub fn mail_transport(settings: &HookSettings) -> Box<dyn MailTransport> {
    match &settings.mail {
        Some(hook) => Box::new(HookMail::new(hook.clone())),
        None => Box::new(Unconfigured(HookRole::Mail)),
    }
}

pub fn paging_client(settings: &HookSettings) -> Box<dyn PagingClient> {
    match &settings.paging {
        Some(hook) => Box::new(HookPager::new(hook.clone())),
        None => Box::new(Unconfigured(HookRole::Paging)),
    }
}

/// Stand-in for a collaborator with no hook; every call is rejected
#[derive(Debug, Clone, Copy)]
pub struct Unconfigured(pub HookRole);

impl Unconfigured {
    fn refuse<T>(&self, operation: &str) -> CollaboratorResult<T> {
        Err(CollaboratorError::rejected(
            operation,
            format!("no {} hook is configured", self.0),
        ))
    }
}

impl StorageArray for Unconfigured {
    fn create_snapshot(&self, _: &VolumeTarget, _: &str, _: &str) -> CollaboratorResult<JobHandle> {
        self.refuse("create-snapshot")
    }

    fn job_status(&self, _: &VolumeTarget, _: &str) -> CollaboratorResult<SnapshotJob> {
        self.refuse("job-status")
    }

    fn list_snapshots(&self, _: &VolumeTarget, _: &str) -> CollaboratorResult<SnapshotListing> {
        self.refuse("list-snapshots")
    }

    fn delete_snapshot(&self, _: &VolumeTarget, _: &str, _: &str) -> CollaboratorResult<()> {
        self.refuse("delete-snapshot")
    }
}

impl DatabaseControl for Unconfigured {
    fn start_backup(&self, _: &DatabaseTarget, _: &str) -> CollaboratorResult<Checkpoint> {
        self.refuse("start-backup")
    }

    fn stop_backup(&self, _: &DatabaseTarget) -> CollaboratorResult<Checkpoint> {
        self.refuse("stop-backup")
    }
}

impl MailTransport for Unconfigured {
    fn send(&self, _: &MailSettings, _: &str, _: &str) -> CollaboratorResult<()> {
        self.refuse("send-mail")
    }
}

impl PagingClient for Unconfigured {
    fn send_incident(&self, _: &Incident) -> CollaboratorResult<()> {
        self.refuse("trigger-incident")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn hook() -> HookCommandConfig {
        HookCommandConfig {
            command: PathBuf::from("/usr/lib/smartbackup/hook"),
            args: Vec::new(),
            transport: Default::default(),
        }
    }

    #[test]
    fn test_require_lists_missing_roles() {
        let settings = HookSettings {
            database: Some(hook()),
            ..Default::default()
        };
        assert!(require(&settings, &[HookRole::Database]).is_ok());

        let err = require(&settings, &[HookRole::Database, HookRole::Storage, HookRole::Mail])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: missing hook command for hooks.storage, hooks.mail"
        );
    }

    #[test]
    fn test_unconfigured_refuses() {
        let storage = storage_array(&HookSettings::default());
        let err = storage
            .create_snapshot(&VolumeTarget::default(), "vol", "snap")
            .unwrap_err();
        assert_eq!(err.to_string(), "create-snapshot rejected: no storage hook is configured");

        let pager = paging_client(&HookSettings::default());
        let incident = Incident {
            service_key: String::new(),
            incident_key: String::new(),
            description: String::new(),
            details: Default::default(),
        };
        assert!(pager.send_incident(&incident).is_err());
    }

    #[test]
    fn test_role_names() {
        assert_eq!(HookRole::Paging.to_string(), "paging");
        assert_eq!("storage".parse::<HookRole>().unwrap(), HookRole::Storage);
    }
}
