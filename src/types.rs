//! Backup target types
//!
//! Catalog entries as authored in the configuration document, and the joined
//! [`ResolvedBackupTarget`] the driver consumes.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A database that can be put into and out of backup mode
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatabaseTarget {
    /// Catalog name referenced by backup targets
    pub name: String,
    pub host: String,
    #[serde(default = "default_database_port")]
    pub port: u16,
    /// Logical database name on the server
    pub dbname: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_database_port() -> u16 {
    5432
}

/// Transport settings for one collaborator.
///
/// Each collaborator receives its own copy at construction time; there is no
/// process-wide default that other collaborators could observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Verify the peer's TLS certificate
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    /// Per-request timeout handed to the collaborator, if any
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_verify_tls() -> bool {
    true
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            verify_tls: true,
            timeout_secs: None,
        }
    }
}

impl TransportConfig {
    /// Environment variables describing this transport to a hook command
    pub fn to_env_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![(
            "SMARTBACKUP_VERIFY_TLS".to_string(),
            if self.verify_tls { "1" } else { "0" }.to_string(),
        )];
        if let Some(timeout) = self.timeout_secs {
            vars.push(("SMARTBACKUP_TIMEOUT_SECS".to_string(), timeout.to_string()));
        }
        vars
    }
}

/// A storage-array volume that snapshots are taken of
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeTarget {
    /// Catalog name referenced by backup targets
    pub name: String,
    /// Storage-management endpoint (host name or base URL)
    pub endpoint: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Storage virtual machine owning the volume
    #[serde(default)]
    pub svm: String,
    pub volume_id: String,
}

/// A named pairing of one database entry and one volume entry
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackupTargetDeclaration {
    #[serde(default)]
    pub name: Option<String>,
    /// Name of a [`DatabaseTarget`] in the catalog
    pub database: String,
    /// Name of a [`VolumeTarget`] in the catalog
    pub volume: String,
}

impl BackupTargetDeclaration {
    /// Display name: the explicit name, or `database/volume`
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("{}/{}", self.database, self.volume),
        }
    }
}

impl std::fmt::Display for BackupTargetDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (database={}, volume={})",
            self.display_name(),
            self.database,
            self.volume
        )
    }
}

/// A declaration after both of its names were found in the catalogs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBackupTarget {
    pub name: String,
    pub database: DatabaseTarget,
    pub volume: VolumeTarget,
    /// The volume every snapshot operation for this target is issued against
    pub volume_id: String,
}

impl ResolvedBackupTarget {
    /// Placeholder target used for synthetic test notifications
    pub fn synthetic() -> Self {
        Self {
            name: "test-message".to_string(),
            database: DatabaseTarget::default(),
            volume: VolumeTarget::default(),
            volume_id: String::new(),
        }
    }
}

/// What to do with the rest of the run when a target cannot quiesce or unquiesce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop processing further targets
    #[default]
    AbortRun,
    /// Record the failure and move on to the next target
    Continue,
}
