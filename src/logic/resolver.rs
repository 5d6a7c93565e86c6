//! Backup target resolution
//!
//! Joins each [`BackupTargetDeclaration`] with the database and volume catalogs
//! by name. Pure lookup: no I/O, no side effects.
//!
//! # Resolution Rules
//!
//! | Situation                       | Result |
//! |---------------------------------|--------|
//! | Both names found                | Resolved, volume id taken from the volume entry |
//! | Either name missing             | Unresolved, every missing reference listed |
//! | Same declaration listed twice   | Each copy resolved on its own |
//! | Same catalog name listed twice  | The first catalog entry is used |
//!
//! Input order is kept in both partitions.

use std::fmt;

use crate::config::ConfigData;
use crate::error::{Result, SmartBackupError};
use crate::types::{BackupTargetDeclaration, DatabaseTarget, ResolvedBackupTarget, VolumeTarget};

/// A catalog reference that did not match any entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingReference {
    Database(String),
    Volume(String),
}

impl fmt::Display for MissingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(name) => write!(f, "could not find database {}", name),
            Self::Volume(name) => write!(f, "could not find volume {}", name),
        }
    }
}

/// A declaration that could not be joined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedTarget {
    pub declaration: BackupTargetDeclaration,
    pub missing: Vec<MissingReference>,
}

impl fmt::Display for UnresolvedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reasons: Vec<String> = self.missing.iter().map(ToString::to_string).collect();
        write!(f, "{}: {}", self.declaration.display_name(), reasons.join(", "))
    }
}

/// Declarations split into those that resolved and those that did not
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub resolved: Vec<ResolvedBackupTarget>,
    pub unresolved: Vec<UnresolvedTarget>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    pub fn total(&self) -> usize {
        self.resolved.len() + self.unresolved.len()
    }

    /// Targets to run, or an error if the run must not start.
    ///
    /// # Errors
    ///
    /// `Resolution` if any declaration failed and `allow_invalid` is false, or
    /// if nothing resolved at all.
    pub fn into_targets(self, allow_invalid: bool) -> Result<Vec<ResolvedBackupTarget>> {
        if !self.unresolved.is_empty() {
            tracing::warn!(
                "The following target definitions are not valid, check that they refer to existing database and volume entries"
            );
            for entry in &self.unresolved {
                tracing::warn!("\t{}", entry);
            }
            if !allow_invalid {
                return Err(SmartBackupError::resolution(format!(
                    "{} invalid target(s) and --continue is set to false",
                    self.unresolved.len()
                )));
            }
        }

        if self.resolved.is_empty() {
            return Err(SmartBackupError::resolution(
                "there are no valid configurations to back up",
            ));
        }
        Ok(self.resolved)
    }
}

/// Resolve every declaration in `config`
pub fn resolve_config(config: &ConfigData) -> Resolution {
    resolve_targets(&config.targets, &config.databases, &config.netapp)
}

/// Resolve declarations against the given catalogs
pub fn resolve_targets(
    declarations: &[BackupTargetDeclaration],
    databases: &[DatabaseTarget],
    volumes: &[VolumeTarget],
) -> Resolution {
    let mut resolution = Resolution::default();

    for declaration in declarations {
        match resolve_one(declaration, databases, volumes) {
            Ok(target) => {
                tracing::debug!("Resolved target {}", target.name);
                resolution.resolved.push(target);
            }
            Err(missing) => {
                let unresolved = UnresolvedTarget {
                    declaration: declaration.clone(),
                    missing,
                };
                tracing::warn!("Could not resolve target {}", unresolved);
                resolution.unresolved.push(unresolved);
            }
        }
    }

    resolution
}

fn resolve_one(
    declaration: &BackupTargetDeclaration,
    databases: &[DatabaseTarget],
    volumes: &[VolumeTarget],
) -> std::result::Result<ResolvedBackupTarget, Vec<MissingReference>> {
    let database = databases.iter().find(|d| d.name == declaration.database);
    let volume = volumes.iter().find(|v| v.name == declaration.volume);

    match (database, volume) {
        (Some(database), Some(volume)) => Ok(ResolvedBackupTarget {
            name: declaration.display_name(),
            database: database.clone(),
            volume: volume.clone(),
            volume_id: volume.volume_id.clone(),
        }),
        (database, volume) => {
            let mut missing = Vec::with_capacity(2);
            if database.is_none() {
                missing.push(MissingReference::Database(declaration.database.clone()));
            }
            if volume.is_none() {
                missing.push(MissingReference::Volume(declaration.volume.clone()));
            }
            Err(missing)
        }
    }
}
