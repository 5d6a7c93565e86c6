//! Database hook: enter and leave backup mode.
//!
//! - `start-backup --host --port --dbname --label` prints `{"checkpoint": "..."}`
//! - `stop-backup --host --port --dbname` prints `{"checkpoint": "..."}`
//!
//! Credentials are exported as `SMARTBACKUP_DB_USER` and `SMARTBACKUP_DB_PASSWORD`.

use crate::collaborators::{Checkpoint, CollaboratorResult, DatabaseControl};
use crate::config::HookCommandConfig;
use crate::hook_runner::run_hook;
use crate::hook_traits::{flag, HookArgs};
use crate::types::DatabaseTarget;

fn database_flags(database: &DatabaseTarget) -> Vec<String> {
    let mut args = Vec::with_capacity(8);
    args.extend(flag("host", &database.host));
    args.extend(flag("port", database.port));
    args.extend(flag("dbname", &database.dbname));
    args
}

fn credentials(database: &DatabaseTarget) -> Vec<(String, String)> {
    vec![
        ("SMARTBACKUP_DB_USER".to_string(), database.user.clone()),
        ("SMARTBACKUP_DB_PASSWORD".to_string(), database.password.clone()),
    ]
}

// ============================================================================
// Start Backup
// ============================================================================

#[derive(Debug, Clone)]
pub struct StartBackupArgs<'a> {
    pub database: &'a DatabaseTarget,
    /// Backup label, also used as the snapshot name
    pub label: &'a str,
}

impl HookArgs for StartBackupArgs<'_> {
    fn operation(&self) -> &'static str {
        "start-backup"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = database_flags(self.database);
        args.extend(flag("label", self.label));
        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        credentials(self.database)
    }
}

// ============================================================================
// Stop Backup
// ============================================================================

#[derive(Debug, Clone)]
pub struct StopBackupArgs<'a> {
    pub database: &'a DatabaseTarget,
}

impl HookArgs for StopBackupArgs<'_> {
    fn operation(&self) -> &'static str {
        "stop-backup"
    }

    fn to_cli_args(&self) -> Vec<String> {
        database_flags(self.database)
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        credentials(self.database)
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// [`DatabaseControl`] backed by a hook command
#[derive(Debug, Clone)]
pub struct HookDatabase {
    hook: HookCommandConfig,
}

impl HookDatabase {
    pub fn new(hook: HookCommandConfig) -> Self {
        Self { hook }
    }
}

impl DatabaseControl for HookDatabase {
    fn start_backup(&self, database: &DatabaseTarget, label: &str) -> CollaboratorResult<Checkpoint> {
        let args = StartBackupArgs { database, label };
        run_hook(&self.hook, &args)?.parse_json(args.operation())
    }

    fn stop_backup(&self, database: &DatabaseTarget) -> CollaboratorResult<Checkpoint> {
        let args = StopBackupArgs { database };
        run_hook(&self.hook, &args)?.parse_json(args.operation())
    }
}
