//! Configuration document loading and validation.
//!
//! The document is YAML and is read exactly once at startup. Nothing in it is
//! mutated afterwards.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logic::poller::PollPolicy;
use crate::types::{
    BackupTargetDeclaration, DatabaseTarget, FailurePolicy, TransportConfig, VolumeTarget,
};

/// Default location of the configuration document
pub const DEFAULT_CONFIG_PATH: &str = "/etc/smartbackup.yaml";

/// Mail channel settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailSettings {
    /// Mail relay host. Empty means the mail channel is not configured.
    #[serde(default)]
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub send_to: Vec<String>,
    /// Also send a message when a backup succeeds
    #[serde(default)]
    pub always_send: bool,
}

fn default_smtp_port() -> u16 {
    25
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: default_smtp_port(),
            from: String::new(),
            send_to: Vec::new(),
            always_send: false,
        }
    }
}

impl MailSettings {
    #[inline]
    pub fn is_configured(&self) -> bool {
        !self.server.trim().is_empty()
    }
}

/// Paging channel settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PagingSettings {
    /// Integration key. Empty means the paging channel is not configured.
    #[serde(default)]
    pub service_key: String,
}

impl PagingSettings {
    #[inline]
    pub fn is_configured(&self) -> bool {
        !self.service_key.trim().is_empty()
    }
}

/// Snapshot job polling schedule and bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Give up on a job after this long. Omitted means one hour; an explicit
    /// `null` polls until the job reports a terminal state, however long that
    /// takes. Earlier releases of the tool had no limit at all, so set `null`
    /// to keep that behaviour.
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: Option<u64>,
    /// Give up on a job after this many status fetches. `null` means no limit.
    #[serde(default)]
    pub max_polls: Option<u32>,
}

fn default_initial_delay() -> u64 {
    1
}

fn default_interval() -> u64 {
    5
}

fn default_max_wait() -> Option<u64> {
    Some(3600)
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay(),
            interval_secs: default_interval(),
            max_wait_secs: default_max_wait(),
            max_polls: None,
        }
    }
}

impl PollingSettings {
    pub fn to_policy(&self) -> PollPolicy {
        PollPolicy {
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            interval: Duration::from_secs(self.interval_secs),
            max_wait: self.max_wait_secs.map(Duration::from_secs),
            max_polls: self.max_polls,
        }
    }
}

/// External command bound to one collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookCommandConfig {
    pub command: PathBuf,
    /// Arguments placed before the operation name
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Hook commands for every collaborator
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HookSettings {
    #[serde(default)]
    pub database: Option<HookCommandConfig>,
    #[serde(default)]
    pub storage: Option<HookCommandConfig>,
    #[serde(default)]
    pub mail: Option<HookCommandConfig>,
    #[serde(default)]
    pub paging: Option<HookCommandConfig>,
}

/// The whole configuration document
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigData {
    #[serde(default)]
    pub smtp: MailSettings,
    #[serde(default)]
    pub pagerduty: PagingSettings,
    /// Storage volume catalog
    #[serde(default)]
    pub netapp: Vec<VolumeTarget>,
    /// Database catalog
    #[serde(default)]
    pub databases: Vec<DatabaseTarget>,
    #[serde(default)]
    pub targets: Vec<BackupTargetDeclaration>,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub on_target_failure: FailurePolicy,
    #[serde(default)]
    pub hooks: HookSettings,
}

impl ConfigData {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).context("Failed to parse configuration YAML")?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Duplicate catalog names are only warned about: the first entry wins at
    /// resolution time.
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_secs == 0 {
            anyhow::bail!("polling.interval_secs must be greater than zero");
        }
        if self.polling.max_polls == Some(0) {
            anyhow::bail!("polling.max_polls must be greater than zero when set");
        }

        if self.smtp.is_configured() && self.smtp.send_to.is_empty() {
            anyhow::bail!("smtp.server is set but smtp.send_to is empty");
        }

        for (section, hook) in [
            ("database", &self.hooks.database),
            ("storage", &self.hooks.storage),
            ("mail", &self.hooks.mail),
            ("paging", &self.hooks.paging),
        ] {
            if let Some(hook) = hook {
                if hook.command.as_os_str().is_empty() {
                    anyhow::bail!("hooks.{}.command must not be empty", section);
                }
            }
        }

        for name in duplicates(self.databases.iter().map(|d| d.name.as_str())) {
            tracing::warn!("Database '{}' is defined more than once; the first entry is used", name);
        }
        for name in duplicates(self.netapp.iter().map(|v| v.name.as_str())) {
            tracing::warn!("Volume '{}' is defined more than once; the first entry is used", name);
        }

        Ok(())
    }
}

fn duplicates<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut dups = Vec::new();
    for name in names {
        if !seen.insert(name) && !dups.contains(&name) {
            dups.push(name);
        }
    }
    dups
}
