use clap::{ArgAction, ArgGroup, Parser};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

/// smartbackup - consistent storage snapshots of running databases
#[derive(Parser, Debug)]
#[command(name = "smartbackup")]
#[command(about = "Quiesce databases, snapshot their volumes and report the outcome")]
#[command(version)]
#[command(group(ArgGroup::new("test_mode").multiple(false)))]
pub struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Skip targets that do not resolve instead of exiting
    #[arg(long = "continue", default_value_t = true, action = ArgAction::Set)]
    pub continue_on_invalid: bool,

    /// Send a test failure notification and exit
    #[arg(long, group = "test_mode")]
    pub test_message: bool,

    /// List the snapshots of every target and exit
    #[arg(long, group = "test_mode")]
    pub test_list: bool,

    /// Delete this snapshot from the first target's volume and exit
    #[arg(long, value_name = "SNAPSHOT_ID", group = "test_mode")]
    pub test_delete: Option<String>,
}

/// What one invocation does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Backup,
    TestMessage,
    TestList,
    TestDelete(String),
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    pub fn mode(&self) -> RunMode {
        if self.test_message {
            RunMode::TestMessage
        } else if self.test_list {
            RunMode::TestList
        } else if let Some(id) = &self.test_delete {
            RunMode::TestDelete(id.clone())
        } else {
            RunMode::Backup
        }
    }
}
