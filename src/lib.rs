//! smartbackup Library
//!
//! Consistent storage-level backups of running databases: quiesce, snapshot,
//! unquiesce, and tell the operators how it went.

pub mod cli;
pub mod collaborators;
pub mod commands;
pub mod config;
pub mod error;
pub mod hook_runner;
pub mod hook_traits;
pub mod hooks;
pub mod logic;
pub mod notify;
pub mod process_guard;
pub mod template;
pub mod types;
pub mod workflow_state;

// Re-export main types for convenience
pub use collaborators::{
    Checkpoint, CollaboratorError, DatabaseControl, Incident, JobHandle, JobState, MailTransport,
    PagingClient, SnapshotJob, SnapshotListing, SnapshotRecord, StorageArray,
};
pub use config::{ConfigData, HookCommandConfig, MailSettings, PagingSettings};
pub use error::{Result, SmartBackupError};
pub use hook_runner::{run_hook, HookOutput};
pub use hook_traits::HookArgs;
pub use notify::{NotificationDispatcher, NotificationOutcome, NotifyError};
pub use process_guard::{ChildRegistry, CommandProcessGroup};
pub use template::{RenderError, RenderedMessage, SubstitutionPass, TemplateEngine};
pub use types::{
    BackupTargetDeclaration, DatabaseTarget, FailurePolicy, ResolvedBackupTarget,
    TransportConfig, VolumeTarget,
};
pub use workflow_state::{BackupPhase, WorkflowContext, WorkflowTransitionError};

// Orchestration
pub use logic::driver::{BackupDriver, RunReport, TargetReport};
pub use logic::poller::{PollClock, PollPolicy, SnapshotError, SnapshotJobPoller, SystemClock};
pub use logic::resolver::{resolve_targets, MissingReference, Resolution, UnresolvedTarget};
