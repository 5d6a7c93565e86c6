//! Backup orchestration
//!
//! Runs each resolved target through quiesce, snapshot and unquiesce, one
//! target at a time and in input order. Every step is recorded in a
//! [`WorkflowContext`], so the phase history in the report is exactly what
//! happened to the database.
//!
//! # Failure Policy
//!
//! | Failure                  | Notify | Next step |
//! |--------------------------|--------|-----------|
//! | Quiesce                  | yes    | Stop this target; end the run under `AbortRun` |
//! | Snapshot request or job  | yes    | Unquiesce anyway |
//! | Unquiesce                | yes    | End the run under `AbortRun` |
//! | Notification             | no     | Logged only |

use std::fmt;

use chrono::{DateTime, Local, SecondsFormat};

use crate::collaborators::{Checkpoint, DatabaseControl, StorageArray};
use crate::error::{Result, SmartBackupError};
use crate::logic::poller::SnapshotJobPoller;
use crate::notify::NotificationDispatcher;
use crate::template::{FAILURE_BODY, FAILURE_SUBJECT, SUCCESS_BODY, SUCCESS_SUBJECT};
use crate::types::{FailurePolicy, ResolvedBackupTarget};
use crate::workflow_state::{BackupPhase, WorkflowContext};

// ============================================================================
// Reports
// ============================================================================

/// What happened to one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub target: String,
    pub final_phase: BackupPhase,
    pub label: String,
    /// Checkpoint returned when the database entered backup mode
    pub quiesce_checkpoint: Option<Checkpoint>,
    /// Checkpoint returned when the database left backup mode
    pub completion_checkpoint: Option<Checkpoint>,
    pub snapshot_job: Option<String>,
    pub snapshot_error: Option<String>,
    /// Quiesce or unquiesce failure
    pub database_error: Option<String>,
    pub phases: Vec<BackupPhase>,
}

impl TargetReport {
    fn new(target: &str, label: &str) -> Self {
        Self {
            target: target.to_string(),
            final_phase: BackupPhase::Idle,
            label: label.to_string(),
            quiesce_checkpoint: None,
            completion_checkpoint: None,
            snapshot_job: None,
            snapshot_error: None,
            database_error: None,
            phases: Vec::new(),
        }
    }

    /// Snapshot taken and database released
    pub fn succeeded(&self) -> bool {
        self.final_phase == BackupPhase::Complete && self.snapshot_error.is_none()
    }

    fn finish(mut self, ctx: &WorkflowContext) -> Self {
        self.final_phase = ctx.current_phase();
        self.phases = ctx.phases();
        if self.final_phase.holds_database() {
            tracing::error!(
                "{} ended in phase {}, database may still be in backup mode",
                self.target,
                self.final_phase
            );
        }
        self
    }
}

impl fmt::Display for TargetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.succeeded() {
            return write!(f, "{}: backed up as {}", self.target, self.label);
        }
        let cause = self
            .database_error
            .as_deref()
            .or(self.snapshot_error.as_deref())
            .unwrap_or("unknown error");
        write!(f, "{}: {} ({})", self.target, self.final_phase, cause)
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub targets: Vec<TargetReport>,
    /// A fatal failure ended the run early
    pub aborted: bool,
    /// Targets never started because the run was aborted
    pub skipped: Vec<String>,
}

impl RunReport {
    pub fn all_succeeded(&self) -> bool {
        !self.aborted && self.targets.iter().all(TargetReport::succeeded)
    }

    pub fn failed_count(&self) -> usize {
        self.targets.iter().filter(|t| !t.succeeded()).count()
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Sequential backup runner
pub struct BackupDriver {
    storage: Box<dyn StorageArray>,
    database: Box<dyn DatabaseControl>,
    notifier: NotificationDispatcher,
    poller: SnapshotJobPoller,
    policy: FailurePolicy,
}

impl BackupDriver {
    pub fn new(
        storage: Box<dyn StorageArray>,
        database: Box<dyn DatabaseControl>,
        notifier: NotificationDispatcher,
        poller: SnapshotJobPoller,
    ) -> Self {
        Self {
            storage,
            database,
            notifier,
            poller,
            policy: FailurePolicy::default(),
        }
    }

    /// Set what a quiesce or unquiesce failure does to the remaining targets
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn storage(&self) -> &dyn StorageArray {
        self.storage.as_ref()
    }

    pub fn notifier(&self) -> &NotificationDispatcher {
        &self.notifier
    }

    /// Back up every target in order
    pub fn run(&self, targets: &[ResolvedBackupTarget]) -> RunReport {
        let mut report = RunReport::default();

        for (index, target) in targets.iter().enumerate() {
            let target_report = match self.run_target(target) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!("Backup of {} stopped on an internal error: {}", target.name, e);
                    report.aborted = true;
                    report.skipped = remaining_names(targets, index + 1);
                    break;
                }
            };

            let fatal = target_report.final_phase.is_fatal();
            tracing::info!("{}", target_report);
            report.targets.push(target_report);

            if fatal && self.policy == FailurePolicy::AbortRun {
                report.aborted = true;
                report.skipped = remaining_names(targets, index + 1);
                if !report.skipped.is_empty() {
                    tracing::error!(
                        "Not backing up remaining targets: {}",
                        report.skipped.join(", ")
                    );
                }
                break;
            }
        }

        report
    }

    /// Run one target's workflow.
    ///
    /// Collaborator failures are recorded in the report. Only an illegal phase
    /// transition is returned as an error.
    pub fn run_target(&self, target: &ResolvedBackupTarget) -> Result<TargetReport> {
        let label = backup_label(&target.database.name, Local::now());
        tracing::info!("Database backup name is {}", label);

        let mut ctx = WorkflowContext::new();
        let mut report = TargetReport::new(&target.name, &label);

        // Quiesce
        ctx.transition_to(BackupPhase::Quiescing)?;
        match self.database.start_backup(&target.database, &label) {
            Ok(checkpoint) => {
                tracing::info!("Database quiesced, consistent state ID is {}", checkpoint);
                report.quiesce_checkpoint = Some(checkpoint);
                ctx.transition_to(BackupPhase::Quiesced)?;
            }
            Err(source) => {
                let err = SmartBackupError::Quiesce {
                    database: target.database.name.clone(),
                    source,
                };
                self.record_failure(target, &ctx, &err);
                report.database_error = Some(err.to_string());
                ctx.transition_to(BackupPhase::QuiesceFailed)?;
                return Ok(report.finish(&ctx));
            }
        }

        // Snapshot
        ctx.transition_to(BackupPhase::SnapshotInFlight)?;
        match self
            .poller
            .snapshot_and_wait(self.storage.as_ref(), &target.volume, &target.volume_id, &label)
        {
            Ok(job) => {
                report.snapshot_job = Some(job.uuid);
                ctx.transition_to(BackupPhase::SnapshotDone)?;
            }
            Err(e) => {
                let err = SmartBackupError::from(e);
                self.record_failure(target, &ctx, &err);
                report.snapshot_error = Some(err.to_string());
                ctx.transition_to(BackupPhase::SnapshotFailed)?;
            }
        }

        // Unquiesce
        ctx.transition_to(BackupPhase::Unquiescing)?;
        match self.database.stop_backup(&target.database) {
            Ok(checkpoint) => {
                tracing::info!("Database unquiesced, completed state ID is {}", checkpoint);
                report.completion_checkpoint = Some(checkpoint);
                ctx.transition_to(BackupPhase::Complete)?;
            }
            Err(source) => {
                let err = SmartBackupError::Unquiesce {
                    database: target.database.name.clone(),
                    source,
                };
                self.record_failure(target, &ctx, &err);
                report.database_error = Some(err.to_string());
                ctx.transition_to(BackupPhase::UnquiesceFailed)?;
                return Ok(report.finish(&ctx));
            }
        }

        if self.notifier.mail_settings().always_send {
            if let Err(e) = self.notifier.notify(target, SUCCESS_SUBJECT, SUCCESS_BODY, "") {
                tracing::error!("Could not send success message for {}: {}", target.name, e);
            }
        }

        Ok(report.finish(&ctx))
    }

    fn record_failure(&self, target: &ResolvedBackupTarget, ctx: &WorkflowContext, err: &SmartBackupError) {
        tracing::error!(
            "Backup of {} failed while {}: {}",
            target.name,
            ctx.current_phase(),
            err
        );
        if let Err(e) = self
            .notifier
            .notify(target, FAILURE_SUBJECT, FAILURE_BODY, &err.to_string())
        {
            tracing::error!("Could not send error message for {}: {}", target.name, e);
        }
    }
}

/// Label used for both the database backup and the snapshot
pub fn backup_label(database: &str, now: DateTime<Local>) -> String {
    format!("{}_{}", database, now.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn remaining_names(targets: &[ResolvedBackupTarget], from: usize) -> Vec<String> {
    targets
        .get(from..)
        .unwrap_or_default()
        .iter()
        .map(|t| t.name.clone())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        CollaboratorError, CollaboratorResult, Incident, JobHandle, JobState, MailTransport,
        PagingClient, SnapshotJob, SnapshotListing,
    };
    use crate::config::{MailSettings, PagingSettings};
    use crate::logic::poller::{PollClock, PollPolicy};
    use crate::types::{DatabaseTarget, VolumeTarget};
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    type Log = Arc<Mutex<Vec<String>>>;

    struct NoSleep;

    impl PollClock for NoSleep {
        fn now(&self) -> Instant {
            Instant::now()
        }
        fn sleep(&self, _: Duration) {}
    }

    struct Db {
        log: Log,
        fail_start_for: Option<&'static str>,
        fail_stop: bool,
    }

    impl DatabaseControl for Db {
        fn start_backup(&self, db: &DatabaseTarget, _: &str) -> CollaboratorResult<Checkpoint> {
            self.log.lock().unwrap().push(format!("start {}", db.name));
            if self.fail_start_for == Some(db.name.as_str()) {
                return Err(CollaboratorError::rejected("start-backup", "lock timeout"));
            }
            Ok(Checkpoint { checkpoint: "ck1".to_string() })
        }

        fn stop_backup(&self, db: &DatabaseTarget) -> CollaboratorResult<Checkpoint> {
            self.log.lock().unwrap().push(format!("stop {}", db.name));
            if self.fail_stop {
                return Err(CollaboratorError::rejected("stop-backup", "not in backup mode"));
            }
            Ok(Checkpoint { checkpoint: "ck2".to_string() })
        }
    }

    struct Array {
        log: Log,
        final_state: JobState,
    }

    impl StorageArray for Array {
        fn create_snapshot(&self, _: &VolumeTarget, volume_id: &str, _: &str) -> CollaboratorResult<JobHandle> {
            self.log.lock().unwrap().push(format!("snapshot {}", volume_id));
            Ok(JobHandle { uuid: "job-1".to_string() })
        }

        fn job_status(&self, _: &VolumeTarget, job_id: &str) -> CollaboratorResult<SnapshotJob> {
            Ok(SnapshotJob {
                uuid: job_id.to_string(),
                state: self.final_state,
                end_time: None,
                code: Some(500),
                message: Some("insufficient space".to_string()),
            })
        }

        fn list_snapshots(&self, _: &VolumeTarget, _: &str) -> CollaboratorResult<SnapshotListing> {
            Ok(SnapshotListing::default())
        }

        fn delete_snapshot(&self, _: &VolumeTarget, _: &str, _: &str) -> CollaboratorResult<()> {
            Ok(())
        }
    }

    struct Mail(Log);

    impl MailTransport for Mail {
        fn send(&self, _: &MailSettings, subject: &str, _: &str) -> CollaboratorResult<()> {
            self.0.lock().unwrap().push(format!("mail {}", subject));
            Ok(())
        }
    }

    struct NoPager;

    impl PagingClient for NoPager {
        fn send_incident(&self, _: &Incident) -> CollaboratorResult<()> {
            Ok(())
        }
    }

    fn target(name: &str) -> ResolvedBackupTarget {
        ResolvedBackupTarget {
            name: name.to_string(),
            database: DatabaseTarget {
                name: name.to_string(),
                host: "db1".to_string(),
                ..Default::default()
            },
            volume: VolumeTarget::default(),
            volume_id: format!("vol-{}", name),
        }
    }

    fn driver(log: &Log, db: Db, final_state: JobState, always_send: bool) -> BackupDriver {
        let mail_settings = MailSettings {
            server: "mail".to_string(),
            send_to: vec!["dba@example.com".to_string()],
            always_send,
            ..Default::default()
        };
        let notifier = NotificationDispatcher::new(
            mail_settings,
            PagingSettings::default(),
            Box::new(Mail(log.clone())),
            Box::new(NoPager),
        );
        let poller = SnapshotJobPoller::with_clock(PollPolicy::default(), Box::new(NoSleep));
        BackupDriver::new(
            Box::new(Array { log: log.clone(), final_state }),
            Box::new(db),
            notifier,
            poller,
        )
    }

    fn db(log: &Log) -> Db {
        Db { log: log.clone(), fail_start_for: None, fail_stop: false }
    }

    #[test]
    fn test_complete_run_records_checkpoints() {
        let log = Log::default();
        let driver = driver(&log, db(&log), JobState::Success, false);

        let report = driver.run(&[target("orders")]);

        assert!(report.all_succeeded());
        let t = &report.targets[0];
        assert_eq!(t.quiesce_checkpoint.as_ref().unwrap().checkpoint, "ck1");
        assert_eq!(t.completion_checkpoint.as_ref().unwrap().checkpoint, "ck2");
        assert_eq!(t.snapshot_job.as_deref(), Some("job-1"));
        assert_eq!(t.phases.len(), 6);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start orders", "snapshot vol-orders", "stop orders"]
        );
    }

    #[test]
    fn test_unquiesce_failure_aborts_run() {
        let log = Log::default();
        let mut database = db(&log);
        database.fail_stop = true;
        let driver = driver(&log, database, JobState::Success, false);

        let report = driver.run(&[target("a"), target("b"), target("c")]);

        assert!(report.aborted);
        assert_eq!(report.targets.len(), 1);
        assert_eq!(report.targets[0].final_phase, BackupPhase::UnquiesceFailed);
        assert_eq!(report.skipped, vec!["b", "c"]);
        assert!(log.lock().unwrap().iter().any(|l| l.starts_with("mail URGENT")));
    }

    #[test]
    fn test_continue_policy_isolates_targets() {
        let log = Log::default();
        let mut database = db(&log);
        database.fail_start_for = Some("a");
        let driver =
            driver(&log, database, JobState::Success, false).with_failure_policy(FailurePolicy::Continue);

        let report = driver.run(&[target("a"), target("b")]);

        assert!(!report.aborted);
        assert_eq!(report.targets.len(), 2);
        assert_eq!(report.targets[0].final_phase, BackupPhase::QuiesceFailed);
        assert!(report.targets[1].succeeded());
        assert_eq!(report.failed_count(), 1);
        assert!(!report.all_succeeded());
    }

    #[test]
    fn test_snapshot_failure_still_gets_always_send_message() {
        let log = Log::default();
        let driver = driver(&log, db(&log), JobState::Failure, true);

        let report = driver.run(&[target("orders")]);
        let t = &report.targets[0];

        assert_eq!(t.final_phase, BackupPhase::Complete);
        assert!(!t.succeeded());
        assert!(t.snapshot_error.as_deref().unwrap().contains("insufficient space"));

        let mails: Vec<String> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.starts_with("mail"))
            .cloned()
            .collect();
        assert_eq!(
            mails,
            vec!["mail URGENT: orders backup failed", "mail orders backed up"]
        );
    }

    #[test]
    fn test_report_display() {
        let log = Log::default();
        let mut database = db(&log);
        database.fail_start_for = Some("orders");
        let driver = driver(&log, database, JobState::Success, false);

        let report = driver.run(&[target("orders")]);
        let text = report.targets[0].to_string();
        assert!(text.starts_with("orders: quiesce failed"));
        assert!(text.contains("lock timeout"));
    }

    #[test]
    fn test_backup_label_format() {
        let now = Local.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let label = backup_label("orders", now);
        assert!(label.starts_with("orders_2024-05-06T07:08:09"));
        assert!(!label.contains('.'));
    }

    #[test]
    fn test_empty_run() {
        let log = Log::default();
        let driver = driver(&log, db(&log), JobState::Success, true);
        let report = driver.run(&[]);
        assert!(report.all_succeeded());
        assert!(log.lock().unwrap().is_empty());
    }
}
