//! Recording collaborators shared by the integration tests.
//!
//! Every call lands in one ordered [`CallLog`] so tests can assert the exact
//! sequence of database, storage and notification traffic.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use smartbackup::collaborators::{
    Checkpoint, CollaboratorError, CollaboratorResult, DatabaseControl, Incident, JobHandle,
    JobState, MailTransport, PagingClient, SnapshotJob, SnapshotListing, StorageArray,
};
use smartbackup::config::{MailSettings, PagingSettings};
use smartbackup::logic::driver::BackupDriver;
use smartbackup::logic::poller::{PollClock, PollPolicy, SnapshotJobPoller};
use smartbackup::notify::NotificationDispatcher;
use smartbackup::types::{DatabaseTarget, ResolvedBackupTarget, VolumeTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartBackup { database: String, label: String },
    StopBackup { database: String },
    CreateSnapshot { volume_id: String, name: String },
    JobStatus { job_id: String },
    Mail { subject: String, body: String },
    Page { incident_key: String, description: String },
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn mails(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Mail { subject, body } => Some((subject, body)),
                _ => None,
            })
            .collect()
    }

    pub fn pages(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Page { incident_key, description } => Some((incident_key, description)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }
}

// ============================================================================
// Database
// ============================================================================

pub struct RecordingDatabase {
    pub log: CallLog,
    /// Databases whose start-backup is rejected, with the reason
    pub fail_start: Vec<(String, String)>,
    pub fail_stop: Vec<(String, String)>,
}

impl RecordingDatabase {
    pub fn new(log: &CallLog) -> Self {
        Self { log: log.clone(), fail_start: Vec::new(), fail_stop: Vec::new() }
    }

    pub fn failing_start(mut self, database: &str, reason: &str) -> Self {
        self.fail_start.push((database.to_string(), reason.to_string()));
        self
    }

    pub fn failing_stop(mut self, database: &str, reason: &str) -> Self {
        self.fail_stop.push((database.to_string(), reason.to_string()));
        self
    }
}

fn failure_for(list: &[(String, String)], database: &str) -> Option<String> {
    list.iter().find(|(d, _)| d == database).map(|(_, r)| r.clone())
}

impl DatabaseControl for RecordingDatabase {
    fn start_backup(&self, database: &DatabaseTarget, label: &str) -> CollaboratorResult<Checkpoint> {
        self.log.push(Call::StartBackup {
            database: database.name.clone(),
            label: label.to_string(),
        });
        match failure_for(&self.fail_start, &database.name) {
            Some(reason) => Err(CollaboratorError::rejected("start-backup", reason)),
            None => Ok(Checkpoint { checkpoint: "ck1".to_string() }),
        }
    }

    fn stop_backup(&self, database: &DatabaseTarget) -> CollaboratorResult<Checkpoint> {
        self.log.push(Call::StopBackup { database: database.name.clone() });
        match failure_for(&self.fail_stop, &database.name) {
            Some(reason) => Err(CollaboratorError::rejected("stop-backup", reason)),
            None => Ok(Checkpoint { checkpoint: "ck2".to_string() }),
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

/// One scripted reply to a job-status fetch
#[derive(Debug, Clone)]
pub enum JobReply {
    State(JobState),
    Failed { code: i64, message: String },
    Unreachable(String),
}

pub struct ScriptedStorage {
    pub log: CallLog,
    pub reject_create: Option<String>,
    /// Replies handed out in order; once empty every fetch reports success
    pub replies: Mutex<VecDeque<JobReply>>,
}

impl ScriptedStorage {
    pub fn new(log: &CallLog) -> Self {
        Self { log: log.clone(), reject_create: None, replies: Mutex::new(VecDeque::new()) }
    }

    pub fn replying(self, replies: Vec<JobReply>) -> Self {
        *self.replies.lock().unwrap() = replies.into();
        self
    }

    pub fn rejecting(mut self, reason: &str) -> Self {
        self.reject_create = Some(reason.to_string());
        self
    }
}

impl StorageArray for ScriptedStorage {
    fn create_snapshot(&self, _: &VolumeTarget, volume_id: &str, name: &str) -> CollaboratorResult<JobHandle> {
        self.log.push(Call::CreateSnapshot {
            volume_id: volume_id.to_string(),
            name: name.to_string(),
        });
        match &self.reject_create {
            Some(reason) => Err(CollaboratorError::rejected("create-snapshot", reason.clone())),
            None => Ok(JobHandle { uuid: format!("job-{}", volume_id) }),
        }
    }

    fn job_status(&self, _: &VolumeTarget, job_id: &str) -> CollaboratorResult<SnapshotJob> {
        self.log.push(Call::JobStatus { job_id: job_id.to_string() });
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(JobReply::State(JobState::Success));

        let job = |state, code, message| SnapshotJob {
            uuid: job_id.to_string(),
            state,
            end_time: Some("2024-05-06T07:08:09Z".to_string()),
            code,
            message,
        };
        match reply {
            JobReply::State(state) => Ok(job(state, None, None)),
            JobReply::Failed { code, message } => Ok(job(JobState::Failure, Some(code), Some(message))),
            JobReply::Unreachable(reason) => Err(CollaboratorError::rejected("job-status", reason)),
        }
    }

    fn list_snapshots(&self, _: &VolumeTarget, _: &str) -> CollaboratorResult<SnapshotListing> {
        Ok(SnapshotListing::default())
    }

    fn delete_snapshot(&self, _: &VolumeTarget, _: &str, _: &str) -> CollaboratorResult<()> {
        Ok(())
    }
}

// ============================================================================
// Notification channels
// ============================================================================

pub struct RecordingMail {
    pub log: CallLog,
    pub fail: bool,
}

impl MailTransport for RecordingMail {
    fn send(&self, _: &MailSettings, subject: &str, body: &str) -> CollaboratorResult<()> {
        self.log.push(Call::Mail { subject: subject.to_string(), body: body.to_string() });
        if self.fail {
            return Err(CollaboratorError::rejected("send-mail", "relay refused"));
        }
        Ok(())
    }
}

pub struct RecordingPager {
    pub log: CallLog,
    pub fail: bool,
}

impl PagingClient for RecordingPager {
    fn send_incident(&self, incident: &Incident) -> CollaboratorResult<()> {
        self.log.push(Call::Page {
            incident_key: incident.incident_key.clone(),
            description: incident.description.clone(),
        });
        if self.fail {
            return Err(CollaboratorError::rejected("trigger-incident", "503"));
        }
        Ok(())
    }
}

// ============================================================================
// Time
// ============================================================================

/// Clock whose sleeps only move a counter forward
#[derive(Debug, Clone)]
pub struct FakeClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl Default for FakeClock {
    fn default() -> Self {
        Self { start: Instant::now(), elapsed: Arc::default() }
    }
}

impl FakeClock {
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }
}

impl PollClock for FakeClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn target(name: &str, host: &str) -> ResolvedBackupTarget {
    ResolvedBackupTarget {
        name: name.to_string(),
        database: DatabaseTarget {
            name: name.to_string(),
            host: host.to_string(),
            port: 5432,
            dbname: format!("{}_prod", name),
            user: "backup".to_string(),
            password: "secret".to_string(),
        },
        volume: VolumeTarget {
            name: format!("vol-{}", name),
            endpoint: "cluster1.example.com".to_string(),
            svm: "svm1".to_string(),
            volume_id: format!("id-{}", name),
            ..Default::default()
        },
        volume_id: format!("id-{}", name),
    }
}

pub fn mail_settings(always_send: bool) -> MailSettings {
    MailSettings {
        server: "mail.example.com".to_string(),
        from: "smartbackup@example.com".to_string(),
        send_to: vec!["dba@example.com".to_string()],
        always_send,
        ..Default::default()
    }
}

pub fn paging_settings() -> PagingSettings {
    PagingSettings { service_key: "pd-key".to_string() }
}

pub fn dispatcher(log: &CallLog, mail: MailSettings, paging: PagingSettings) -> NotificationDispatcher {
    NotificationDispatcher::new(
        mail,
        paging,
        Box::new(RecordingMail { log: log.clone(), fail: false }),
        Box::new(RecordingPager { log: log.clone(), fail: false }),
    )
}

pub fn driver(
    database: RecordingDatabase,
    storage: ScriptedStorage,
    notifier: NotificationDispatcher,
    policy: PollPolicy,
) -> BackupDriver {
    BackupDriver::new(
        Box::new(storage),
        Box::new(database),
        notifier,
        SnapshotJobPoller::with_clock(policy, Box::new(FakeClock::default())),
    )
}
