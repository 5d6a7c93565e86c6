//! Snapshot job polling
//!
//! Snapshot creation on the storage array is asynchronous: the create request
//! returns a job, and the job is polled until it reports `success` or
//! `failure`. Polling is a plain blocking sleep loop; each target has exactly
//! one job in flight and nothing else to do while it runs.
//!
//! # Bounds
//!
//! | Setting     | Effect |
//! |-------------|--------|
//! | `max_wait`  | Give up once this much time has passed since the job was accepted |
//! | `max_polls` | Give up after this many non-terminal status fetches |
//!
//! Either bound may be `None`. With both unset the loop only ends when the
//! array reports a terminal state or a status fetch fails.
//!
//! A failed status fetch ends the loop immediately and is not retried, so one
//! transient read error is reported the same way as an unreachable array.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::collaborators::{CollaboratorError, JobHandle, JobState, StorageArray};
use crate::types::VolumeTarget;

/// Source of time for the polling loop
pub trait PollClock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time with blocking sleeps
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl PollClock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Polling schedule and bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait before the first status fetch
    pub initial_delay: Duration,
    /// Wait between status fetches
    pub interval: Duration,
    pub max_wait: Option<Duration>,
    pub max_polls: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            interval: Duration::from_secs(5),
            max_wait: Some(Duration::from_secs(3600)),
            max_polls: None,
        }
    }
}

impl PollPolicy {
    /// Poll until a terminal state, however long that takes
    pub fn unbounded() -> Self {
        Self {
            max_wait: None,
            max_polls: None,
            ..Self::default()
        }
    }

    fn exhausted(&self, polls: u32, waited: Duration) -> bool {
        self.max_polls.is_some_and(|max| polls >= max)
            || self.max_wait.is_some_and(|max| waited >= max)
    }
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The array refused the create request
    #[error("Could not create snapshot: {0}")]
    Rejected(#[source] CollaboratorError),

    /// A status fetch failed
    #[error("Could not get job data for {job}: {source}")]
    StatusUnavailable {
        job: String,
        #[source]
        source: CollaboratorError,
    },

    /// The job reached the `failure` state
    #[error("Snapshot job {job} failed with code {code}: {message}")]
    JobFailed {
        job: String,
        code: i64,
        message: String,
    },

    /// Neither terminal state was reported within the configured bounds
    #[error("Snapshot job {job} still not finished after {polls} status checks ({}s)", .waited.as_secs())]
    TimedOut {
        job: String,
        polls: u32,
        waited: Duration,
    },
}

/// A job that reached `success`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedJob {
    pub uuid: String,
    pub end_time: Option<String>,
    /// Status fetches it took to observe success
    pub polls: u32,
}

/// Issues snapshot requests and waits for their jobs
pub struct SnapshotJobPoller {
    policy: PollPolicy,
    clock: Box<dyn PollClock>,
}

impl SnapshotJobPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self::with_clock(policy, Box::new(SystemClock))
    }

    pub fn with_clock(policy: PollPolicy, clock: Box<dyn PollClock>) -> Self {
        Self { policy, clock }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Send the create-snapshot request. Rejections are returned as-is, never retried.
    pub fn request_snapshot(
        &self,
        storage: &dyn StorageArray,
        volume: &VolumeTarget,
        volume_id: &str,
        snapshot_name: &str,
    ) -> Result<JobHandle, SnapshotError> {
        let handle = storage
            .create_snapshot(volume, volume_id, snapshot_name)
            .map_err(|e| {
                tracing::error!("Could not create snapshot {} on {}: {}", snapshot_name, volume_id, e);
                SnapshotError::Rejected(e)
            })?;

        tracing::info!("Created job with id {}", handle.uuid);
        Ok(handle)
    }

    /// Block until the job reaches a terminal state or a bound is hit
    pub fn wait_for_completion(
        &self,
        storage: &dyn StorageArray,
        volume: &VolumeTarget,
        handle: &JobHandle,
    ) -> Result<CompletedJob, SnapshotError> {
        let started = self.clock.now();
        self.clock.sleep(self.policy.initial_delay);

        let mut polls: u32 = 0;
        loop {
            let job = storage.job_status(volume, &handle.uuid).map_err(|source| {
                SnapshotError::StatusUnavailable {
                    job: handle.uuid.clone(),
                    source,
                }
            })?;
            polls += 1;

            match job.state {
                JobState::Success => {
                    tracing::info!(
                        "Job succeeded at {}",
                        job.end_time.as_deref().unwrap_or("unknown time")
                    );
                    return Ok(CompletedJob {
                        uuid: job.uuid,
                        end_time: job.end_time,
                        polls,
                    });
                }
                JobState::Failure => {
                    let code = job.code.unwrap_or_default();
                    let message = job.message.unwrap_or_default();
                    tracing::warn!(
                        "Job failed at {}: {} {}",
                        job.end_time.as_deref().unwrap_or("unknown time"),
                        code,
                        message
                    );
                    return Err(SnapshotError::JobFailed {
                        job: handle.uuid.clone(),
                        code,
                        message,
                    });
                }
                state => {
                    let waited = self.clock.now().saturating_duration_since(started);
                    if self.policy.exhausted(polls, waited) {
                        tracing::error!(
                            "Giving up on snapshot job {} after {} checks, last status {}",
                            handle.uuid,
                            polls,
                            state
                        );
                        return Err(SnapshotError::TimedOut {
                            job: handle.uuid.clone(),
                            polls,
                            waited,
                        });
                    }
                    tracing::info!(
                        "Waiting for snapshot job to complete, current status is {}",
                        state
                    );
                    self.clock.sleep(self.policy.interval);
                }
            }
        }
    }

    /// Request a snapshot and wait for its job
    pub fn snapshot_and_wait(
        &self,
        storage: &dyn StorageArray,
        volume: &VolumeTarget,
        volume_id: &str,
        snapshot_name: &str,
    ) -> Result<CompletedJob, SnapshotError> {
        let handle = self.request_snapshot(storage, volume, volume_id, snapshot_name)?;
        self.wait_for_completion(storage, volume, &handle)
    }
}
