//! Hook command execution
//!
//! Every collaborator call made by the binary goes through [`run_hook`]:
//!
//! - the hook runs in its own process group and is tracked in the
//!   [`ChildRegistry`](crate::process_guard::ChildRegistry) while it runs
//! - arguments, environment and stdin come from a typed [`HookArgs`]
//! - the owning collaborator's transport settings are exported to it
//! - with `timeout_secs` set, a hook that overstays the timeout (plus a short
//!   grace) is killed
//!
//! # Exit contract
//!
//! | Exit          | Meaning |
//! |---------------|---------|
//! | 0             | Success; stdout holds one JSON object when the operation returns data |
//! | non-zero      | The collaborator rejected the call; stderr is the reason |

use std::io::Write;
use std::process::{ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::sys::signal::Signal;
use serde::de::DeserializeOwned;

use crate::collaborators::{CollaboratorError, CollaboratorResult};
use crate::config::HookCommandConfig;
use crate::hook_traits::HookArgs;
use crate::process_guard::{signal_group_or_process, CommandProcessGroup, TrackedChild};

/// Time a hook gets past its own timeout before it is killed
const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Captured result of one hook invocation
#[derive(Debug, Clone, Default)]
pub struct HookOutput {
    pub stdout: String,
    pub stderr: String,
    /// None if the hook was ended by a signal
    pub exit_code: Option<i32>,
    pub success: bool,
    /// The hook was killed for exceeding its timeout
    pub timed_out: bool,
}

impl HookOutput {
    pub fn ensure_success(&self, operation: &str) -> CollaboratorResult<()> {
        if self.timed_out {
            return Err(CollaboratorError::rejected(operation, "hook timed out and was killed"));
        }
        if self.success {
            return Ok(());
        }

        let code = self.exit_code.unwrap_or(-1);
        let reason = match self.stderr.trim() {
            "" => format!("exit code {}", code),
            stderr => format!("exit code {}: {}", code, stderr),
        };
        Err(CollaboratorError::rejected(operation, reason))
    }

    /// Check the exit status, then decode stdout as JSON
    pub fn parse_json<T: DeserializeOwned>(&self, operation: &str) -> CollaboratorResult<T> {
        self.ensure_success(operation)?;
        serde_json::from_str(self.stdout.trim())
            .map_err(|e| CollaboratorError::malformed(operation, e.to_string()))
    }
}

/// Run `hook` for one operation and capture its output.
///
/// A non-zero exit is not an error here; callers decide through
/// [`HookOutput::ensure_success`] or [`HookOutput::parse_json`].
///
/// # Errors
///
/// `CollaboratorError::Spawn` if the command cannot be started or waited on.
pub fn run_hook<A: HookArgs>(hook: &HookCommandConfig, args: &A) -> CollaboratorResult<HookOutput> {
    let operation = args.operation();
    let cli_args = args.to_cli_args();
    let mut env_vars = hook.transport.to_env_vars();
    env_vars.extend(args.get_env_vars());
    let input = args.stdin();

    // Values may be credentials, so only names are logged
    let env_names: Vec<&str> = env_vars.iter().map(|(k, _)| k.as_str()).collect();
    tracing::debug!(
        "run_hook: {} {:?} {} args={:?} env={:?}",
        hook.command.display(),
        hook.args,
        operation,
        cli_args,
        env_names
    );

    let spawn_error = |source| CollaboratorError::Spawn {
        operation: operation.to_string(),
        source,
    };

    let mut cmd = Command::new(&hook.command);
    cmd.args(&hook.args)
        .arg(operation)
        .args(&cli_args)
        .envs(env_vars)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .in_new_process_group();

    let mut child = cmd.spawn().map_err(spawn_error)?;
    let tracked = TrackedChild::track(child.id());

    // Fed from its own thread so a hook that writes before reading cannot
    // fill the stdout pipe while we block on stdin
    let feeder = match (input, child.stdin.take()) {
        (Some(input), Some(pipe)) => Some(feed_stdin(pipe, input, operation)),
        _ => None,
    };

    let watchdog = hook
        .transport
        .timeout_secs
        .map(|secs| Watchdog::start(tracked.pid(), operation, Duration::from_secs(secs) + TIMEOUT_GRACE));

    let output = child.wait_with_output().map_err(spawn_error);
    let timed_out = watchdog.is_some_and(Watchdog::finish);
    if let Some(feeder) = feeder {
        if feeder.join().is_err() {
            tracing::warn!("Input writer for {} hook panicked", operation);
        }
    }
    drop(tracked);
    let output = output?;

    let result = HookOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
        success: output.status.success() && !timed_out,
        timed_out,
    };

    if result.success {
        tracing::debug!("Hook {} succeeded", operation);
    } else {
        tracing::debug!("Hook {} failed with exit code {:?}", operation, result.exit_code);
    }
    Ok(result)
}

/// Kills a hook's process group if it is still running when the limit passes
struct Watchdog {
    done: mpsc::Sender<()>,
    handle: JoinHandle<bool>,
}

impl Watchdog {
    fn start(pid: u32, operation: &'static str, limit: Duration) -> Self {
        let (done, finished) = mpsc::channel::<()>();
        let handle = thread::spawn(move || match finished.recv_timeout(limit) {
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("Hook {} still running after {}s, killing it", operation, limit.as_secs());
                signal_group_or_process(pid, Signal::SIGKILL);
                true
            }
            _ => false,
        });
        Self { done, handle }
    }

    /// Stop watching; returns whether the hook was killed
    fn finish(self) -> bool {
        let _ = self.done.send(());
        self.handle.join().unwrap_or(false)
    }
}

/// Write `input` to the hook's stdin, closing the pipe when done
fn feed_stdin(mut pipe: ChildStdin, input: String, operation: &'static str) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Err(e) = pipe.write_all(input.as_bytes()) {
            tracing::warn!("Could not write input to {} hook: {}", operation, e);
        }
    })
}
