//! Hook process lifecycle
//!
//! Hook commands run while a database may be in backup mode. If smartbackup
//! is interrupted, a hook left running could keep acting on a database or a
//! storage volume with nobody watching the result, so every hook:
//!
//! - runs in its own process group
//! - gets SIGTERM if smartbackup dies (`PR_SET_PDEATHSIG`)
//! - is tracked in a global registry while it runs
//!
//! On SIGINT, SIGTERM or SIGHUP every tracked group is sent SIGTERM, then
//! SIGKILL after a grace period.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Grace period between SIGTERM and SIGKILL when shutting down on a signal
const SIGNAL_GRACE: Duration = Duration::from_secs(3);

/// Running hook processes, by PID (each one leads its own process group)
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    shutting_down: bool,
}

impl ChildRegistry {
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        tracing::debug!("Tracking hook process {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        tracing::debug!("Hook process {} finished", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// SIGTERM every tracked group, wait up to `grace`, then SIGKILL what is left
    pub fn terminate_all(&mut self, grace: Duration) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;

        if self.pids.is_empty() {
            return;
        }

        let pids: Vec<u32> = self.pids.iter().copied().collect();
        tracing::warn!("Stopping {} running hook process(es)", pids.len());

        for &pid in &pids {
            signal_group_or_process(pid, Signal::SIGTERM);
        }

        let start = Instant::now();
        while start.elapsed() < grace {
            if pids.iter().all(|&pid| !is_process_alive(pid)) {
                self.pids.clear();
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in &pids {
            if is_process_alive(pid) {
                tracing::warn!("Hook process group {} ignored SIGTERM, killing it", pid);
                signal_group_or_process(pid, Signal::SIGKILL);
            }
        }
        self.pids.clear();
    }
}

/// Registration of one running hook; unregisters itself when dropped
#[derive(Debug)]
pub struct TrackedChild {
    pid: u32,
}

impl TrackedChild {
    pub fn track(pid: u32) -> Self {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }
        Self { pid }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for TrackedChild {
    fn drop(&mut self) {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(self.pid);
        }
    }
}

/// Signal a whole process group, falling back to the single process
pub fn signal_group_or_process(pid: u32, sig: Signal) {
    if let Err(e) = signal::kill(Pid::from_raw(-(pid as i32)), sig) {
        tracing::debug!("Could not signal process group {}: {}", pid, e);
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), sig) {
            tracing::debug!("Could not signal process {}: {}", pid, e);
        }
    }
}

/// Alive and not a zombie
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Third field of /proc/<pid>/stat is the state
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .split_whitespace()
            .nth(2)
            .is_none_or(|state| !matches!(state, "Z" | "X")),
        Err(_) => true,
    }
}

/// Install SIGINT, SIGTERM and SIGHUP handlers that stop running hooks and exit
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            tracing::error!(
                "Received signal {}, stopping hooks. A database may still be in backup mode",
                sig
            );
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(SIGNAL_GRACE);
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Run a command as the leader of a new process group tied to our lifetime
pub trait CommandProcessGroup {
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: only async-signal-safe calls between fork and exec
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn reaped_within(child: &mut std::process::Child, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if let Ok(Some(_)) = child.try_wait() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_registry_register_unregister() {
        let mut registry = ChildRegistry::default();
        registry.register(1234);
        registry.register(5678);
        registry.register(1234);
        assert_eq!(registry.count(), 2);

        registry.unregister(1234);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_tracked_child_unregisters_on_drop() {
        // Large fake PID so parallel tests cannot collide with it
        let pid = 4_000_001;
        {
            let tracked = TrackedChild::track(pid);
            assert_eq!(tracked.pid(), pid);
            assert!(ChildRegistry::global().lock().unwrap().pids.contains(&pid));
        }
        assert!(!ChildRegistry::global().lock().unwrap().pids.contains(&pid));
    }

    #[test]
    fn test_terminate_all_stops_process_group() {
        let mut child = Command::new("sh")
            .args(["-c", "sleep 60"])
            .in_new_process_group()
            .spawn()
            .expect("spawn sh");

        let mut registry = ChildRegistry::default();
        registry.register(child.id());
        assert!(is_process_alive(child.id()));

        registry.terminate_all(Duration::from_millis(500));

        assert!(reaped_within(&mut child, Duration::from_secs(3)));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_terminate_all_runs_once() {
        let mut registry = ChildRegistry::default();
        registry.register(4_000_002);

        registry.terminate_all(Duration::from_millis(10));
        assert!(registry.is_shutting_down());

        registry.register(4_000_003);
        registry.terminate_all(Duration::from_millis(10));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_terminate_all_with_exited_process() {
        let mut child = Command::new("sh").args(["-c", "exit 0"]).spawn().expect("spawn sh");
        let pid = child.id();
        let _ = child.wait();

        let mut registry = ChildRegistry::default();
        registry.register(pid);
        registry.terminate_all(Duration::from_millis(100));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_nonexistent_process_is_not_alive() {
        assert!(!is_process_alive(999_999));
    }
}
