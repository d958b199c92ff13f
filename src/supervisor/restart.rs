//! Restart workflow as an explicit state machine.
//!
//! ```text
//! Unknown ──live pid──▶ Alive ──SIGTERM──▶ Terminating ──exited──▶ Launching ──▶ Recorded
//!    └──────no live pid────────────────────────────────────────────────┘
//! ```
//!
//! `Terminating` fails with `RestartTimeout` once its deadline passes; `Launching` fails
//! with `LaunchFailure` when the process cannot be spawned or dies during its startup
//! grace. The pid file is only written on entry to `Recorded`, atomically, so a failure
//! at any earlier point leaves it exactly as it was.

use super::{liveness, pidfile};
use crate::error::OrganError;
use crate::model::{OrganSpec, RestartOutcome, RestartState};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RestartPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub startup_grace: Duration,
    pub kill_after_timeout: bool,
    pub dry_run: bool,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            startup_grace: Duration::from_millis(250),
            kill_after_timeout: false,
            dry_run: false,
        }
    }
}

pub(crate) struct RestartMachine<'a> {
    spec: &'a OrganSpec,
    policy: &'a RestartPolicy,
    state: RestartState,
    previous_pid: Option<i32>,
    trace: Vec<RestartState>,
}

impl<'a> RestartMachine<'a> {
    pub(crate) fn new(spec: &'a OrganSpec, policy: &'a RestartPolicy) -> Self {
        Self {
            spec,
            policy,
            state: RestartState::Unknown,
            previous_pid: None,
            trace: vec![RestartState::Unknown],
        }
    }

    /// Drive the machine to `Recorded` (or, in dry-run, up to the point of launching).
    pub(crate) async fn run(mut self) -> Result<RestartOutcome, OrganError> {
        loop {
            if matches!(self.state, RestartState::Recorded { .. }) {
                break;
            }
            if self.policy.dry_run && self.state == RestartState::Launching {
                info!(organ = %self.spec.name, plan = ?self.trace, "dry run: restart planned");
                break;
            }
            self.step().await?;
        }

        let new_pid = match self.state {
            RestartState::Recorded { pid } => Some(pid),
            _ => None,
        };
        Ok(RestartOutcome {
            organ: self.spec.name.clone(),
            tier: self.spec.tier,
            previous_pid: self.previous_pid,
            new_pid,
            dry_run: self.policy.dry_run,
            trace: self.trace,
        })
    }

    fn enter(&mut self, next: RestartState) {
        debug!(organ = %self.spec.name, from = self.state.label(), to = next.label(), "restart transition");
        self.state = next;
        self.trace.push(next);
    }

    /// Perform exactly one transition.
    async fn step(&mut self) -> Result<(), OrganError> {
        match self.state {
            RestartState::Unknown => {
                let pid_file = self.spec.pid_file.clone();
                let (recorded, alive) = off_executor(move || {
                    let pid = pidfile::read_pid(&pid_file);
                    (pid, pid.is_some_and(liveness::is_alive))
                })
                .await
                .unwrap_or((None, false));
                self.previous_pid = recorded;
                match recorded.filter(|_| alive) {
                    Some(pid) if liveness::is_console(pid) => {
                        warn!(organ = %self.spec.name, pid, "pid file names the console itself; not signalling");
                        self.enter(RestartState::Launching);
                    }
                    Some(pid) => self.enter(RestartState::Alive { pid }),
                    None => self.enter(RestartState::Launching),
                }
            }
            RestartState::Alive { pid } => {
                if !self.policy.dry_run {
                    send_terminate(pid);
                }
                self.enter(RestartState::Terminating { pid });
            }
            RestartState::Terminating { pid } => {
                if !self.policy.dry_run {
                    self.await_exit(pid).await?;
                }
                self.enter(RestartState::Launching);
            }
            RestartState::Launching => {
                let pid = self.launch().await?;
                self.enter(RestartState::Recorded { pid });
            }
            RestartState::Recorded { .. } => {}
        }
        Ok(())
    }

    async fn await_exit(&self, pid: i32) -> Result<(), OrganError> {
        if wait_for_exit(pid, self.policy.timeout, self.policy.poll_interval).await {
            return Ok(());
        }
        if self.policy.kill_after_timeout {
            warn!(organ = %self.spec.name, pid, "ignored SIGTERM; sending SIGKILL");
            send_kill(pid);
            if wait_for_exit(pid, self.policy.timeout, self.policy.poll_interval).await {
                return Ok(());
            }
        }
        Err(OrganError::RestartTimeout {
            organ: self.spec.name.clone(),
            pid,
            waited: self.policy.timeout,
        })
    }

    async fn launch(&self) -> Result<i32, OrganError> {
        let spec = self.spec;
        let failure = |reason: String| OrganError::LaunchFailure {
            organ: spec.name.clone(),
            reason,
        };

        let log_file = spec.log_file.clone();
        let (log, log_err) = off_executor(move || open_log(&log_file))
            .await
            .map_err(|e| failure(format!("log setup task failed: {e}")))?
            .map_err(failure)?;

        let mut child = Command::new(&spec.command)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| failure(format!("spawn {}: {e}", spec.command.display())))?;

        let pid = child
            .id()
            .map(|id| id as i32)
            .ok_or_else(|| failure("process exited before its pid could be read".into()))?;

        if !self.policy.startup_grace.is_zero() {
            tokio::time::sleep(self.policy.startup_grace).await;
        }
        if let Ok(Some(status)) = child.try_wait() {
            return Err(failure(format!("exited during startup with {status}")));
        }

        let pid_file = spec.pid_file.clone();
        let written = off_executor(move || pidfile::write_pid(&pid_file, pid))
            .await
            .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)));
        if let Err(source) = written {
            // An unrecorded organ would be invisible to the console; do not leave it running.
            let _ = child.start_kill();
            return Err(OrganError::Persistence {
                organ: spec.name.clone(),
                path: spec.pid_file.clone(),
                source,
            });
        }
        info!(organ = %spec.name, pid, "organ launched");
        // Dropping the handle leaves the organ running; the runtime reaps it once it exits.
        drop(child);
        Ok(pid)
    }
}

/// Run filesystem and process-table work on the blocking pool.
async fn off_executor<T, F>(f: F) -> Result<T, tokio::task::JoinError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await
}

/// Append-mode handles for the organ's stdout and stderr.
fn open_log(path: &Path) -> Result<(File, File), String> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("create log dir {}: {e}", dir.display()))?;
    }
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("open log {}: {e}", path.display()))?;
    let log_err = log
        .try_clone()
        .map_err(|e| format!("clone log handle: {e}"))?;
    Ok((log, log_err))
}

/// Poll until `pid` is gone or `timeout` elapses. Returns true if it exited.
async fn wait_for_exit(pid: i32, timeout: Duration, poll: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        // A failed liveness task counts as still alive; the deadline bounds the wait.
        if !off_executor(move || liveness::is_alive(pid)).await.unwrap_or(true) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(poll).await;
    }
}

#[cfg(unix)]
fn send_terminate(pid: i32) {
    send_signal(pid, nix::sys::signal::Signal::SIGTERM);
}

#[cfg(unix)]
fn send_kill(pid: i32) {
    send_signal(pid, nix::sys::signal::Signal::SIGKILL);
}

#[cfg(unix)]
fn send_signal(pid: i32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // A process that vanished between the liveness check and the signal is fine: the wait sees it gone.
    if let Err(e) = kill(Pid::from_raw(pid), signal) {
        debug!(pid, ?signal, error = %e, "signal not delivered");
    }
}

#[cfg(not(unix))]
fn send_terminate(pid: i32) {
    send_kill(pid);
}

#[cfg(not(unix))]
fn send_kill(pid: i32) {
    let mut sys = sysinfo::System::new();
    let spid = sysinfo::Pid::from_u32(pid as u32);
    sys.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[spid]), true);
    if let Some(p) = sys.process(spid) {
        p.kill();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::model::Tier;
    use std::path::PathBuf;

    fn spec(dir: &Path, command: &str, args: &[&str]) -> OrganSpec {
        OrganSpec {
            name: "sentinel".into(),
            tier: Tier::P0,
            glyph: "🛡️".into(),
            pid_file: dir.join("run").join("sentinel.pid"),
            log_file: dir.join("log").join("sentinel.log"),
            command: PathBuf::from(command),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn fast_policy() -> RestartPolicy {
        RestartPolicy {
            timeout: Duration::from_millis(800),
            poll_interval: Duration::from_millis(20),
            startup_grace: Duration::from_millis(150),
            kill_after_timeout: false,
            dry_run: false,
        }
    }

    fn cleanup(pid: Option<i32>) {
        if let Some(pid) = pid {
            send_kill(pid);
        }
    }

    #[tokio::test]
    async fn down_organ_goes_straight_to_launching() {
        let dir = tempfile::tempdir().unwrap();
        let s = spec(dir.path(), "sleep", &["30"]);
        let policy = fast_policy();

        let out = RestartMachine::new(&s, &policy).run().await.unwrap();
        let pid = out.new_pid.unwrap();
        assert_eq!(
            out.trace,
            vec![
                RestartState::Unknown,
                RestartState::Launching,
                RestartState::Recorded { pid }
            ]
        );
        assert_eq!(pidfile::read_pid(&s.pid_file), Some(pid));
        assert!(liveness::is_alive(pid));
        cleanup(Some(pid));
    }

    #[tokio::test]
    async fn live_organ_is_terminated_then_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let s = spec(dir.path(), "sleep", &["30"]);
        let policy = fast_policy();

        let first = RestartMachine::new(&s, &policy).run().await.unwrap();
        let old = first.new_pid.unwrap();
        let second = RestartMachine::new(&s, &policy).run().await.unwrap();
        let new = second.new_pid.unwrap();

        assert_ne!(old, new);
        assert_eq!(second.previous_pid, Some(old));
        assert_eq!(
            second.trace,
            vec![
                RestartState::Unknown,
                RestartState::Alive { pid: old },
                RestartState::Terminating { pid: old },
                RestartState::Launching,
                RestartState::Recorded { pid: new },
            ]
        );
        assert!(!liveness::is_alive(old));
        assert_eq!(pidfile::read_pid(&s.pid_file), Some(new));
        assert!(liveness::is_alive(new));
        cleanup(Some(new));
    }

    #[tokio::test]
    async fn stubborn_process_times_out_and_keeps_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let s = spec(dir.path(), "sh", &["-c", "trap '' TERM; while :; do sleep 1; done"]);
        let policy = fast_policy();

        let first = RestartMachine::new(&s, &policy).run().await.unwrap();
        let pid = first.new_pid.unwrap();

        let err = RestartMachine::new(&s, &policy).run().await.unwrap_err();
        assert!(matches!(err, OrganError::RestartTimeout { pid: p, .. } if p == pid));
        assert_eq!(pidfile::read_pid(&s.pid_file), Some(pid));
        assert!(liveness::is_alive(pid));

        let escalate = RestartPolicy {
            kill_after_timeout: true,
            ..fast_policy()
        };
        let out = RestartMachine::new(&s, &escalate).run().await.unwrap();
        assert!(!liveness::is_alive(pid));
        cleanup(out.new_pid);
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let s = spec(dir.path(), "/nonexistent/organ/run.sh", &[]);
        std::fs::create_dir_all(s.pid_file.parent().unwrap()).unwrap();
        std::fs::write(&s.pid_file, "999999\n").unwrap();

        let err = RestartMachine::new(&s, &fast_policy()).run().await.unwrap_err();
        assert!(matches!(err, OrganError::LaunchFailure { .. }));
        assert_eq!(std::fs::read_to_string(&s.pid_file).unwrap(), "999999\n");
    }

    #[tokio::test]
    async fn crash_during_startup_is_a_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let s = spec(dir.path(), "sh", &["-c", "exit 3"]);

        let err = RestartMachine::new(&s, &fast_policy()).run().await.unwrap_err();
        match err {
            OrganError::LaunchFailure { reason, .. } => assert!(reason.contains("startup")),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(pidfile::read_pid(&s.pid_file), None);
    }

    #[tokio::test]
    async fn dry_run_only_plans() {
        let dir = tempfile::tempdir().unwrap();
        let s = spec(dir.path(), "sleep", &["30"]);
        let live = RestartMachine::new(&s, &fast_policy()).run().await.unwrap();
        let pid = live.new_pid.unwrap();

        let policy = RestartPolicy {
            dry_run: true,
            ..fast_policy()
        };
        let out = RestartMachine::new(&s, &policy).run().await.unwrap();
        assert!(out.dry_run);
        assert_eq!(out.new_pid, None);
        assert_eq!(out.trace.last(), Some(&RestartState::Launching));
        assert!(liveness::is_alive(pid));
        assert_eq!(pidfile::read_pid(&s.pid_file), Some(pid));
        cleanup(Some(pid));
    }

    #[tokio::test]
    async fn blocking_work_reports_panics_as_join_errors() {
        assert_eq!(off_executor(|| 7).await.unwrap(), 7);
        let failed = off_executor(|| -> i32 { panic!("pid file exploded") }).await;
        assert!(failed.unwrap_err().is_panic());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn restart_leaves_a_single_threaded_runtime_responsive() {
        let dir = tempfile::tempdir().unwrap();
        let s = spec(dir.path(), "sleep", &["30"]);
        let policy = fast_policy();

        let ticks = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = ticks.clone();
        let ticker = tokio::spawn(async move {
            loop {
                counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let first = RestartMachine::new(&s, &policy).run().await.unwrap();
        let second = RestartMachine::new(&s, &policy).run().await.unwrap();
        ticker.abort();

        assert!(ticks.load(std::sync::atomic::Ordering::Relaxed) > 10);
        assert!(!liveness::is_alive(first.new_pid.unwrap()));
        assert!(std::fs::metadata(&s.log_file).is_ok());
        cleanup(second.new_pid);
    }
}
