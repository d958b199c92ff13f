//! Process liveness checks.
//!
//! A pid is alive when the OS reports a process with that id and the process is not a
//! zombie. Pid reuse by an unrelated process is not detected.

use sysinfo::{ProcessStatus, ProcessesToUpdate, System};

pub fn is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    exists(pid) && !is_zombie(pid)
}

/// True when `pid` is this console's own process.
pub fn is_console(pid: i32) -> bool {
    i64::from(pid) == i64::from(std::process::id())
}

/// Liveness as reported for an organ: alive, and not the console itself.
pub fn is_organ_running(pid: i32) -> bool {
    !is_console(pid) && is_alive(pid)
}

#[cfg(unix)]
fn exists(pid: i32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Signal 0 only checks for existence; EPERM means it exists but belongs to someone else.
    matches!(kill(Pid::from_raw(pid), None), Ok(()) | Err(Errno::EPERM))
}

#[cfg(not(unix))]
fn exists(pid: i32) -> bool {
    let mut sys = System::new();
    let spid = sysinfo::Pid::from_u32(pid as u32);
    sys.refresh_processes(ProcessesToUpdate::Some(&[spid]), true);
    sys.process(spid).is_some()
}

fn is_zombie(pid: i32) -> bool {
    let mut sys = System::new();
    let spid = sysinfo::Pid::from_u32(pid as u32);
    sys.refresh_processes(ProcessesToUpdate::Some(&[spid]), true);
    sys.process(spid)
        .map(|p| matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
        .unwrap_or(false)
}
