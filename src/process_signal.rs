//! Shared process-group signaling helpers for backend lifecycle teardown.

use std::io;

/// Send a signal to a process group first, then fall back to the direct pid.
///
/// On Unix PTY paths the child typically calls `setsid()`, so signaling `-pid`
/// reaches descendants as well. Callers can choose whether a missing pid (`ESRCH`)
/// should be treated as success (already exited) or as an error.
#[cfg(unix)]
pub(crate) fn signal_process_group_or_pid(
    pid: i32,
    signal: i32,
    missing_is_ok: bool,
) -> io::Result<()> {
    if pid <= 0 {
        return Ok(());
    }

    // SAFETY: `libc::kill` is called with plain integer pid/signal values. We do
    // not dereference pointers, and we only read errno immediately after each
    // syscall to capture its result for this thread.
    unsafe {
        if libc::kill(-pid, signal) == 0 {
            return Ok(());
        }
        let group_err = io::Error::last_os_error();

        if libc::kill(pid, signal) == 0 {
            return Ok(());
        }
        let pid_err = io::Error::last_os_error();

        if missing_target_can_be_ignored(missing_is_ok, &pid_err) {
            return Ok(());
        }

        Err(io::Error::new(
            pid_err.kind(),
            format!(
                "group(-{pid}) signal failed: {group_err}; pid({pid}) signal failed: {pid_err}"
            ),
        ))
    }
}

#[cfg(not(unix))]
pub(crate) fn signal_process_group_or_pid(
    _pid: i32,
    _signal: i32,
    _missing_is_ok: bool,
) -> io::Result<()> {
    Ok(())
}

/// Probes whether `pid` is still live via a signal-0 kill. `EPERM` (owned by
/// another user but present in the process table) counts as alive.
#[cfg(unix)]
pub(crate) fn process_exists(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs no delivery; it only validates the pid.
    let res = unsafe { libc::kill(pid, 0) };
    if res == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub(crate) fn process_exists(_pid: i32) -> bool {
    false
}

#[cfg(unix)]
fn is_no_such_process(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(code) if code == libc::ESRCH)
}

#[cfg(unix)]
fn missing_target_can_be_ignored(missing_is_ok: bool, pid_err: &io::Error) -> bool {
    // Treat "missing target" as success only when the direct pid lookup reports ESRCH.
    // A missing process group alone does not guarantee the pid signal path is safe to ignore.
    missing_is_ok && is_no_such_process(pid_err)
}
