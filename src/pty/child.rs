//! Raw fork/exec/ioctl plumbing behind [`super::ChildHandle`].
//!
//! Lifted nearly verbatim from the teacher's `spawn_pty_child`/`child_exec`/
//! `spawn_lifeline_watchdog` (see `pty_session::pty` in the retrieval pack),
//! generalized to take a full argv + environment instead of a hard-coded
//! CLI name, and with the orphan-prevention lifeline watchdog kept intact.

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::thread;
use std::time::{Duration, Instant};

use crate::process_signal::signal_process_group_or_pid;

/// Forks and execs `argv` under a fresh PTY. Returns `(master_fd,
/// lifeline_write_fd, child_pid)` on success.
///
/// # Safety
/// `argv`/`env`/`cwd` must be valid, NUL-free-content `CString`s. The
/// child process calls `_exit` on any setup failure rather than returning,
/// since returning past `fork()` in the child would run destructors meant
/// for the parent's state.
pub(super) unsafe fn spawn(
    argv: &[CString],
    env: &[CString],
    cwd: &CString,
    rows: u16,
    cols: u16,
) -> io::Result<(RawFd, RawFd, i32)> {
    let mut master_fd: RawFd = -1;
    let mut slave_fd: RawFd = -1;
    let mut lifeline_fds = [-1; 2];

    let mut winsize = libc::winsize {
        ws_row: if rows > 0 { rows } else { 24 },
        ws_col: if cols > 0 { cols } else { 80 },
        ws_xpixel: 0,
        ws_ypixel: 0,
    };

    #[allow(clippy::unnecessary_mut_passed)]
    if libc::openpty(
        &mut master_fd,
        &mut slave_fd,
        ptr::null_mut(),
        ptr::null_mut(),
        &mut winsize,
    ) != 0
    {
        return Err(errno_error());
    }

    if libc::pipe(lifeline_fds.as_mut_ptr()) != 0 {
        close_fd(master_fd);
        close_fd(slave_fd);
        return Err(errno_error());
    }

    set_cloexec(master_fd)?;
    set_cloexec(slave_fd)?;
    set_cloexec(lifeline_fds[0])?;
    set_cloexec(lifeline_fds[1])?;

    let pid = libc::fork();
    if pid < 0 {
        close_fd(master_fd);
        close_fd(slave_fd);
        close_fd(lifeline_fds[0]);
        close_fd(lifeline_fds[1]);
        return Err(errno_error());
    }

    if pid == 0 {
        close_fd(lifeline_fds[1]);
        child_exec(master_fd, slave_fd, lifeline_fds[0], argv, env, cwd);
    }

    close_fd(slave_fd);
    close_fd(lifeline_fds[0]);
    Ok((master_fd, lifeline_fds[1], pid))
}

/// Child-side setup after `fork()`. Never returns.
///
/// # Safety
/// Must only run in the freshly forked child, before any other threads
/// exist in it.
unsafe fn child_exec(
    master_fd: RawFd,
    slave_fd: RawFd,
    lifeline_read_fd: RawFd,
    argv: &[CString],
    env: &[CString],
    cwd: &CString,
) -> ! {
    let fail = || -> ! {
        let err = io::Error::last_os_error();
        let msg = format!("child_exec failed: {err}\n");
        let _ = libc::write(
            libc::STDERR_FILENO,
            msg.as_ptr() as *const libc::c_void,
            msg.len(),
        );
        libc::_exit(1);
    };

    spawn_lifeline_watchdog(lifeline_read_fd);
    close_fd(lifeline_read_fd);
    close_fd(master_fd);

    if libc::setsid() == -1 {
        fail();
    }
    if libc::ioctl(slave_fd, libc::TIOCSCTTY as libc::c_ulong, 0) == -1 {
        fail();
    }
    if libc::dup2(slave_fd, libc::STDIN_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDOUT_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDERR_FILENO) < 0
    {
        fail();
    }
    close_fd(slave_fd);

    if libc::chdir(cwd.as_ptr()) != 0 {
        fail();
    }

    for entry in env {
        // `entry` is "KEY=VALUE"; putenv takes ownership semantics that are
        // awkward to express safely, so split and setenv each pair instead.
        if let Some((key, value)) = entry.to_str().ok().and_then(|s| s.split_once('=')) {
            if let (Ok(key_c), Ok(value_c)) = (CString::new(key), CString::new(value)) {
                libc::setenv(key_c.as_ptr(), value_c.as_ptr(), 1);
            }
        }
    }

    let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|s| s.as_ptr()).collect();
    argv_ptrs.push(ptr::null());

    libc::execvp(argv_ptrs[0], argv_ptrs.as_ptr());
    fail();
}

/// Forks a watchdog that force-kills the child's process group if this
/// process (the engine) dies without an orderly shutdown.
unsafe fn spawn_lifeline_watchdog(lifeline_read_fd: RawFd) {
    let target_pid = libc::getpid();
    let watchdog_pid = libc::fork();
    if watchdog_pid != 0 {
        return;
    }

    let max_fd = libc::sysconf(libc::_SC_OPEN_MAX);
    let upper = if max_fd > 3 { max_fd as RawFd } else { 1024 };
    for fd in 3..upper {
        if fd != lifeline_read_fd {
            let _ = libc::close(fd);
        }
    }

    let mut byte = [0u8; 1];
    loop {
        let n = libc::read(lifeline_read_fd, byte.as_mut_ptr() as *mut libc::c_void, 1);
        if n == 0 {
            break;
        }
        if n > 0 {
            continue;
        }
        if io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        break;
    }
    close_fd(lifeline_read_fd);

    let _ = signal_process_group_or_pid(target_pid, libc::SIGTERM, true);
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(500) {
        if !process_exists(target_pid) {
            libc::_exit(0);
        }
        thread::sleep(Duration::from_millis(20));
    }
    let _ = signal_process_group_or_pid(target_pid, libc::SIGKILL, true);
    libc::_exit(0);
}

unsafe fn process_exists(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    if libc::kill(pid, 0) == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// # Safety
/// `fd` must be a valid, open file descriptor.
pub(super) unsafe fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = libc::fcntl(fd, libc::F_GETFL, 0);
    if flags < 0 {
        return Err(errno_error());
    }
    if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
        return Err(errno_error());
    }
    Ok(())
}

fn set_cloexec(fd: RawFd) -> io::Result<()> {
    if fd < 0 {
        return Ok(());
    }
    // SAFETY: fd is a valid descriptor owned by the caller of `spawn`.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        if flags < 0 {
            return Err(errno_error());
        }
        if libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) < 0 {
            return Err(errno_error());
        }
    }
    Ok(())
}

fn errno_error() -> io::Error {
    io::Error::last_os_error()
}

/// # Safety
/// `fd` must be a valid, open file descriptor, or `-1` (ignored).
pub(super) unsafe fn close_fd(fd: RawFd) {
    if fd >= 0 {
        let _ = libc::close(fd);
    }
}

pub(super) fn write_all(fd: RawFd, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        // SAFETY: fd is the PTY master owned by the caller; data is a live slice.
        let written = unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, data.len()) };
        if written < 0 {
            let err = io::Error::last_os_error();
            if matches!(err.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) {
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            return Err(err);
        }
        if written == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "PTY write returned 0"));
        }
        data = &data[written as usize..];
    }
    Ok(())
}

pub(super) fn set_winsize(fd: RawFd, cols: u16, rows: u16) -> io::Result<()> {
    let ws = libc::winsize {
        ws_row: rows.max(1),
        ws_col: cols.max(1),
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: ws is fully initialized; fd is the PTY master.
    let result = unsafe { libc::ioctl(fd, libc::TIOCSWINSZ, &ws) };
    if result != 0 {
        return Err(errno_error());
    }
    Ok(())
}

pub(super) fn try_wait(pid: i32) -> Option<i32> {
    if pid < 0 {
        return None;
    }
    let mut status = 0;
    // SAFETY: pid is owned by the caller's ChildHandle.
    let ret = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
    if ret <= 0 {
        return None;
    }
    Some(decode_exit_status(status))
}

/// Reduces a raw `waitpid` status word to a single exit-code-shaped value:
/// the real exit code if the child exited normally, or `128 + signum` (the
/// shell convention) if it was killed by a signal.
fn decode_exit_status(status: libc::c_int) -> i32 {
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        128 + libc::WTERMSIG(status)
    } else {
        status
    }
}
