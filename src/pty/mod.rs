//! PTY Spawner (spec component 1): allocates a pseudo-terminal, forks and
//! execs the target command with the slave side as its controlling
//! terminal, and hands back a [`ChildHandle`] with non-blocking read/write
//! access plus the child PID.
//!
//! Grounded directly in the teacher's `pty_session::pty` module
//! (`spawn_pty_child`, `child_exec`, `spawn_lifeline_watchdog`,
//! `terminate_process_group_with_escalation`), generalized from "spawn a
//! hard-coded backend CLI" to "spawn an arbitrary argv with caller-supplied
//! environment", and split so the reader thread forwards unmodified,
//! untouched read() chunks — the Output Ingestor (`crate::ingest`), not the
//! PTY layer, owns the 1024-byte carry-buffer rule.

mod child;

use std::collections::HashMap;
use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver};

use crate::error::{EngineError, Result};
use crate::process_signal::{process_exists, signal_process_group_or_pid};

/// A read chunk exactly this size is a hazard: more may be immediately
/// available and an escape/UTF-8 sequence may straddle the boundary. The
/// reader thread deliberately reads in chunks of this size so the Output
/// Ingestor's literal "len == 1024" rule has real boundaries to observe.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Identity and I/O handles of a spawned child (spec's `ChildHandle`).
pub struct ChildHandle {
    master_fd: RawFd,
    lifeline_write_fd: RawFd,
    pid: i32,
    started_at: Instant,
    pub output_rx: Receiver<Vec<u8>>,
    read_error: Arc<Mutex<Option<io::Error>>>,
    _reader_thread: thread::JoinHandle<()>,
    exited: bool,
}

impl ChildHandle {
    /// Spawns `argv[0]` with `argv[1..]` as arguments under a new PTY sized
    /// `(cols, rows)`. `env` is merged over `FORCE_COLOR`/`COLUMNS`/`LINES`
    /// defaults per §4.1; caller-provided values win on conflict.
    pub fn spawn(
        argv: &[String],
        env: &HashMap<String, String>,
        cwd: &str,
        cols: u16,
        rows: u16,
    ) -> Result<Self> {
        if argv.is_empty() {
            return Err(EngineError::SpawnFailed {
                cause: "empty argv".to_string(),
            });
        }

        let full_env = merge_environment(env, cols, rows);
        let argv_c = to_cstrings(argv).map_err(|cause| EngineError::SpawnFailed { cause })?;
        let env_c = to_cstrings(&full_env).map_err(|cause| EngineError::SpawnFailed { cause })?;
        let cwd_c = CString::new(cwd).map_err(|_| EngineError::SpawnFailed {
            cause: "working directory contains NUL byte".to_string(),
        })?;

        // SAFETY: argv_c/env_c/cwd_c are valid CStrings for the lifetime of
        // this call; child::spawn returns fds owned solely by this handle.
        let (master_fd, lifeline_write_fd, pid) =
            unsafe { child::spawn(&argv_c, &env_c, &cwd_c, rows, cols) }.map_err(|cause| {
                EngineError::SpawnFailed {
                    cause: cause.to_string(),
                }
            })?;

        unsafe { child::set_nonblocking(master_fd) }.map_err(|cause| EngineError::SpawnFailed {
            cause: cause.to_string(),
        })?;

        let (tx, rx) = bounded(256);
        let read_error = Arc::new(Mutex::new(None));
        let read_error_for_thread = Arc::clone(&read_error);
        let reader_thread = thread::spawn(move || {
            let mut buffer = [0u8; READ_CHUNK_SIZE];
            loop {
                // SAFETY: master_fd is owned by this thread via the move
                // closure and stays open for the reader's lifetime.
                let n = unsafe {
                    libc::read(master_fd, buffer.as_mut_ptr() as *mut libc::c_void, buffer.len())
                };
                if n > 0 {
                    if tx.send(buffer[..n as usize].to_vec()).is_err() {
                        break;
                    }
                    continue;
                }
                if n == 0 {
                    break;
                }
                let err = io::Error::last_os_error();
                if matches!(err.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) {
                    thread::sleep(Duration::from_millis(5));
                    continue;
                }
                // Anything else (e.g. EIO once the slave side is gone) is a
                // real read failure, not child death by itself — report it
                // so the owning controller can react (§7).
                *read_error_for_thread.lock().unwrap() = Some(err);
                break;
            }
        });

        Ok(Self {
            master_fd,
            lifeline_write_fd,
            pid,
            started_at: Instant::now(),
            output_rx: rx,
            read_error,
            _reader_thread: reader_thread,
            exited: false,
        })
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Writes `bytes` to the PTY master, retrying on `EINTR`/`EAGAIN`.
    pub fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        child::write_all(self.master_fd, bytes)
    }

    /// Issues a `TIOCSWINSZ` update and delivers `SIGWINCH` to the child's
    /// process group, per §4.1's resize contract.
    pub fn set_winsize(&self, cols: u16, rows: u16) -> Result<()> {
        child::set_winsize(self.master_fd, cols, rows).map_err(|_| {
            EngineError::DimensionQueryFailed
        })?;
        let _ = signal_process_group_or_pid(self.pid, libc::SIGWINCH, true);
        Ok(())
    }

    /// Non-blocking wait; reaps the child once it has exited.
    pub fn try_wait(&mut self) -> Option<i32> {
        if self.exited {
            return None;
        }
        let status = child::try_wait(self.pid)?;
        self.exited = true;
        Some(status)
    }

    /// Sends `signal` to the child's process group (falling back to the
    /// direct pid), ignoring `ESRCH`.
    pub fn signal(&self, signal: i32) -> Result<()> {
        signal_process_group_or_pid(self.pid, signal, true).map_err(|source| {
            EngineError::SignalFailed {
                pid: self.pid,
                source,
            }
        })
    }

    pub fn process_exists(&self) -> bool {
        process_exists(self.pid)
    }

    /// Takes the reader thread's recorded read failure, if any, so the
    /// owning controller can treat it as child death (§7) without blocking
    /// on the reader thread itself.
    pub fn take_read_error(&self) -> Option<io::Error> {
        self.read_error.lock().unwrap().take()
    }

    /// Test-only hook to simulate the reader thread observing a genuine
    /// read failure (e.g. `EIO`), without needing to coax a real PTY into
    /// that state. Exercises the same `take_read_error` path `tick()` uses.
    #[cfg(test)]
    pub(crate) fn inject_read_error_for_test(&self, err: io::Error) {
        *self.read_error.lock().unwrap() = Some(err);
    }
}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        // SAFETY: master_fd/lifeline_write_fd are owned exclusively by this
        // handle and are not used again after this call.
        unsafe {
            child::close_fd(self.lifeline_write_fd);
            child::close_fd(self.master_fd);
        }
    }
}

fn merge_environment(env: &HashMap<String, String>, cols: u16, rows: u16) -> Vec<String> {
    let mut merged: HashMap<String, String> = HashMap::new();
    merged.insert("FORCE_COLOR".to_string(), "1".to_string());
    merged.insert("COLUMNS".to_string(), cols.to_string());
    merged.insert("LINES".to_string(), rows.to_string());
    for (key, value) in env {
        merged.insert(key.clone(), value.clone());
    }
    merged
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect()
}

fn to_cstrings(values: &[String]) -> std::result::Result<Vec<CString>, String> {
    values
        .iter()
        .map(|value| CString::new(value.as_str()).map_err(|_| format!("NUL byte in {value:?}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_environment_lets_caller_override_defaults() {
        let mut env = HashMap::new();
        env.insert("FORCE_COLOR".to_string(), "0".to_string());
        let merged = merge_environment(&env, 80, 24);
        assert!(merged.contains(&"FORCE_COLOR=0".to_string()));
        assert!(merged.contains(&"COLUMNS=80".to_string()));
        assert!(merged.contains(&"LINES=24".to_string()));
    }

    #[test]
    fn spawn_rejects_empty_argv() {
        let err = ChildHandle::spawn(&[], &HashMap::new(), ".", 80, 24).unwrap_err();
        assert!(matches!(err, EngineError::SpawnFailed { .. }));
    }

    #[test]
    fn spawn_and_reap_true_child() {
        let argv = vec!["/bin/sh".to_string(), "-c".to_string(), "exit 7".to_string()];
        let mut handle = ChildHandle::spawn(&argv, &HashMap::new(), ".", 80, 24).unwrap();
        let start = Instant::now();
        let status = loop {
            if let Some(status) = handle.try_wait() {
                break status;
            }
            if start.elapsed() > Duration::from_secs(5) {
                panic!("child did not exit in time");
            }
            thread::sleep(Duration::from_millis(20));
        };
        assert_eq!(status, 7);
    }

    #[test]
    fn signal_on_dead_pid_is_not_an_error() {
        let argv = vec!["/bin/sh".to_string(), "-c".to_string(), "exit 0".to_string()];
        let mut handle = ChildHandle::spawn(&argv, &HashMap::new(), ".", 80, 24).unwrap();
        let start = Instant::now();
        while handle.try_wait().is_none() {
            if start.elapsed() > Duration::from_secs(5) {
                panic!("child did not exit in time");
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(handle.signal(libc::SIGTERM).is_ok());
    }
}
