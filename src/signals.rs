//! Async-signal-safe flag handlers for SIGWINCH and the quit signals
//! (SIGINT/SIGTERM/SIGHUP/SIGQUIT), per §5: "Signal handlers must be
//! async-signal-safe: they only set a flag consumed on the next tick."
//!
//! Grounded in the teacher's `install_sigwinch_handler`/`handle_sigwinch`
//! (see `codex_overlay::main`), generalized to the full signal set §6
//! requires the host to consume.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static WINCH: AtomicBool = AtomicBool::new(false);
static QUIT: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_winch(_signum: libc::c_int) {
    WINCH.store(true, Ordering::SeqCst);
}

extern "C" fn handle_quit(_signum: libc::c_int) {
    QUIT.store(true, Ordering::SeqCst);
}

/// Handle to the process-wide signal flags. Cheap to clone; all clones
/// observe the same underlying atomics.
#[derive(Clone)]
pub struct SignalFlags {
    _marker: Arc<()>,
}

impl SignalFlags {
    /// Installs the handlers (idempotent at the OS level: re-installing the
    /// same handler for the same signal is harmless) and returns a handle
    /// for draining flags.
    pub fn install() -> Self {
        // SAFETY: the handlers only write to `AtomicBool`s, which is
        // async-signal-safe; no allocation or locking happens in them.
        unsafe {
            libc::signal(libc::SIGWINCH, handle_winch as libc::sighandler_t);
            libc::signal(libc::SIGINT, handle_quit as libc::sighandler_t);
            libc::signal(libc::SIGTERM, handle_quit as libc::sighandler_t);
            libc::signal(libc::SIGHUP, handle_quit as libc::sighandler_t);
            libc::signal(libc::SIGQUIT, handle_quit as libc::sighandler_t);
        }
        Self {
            _marker: Arc::new(()),
        }
    }

    /// Returns and clears whether a resize was requested since the last
    /// call.
    pub fn take_winch(&self) -> bool {
        WINCH.swap(false, Ordering::SeqCst)
    }

    /// Returns and clears whether a quit was requested since the last
    /// call.
    pub fn take_quit(&self) -> bool {
        QUIT.swap(false, Ordering::SeqCst)
    }
}
