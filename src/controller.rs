//! Process Controller (spec component 6, §4.6): the state machine
//! coordinating spawn, run, stop (SIGTERM + grace), force-kill (SIGKILL),
//! restart, and orphan cleanup for one child. Owns exactly one
//! [`ChildHandle`] at a time (§3 invariant).

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::ingest::Ingestor;
use crate::input_router::{InputRouter, Mode, RouterAction};
use crate::process_tree;
use crate::pty::ChildHandle;
use crate::screen::ScreenBuffer;

/// One of the six states from §4.6's diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
    ForceKilling,
    Terminated,
}

type AfterTerminate = Box<dyn FnOnce(&mut ProcessController) + Send>;

/// A command this controller spawns on `start()`: argv, environment
/// overlay, and working directory.
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub env: std::collections::HashMap<String, String>,
    pub cwd: String,
}

/// Coordinates one child's lifecycle. Exactly one [`ChildHandle`] is owned
/// at a time; between `Terminated` and the next `Starting` there is none.
pub struct ProcessController {
    command: CommandSpec,
    state: ProcessState,
    child: Option<ChildHandle>,
    screen: ScreenBuffer,
    ingestor: Ingestor,
    router: InputRouter,
    mode: Mode,
    stop_initiated_at: Option<Instant>,
    stop_grace: Duration,
    snapshotted_descendants: HashSet<i32>,
    after_terminate: VecDeque<AfterTerminate>,
    last_waiting_status_at: Option<Instant>,
    cols: u16,
    rows: u16,
}

/// A user-visible status line emitted at documented transitions (§4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    StoppingProcess,
    Waiting,
    ForceKilling,
    Stopped,
}

impl ProcessController {
    pub fn new(command: CommandSpec, config: &EngineConfig) -> Self {
        Self {
            command,
            state: ProcessState::Stopped,
            child: None,
            screen: ScreenBuffer::new(
                config.default_cols as usize,
                config.default_rows as usize,
                config.scrollback_rows,
            ),
            ingestor: Ingestor::new(),
            router: InputRouter::new(),
            mode: Mode::Passive,
            stop_initiated_at: None,
            stop_grace: config.stop_grace(),
            snapshotted_descendants: HashSet::new(),
            after_terminate: VecDeque::new(),
            last_waiting_status_at: None,
            cols: config.default_cols,
            rows: config.default_rows,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn running(&self) -> bool {
        matches!(self.state, ProcessState::Starting | ProcessState::Running)
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn focus(&mut self) {
        self.mode = Mode::Interactive;
    }

    pub fn blur(&mut self) {
        self.mode = Mode::Passive;
    }

    /// Registers a zero-argument callback run exactly once upon entering
    /// `Terminated`, then cleared (§4.6).
    pub fn on_after_terminate(&mut self, callback: impl FnOnce(&mut ProcessController) + Send + 'static) {
        self.after_terminate.push_back(Box::new(callback));
    }

    /// Only valid from `Stopped`; transitions through `Starting` to
    /// `Running` once the PTY is live.
    pub fn start(&mut self) -> Result<()> {
        if self.state != ProcessState::Stopped {
            return Ok(());
        }
        self.state = ProcessState::Starting;
        let handle = ChildHandle::spawn(
            &self.command.argv,
            &self.command.env,
            &self.command.cwd,
            self.cols,
            self.rows,
        )?;
        handle.set_winsize(self.cols, self.rows)?;
        self.child = Some(handle);
        self.state = ProcessState::Running;
        Ok(())
    }

    /// Snapshots descendants, sends SIGTERM to the root, transitions to
    /// `Stopping`. Idempotent: repeated calls while already `Stopping` do
    /// nothing further.
    pub fn stop(&mut self) {
        if self.state != ProcessState::Running && self.state != ProcessState::Starting {
            return;
        }
        let Some(child) = &self.child else {
            return;
        };
        self.snapshotted_descendants = process_tree::descendants(child.pid());
        self.stop_initiated_at = Some(Instant::now());
        if let Err(err) = child.signal(libc::SIGTERM) {
            warn!(error = %err, "SIGTERM delivery failed");
        }
        self.state = ProcessState::Stopping;
        self.emit(StatusLine::StoppingProcess);
    }

    /// Registers an `afterTerminate` callback that calls `start()`, then
    /// calls `stop()` (§4.6).
    pub fn restart(&mut self) {
        self.on_after_terminate(|controller| {
            if let Err(err) = controller.start() {
                warn!(error = %err, "restart: start() failed after terminate");
            }
        });
        self.stop();
    }

    pub fn toggle(&mut self) {
        if self.running() {
            self.stop();
        } else {
            let _ = self.start();
        }
    }

    pub fn set_dimensions(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.cols = cols;
        self.rows = rows;
        self.screen.resize(cols as usize, rows as usize);
        if let Some(child) = &self.child {
            child.set_winsize(cols, rows)?;
        }
        Ok(())
    }

    pub fn send_input(&mut self, bytes: &[u8]) {
        let Some(child) = &self.child else { return };
        let mut forward = Vec::new();
        for &byte in bytes {
            match self.router.handle_byte(self.mode, byte) {
                RouterAction::Forward(chunk) => forward.extend(chunk),
                RouterAction::ExitInteractive => {
                    self.mode = Mode::Passive;
                }
                RouterAction::Ignored => {}
            }
        }
        if !forward.is_empty() {
            if let Err(err) = child.write_all(&forward) {
                warn!(error = %err, "failed to write to PTY stdin");
            }
        }
    }

    /// Renders the current screen grid as plain lines (one per row,
    /// graphemes concatenated — SGR runs are the dashboard chrome's
    /// concern to re-derive from `Cell::pen`, out of scope here).
    pub fn render_into(&self) -> Vec<String> {
        (0..self.screen.rows())
            .map(|row| {
                self.screen
                    .row(row)
                    .iter()
                    .filter(|cell| !cell.is_continuation())
                    .map(|cell| cell.grapheme.as_str())
                    .collect::<String>()
            })
            .collect()
    }

    pub fn screen(&self) -> &ScreenBuffer {
        &self.screen
    }

    /// Supervision tick (§4.6): polls liveness, services the Output
    /// Ingestor, runs stopping-state reconciliation.
    pub fn tick(&mut self) -> Vec<StatusLine> {
        let mut status = Vec::new();
        self.drain_output();

        match self.state {
            ProcessState::Running | ProcessState::Starting => {
                // A genuine read error (anything but EAGAIN/EINTR, which the
                // reader thread already retries on) is treated as child
                // death per §7, even if the process itself hasn't exited
                // yet — the PTY master is no longer usable either way.
                let read_error = self.child.as_ref().and_then(|child| child.take_read_error());
                if let Some(err) = read_error {
                    warn!(error = %EngineError::PTYReadFailed(err), "PTY read failed; treating as child death");
                    self.enter_terminated();
                    status.push(StatusLine::Stopped);
                } else if let Some(child) = &mut self.child {
                    if child.try_wait().is_some() {
                        self.enter_terminated();
                        status.push(StatusLine::Stopped);
                    }
                }
            }
            ProcessState::Stopping => {
                status.extend(self.reconcile_stopping());
            }
            ProcessState::ForceKilling => {
                status.extend(self.reconcile_force_killing());
            }
            ProcessState::Terminated | ProcessState::Stopped => {}
        }

        status
    }

    fn drain_output(&mut self) {
        let Some(child) = &self.child else { return };
        while let Ok(chunk) = child.output_rx.try_recv() {
            self.ingestor.ingest(&chunk, &mut self.screen);
        }
    }

    fn reconcile_stopping(&mut self) -> Vec<StatusLine> {
        let mut status = Vec::new();
        let Some(child) = &mut self.child else {
            return status;
        };

        if child.try_wait().is_some() {
            self.finish_stop(&mut status);
            return status;
        }

        let elapsed = self
            .stop_initiated_at
            .map(|at| at.elapsed())
            .unwrap_or_default();
        if elapsed >= self.stop_grace {
            if let Err(err) = child.signal(libc::SIGKILL) {
                warn!(error = %err, "SIGKILL delivery failed");
            }
            self.state = ProcessState::ForceKilling;
            status.push(StatusLine::ForceKilling);
        } else {
            self.maybe_emit_waiting(&mut status);
        }

        status
    }

    fn reconcile_force_killing(&mut self) -> Vec<StatusLine> {
        let mut status = Vec::new();
        let Some(child) = &mut self.child else {
            return status;
        };
        if child.try_wait().is_some() {
            self.finish_stop(&mut status);
        }
        status
    }

    fn maybe_emit_waiting(&mut self, status: &mut Vec<StatusLine>) {
        let should_emit = match self.last_waiting_status_at {
            None => true,
            Some(last) => last.elapsed() >= Duration::from_millis(40),
        };
        if should_emit {
            self.last_waiting_status_at = Some(Instant::now());
            status.push(StatusLine::Waiting);
        }
    }

    fn finish_stop(&mut self, status: &mut Vec<StatusLine>) {
        self.enter_terminated();
        let stragglers: Vec<i32> = self
            .snapshotted_descendants
            .iter()
            .copied()
            .filter(|&pid| crate::process_signal::process_exists(pid))
            .collect();
        if !stragglers.is_empty() {
            process_tree::signal_all(stragglers, libc::SIGKILL);
        }
        status.push(StatusLine::Stopped);
    }

    fn enter_terminated(&mut self) {
        self.state = ProcessState::Terminated;
        self.child = None;
        self.stop_initiated_at = None;
        self.last_waiting_status_at = None;
        info!(state = "Terminated", "process controller entering Terminated");

        // Settle into `Stopped` before running callbacks: `restart()`'s
        // callback calls `start()`, which only proceeds from `Stopped`.
        self.state = ProcessState::Stopped;
        let callbacks: Vec<AfterTerminate> = self.after_terminate.drain(..).collect();
        for callback in callbacks {
            callback(self);
        }
    }

    fn emit(&self, line: StatusLine) {
        match line {
            StatusLine::StoppingProcess => info!("Stopping process..."),
            StatusLine::Waiting => info!("Waiting..."),
            StatusLine::ForceKilling => warn!("Force killing!"),
            StatusLine::Stopped => info!("Stopped."),
        }
    }

    pub fn snapshotted_descendants(&self) -> &HashSet<i32> {
        &self.snapshotted_descendants
    }
}

impl std::fmt::Debug for ProcessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessController")
            .field("state", &self.state)
            .finish()
    }
}
