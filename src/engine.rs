//! Engine (added, §2): the thin aggregate a host binary embeds. Owns one
//! [`ProcessController`] per tracked command, drains the signal flags set
//! by [`signals::install`], drives every controller's `tick()`, and
//! implements the program-quit sequence of §5 ("issue `stop()` to every
//! Controller, continue ticking for up to 3 seconds ... then return
//! control regardless").
//!
//! Grounded in the teacher's own `main.rs` `crossbeam_channel::select!`
//! loop (see `codex_overlay::main`), generalized from one PTY session to N
//! named controllers.

use std::time::{Duration, Instant};

use tracing::info;

use crate::config::EngineConfig;
use crate::controller::{CommandSpec, ProcessController, StatusLine};
use crate::error::Result;
use crate::signals::SignalFlags;

/// Owns every tracked [`ProcessController`] and the shared signal flags.
pub struct Engine {
    config: EngineConfig,
    controllers: Vec<(String, ProcessController)>,
    signals: SignalFlags,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            controllers: Vec::new(),
            signals: SignalFlags::install(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers a new tracked command under `name`, initially `Stopped`.
    pub fn add(&mut self, name: impl Into<String>, command: CommandSpec) {
        self.controllers
            .push((name.into(), ProcessController::new(command, &self.config)));
    }

    pub fn controller(&self, name: &str) -> Option<&ProcessController> {
        self.controllers.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn controller_mut(&mut self, name: &str) -> Option<&mut ProcessController> {
        self.controllers
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// Drains pending signal flags, fanning `SIGWINCH` out to every
    /// controller and reporting whether a quit was requested.
    pub fn drain_signals(&mut self, cols: u16, rows: u16) -> Result<bool> {
        if self.signals.take_winch() {
            for (_, controller) in &mut self.controllers {
                controller.set_dimensions(cols, rows)?;
            }
        }
        Ok(self.signals.take_quit())
    }

    /// Runs one supervision tick across every controller, returning the
    /// status lines emitted this tick, tagged by controller name.
    pub fn tick(&mut self) -> Vec<(String, StatusLine)> {
        let mut all_status = Vec::new();
        for (name, controller) in &mut self.controllers {
            for status in controller.tick() {
                all_status.push((name.clone(), status));
            }
        }
        all_status
    }

    /// Implements §5's quit sequence: `stop()` every controller, keep
    /// ticking for up to `quit_drain`, then return regardless of whether
    /// everything exited.
    pub fn quit(&mut self) {
        for (_, controller) in &mut self.controllers {
            controller.stop();
        }
        let deadline = Instant::now() + self.config.quit_drain();
        while Instant::now() < deadline {
            self.tick();
            if self
                .controllers
                .iter()
                .all(|(_, c)| c.state() == crate::controller::ProcessState::Stopped)
            {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        info!("quit drain complete; returning control to host");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn engine_add_and_lookup_roundtrip() {
        let mut engine = Engine::new(EngineConfig::default());
        engine.add(
            "watcher",
            CommandSpec {
                argv: vec!["/bin/sh".to_string(), "-c".to_string(), "true".to_string()],
                env: HashMap::new(),
                cwd: ".".to_string(),
            },
        );
        assert!(engine.controller("watcher").is_some());
        assert!(engine.controller("missing").is_none());
    }
}
