//! Minimal multi-tab host that embeds [`proctab::Engine`]: the demo binary
//! exercising the external interface of §6. Dashboard chrome (frame
//! composition, focus indicators, popup layering, hotkey configuration) is
//! out of scope per spec.md §1 — this is the thinnest host that can drive
//! the engine end to end, grounded in the teacher's own `main.rs` shape
//! (`clap::Parser` CLI, `TerminalRestoreGuard`, a `crossterm` raw-mode
//! event loop).

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::size as terminal_size;
use crossterm::{cursor, execute, queue, style::Print, terminal};

use proctab::config::EngineConfig;
use proctab::controller::CommandSpec;
use proctab::terminal_restore::TerminalRestoreGuard;
use proctab::{logging, Engine};

/// One tracked command: `name=argv...`, e.g. `server=npm run dev`.
#[derive(Debug, Clone)]
struct TrackedCommand {
    name: String,
    argv: Vec<String>,
}

impl std::str::FromStr for TrackedCommand {
    type Err = String;

    fn from_str(spec: &str) -> std::result::Result<Self, Self::Err> {
        let (name, rest) = spec
            .split_once('=')
            .ok_or_else(|| format!("expected `name=command`, got {spec:?}"))?;
        let argv: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
        if name.is_empty() || argv.is_empty() {
            return Err(format!("expected `name=command`, got {spec:?}"));
        }
        Ok(Self {
            name: name.to_string(),
            argv,
        })
    }
}

/// Supervises a fixed set of long-running child processes in tabs.
#[derive(Parser, Debug)]
#[command(name = "proctab", about, version)]
struct Cli {
    /// Tracked command, repeatable: `--cmd name=command arg1 arg2`.
    #[arg(long = "cmd", value_name = "NAME=COMMAND", required = true)]
    commands: Vec<TrackedCommand>,

    /// Path to an `EngineConfig` TOML file; defaults to the platform
    /// config directory, falling back to built-in defaults.
    #[arg(long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Autostart every tracked command on launch.
    #[arg(long)]
    autostart: bool,
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    match &cli.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => EngineConfig::load_default(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    logging::init(config.log_format);

    let (cols, rows) = terminal_size().unwrap_or((config.default_cols, config.default_rows));

    let mut engine = Engine::new(config);
    let mut names = Vec::new();
    for cmd in &cli.commands {
        engine.add(
            cmd.name.clone(),
            CommandSpec {
                argv: cmd.argv.clone(),
                env: HashMap::new(),
                cwd: ".".to_string(),
            },
        );
        names.push(cmd.name.clone());
    }
    if names.is_empty() {
        bail!("no tracked commands given (pass at least one --cmd name=command)");
    }

    if cli.autostart {
        for name in &names {
            if let Some(controller) = engine.controller_mut(name) {
                controller.start()?;
            }
        }
    }

    run_host_loop(&mut engine, &names, cols, rows)
}

/// The cooperative event loop of §5: drain signals, tick every controller,
/// poll input with a short timeout, render the focused tab.
fn run_host_loop(engine: &mut Engine, names: &[String], cols: u16, rows: u16) -> Result<()> {
    let guard = TerminalRestoreGuard::new();
    let mut stdout = std::io::stdout();
    guard.enable_raw_mode()?;
    execute!(stdout, terminal::EnterAlternateScreen, cursor::Hide)?;

    for name in names {
        if let Some(controller) = engine.controller_mut(name) {
            controller.set_dimensions(cols, rows)?;
        }
    }

    let mut focused = 0usize;
    if let Some(controller) = engine.controller_mut(&names[focused]) {
        controller.focus();
    }

    let poll_timeout_keys = Duration::from_millis(5);
    let poll_timeout_idle = Duration::from_millis(25);

    loop {
        let (cur_cols, cur_rows) = terminal_size().unwrap_or((cols, rows));
        if engine.drain_signals(cur_cols, cur_rows)? {
            // §5 quit sequence: `stop()` every controller, keep ticking for
            // up to `quit_drain_secs`, then return regardless. `Engine::quit`
            // performs that whole drain internally before returning.
            engine.quit();
            break;
        }

        for status in engine.tick() {
            tracing::info!(tab = %status.0, status = ?status.1, "status line");
        }

        let timeout = if event::poll(Duration::from_millis(0)).unwrap_or(false) {
            poll_timeout_keys
        } else {
            poll_timeout_idle
        };
        if event::poll(timeout).unwrap_or(false) {
            if let Event::Key(key) = event::read()? {
                if handle_key(engine, names, &mut focused, key) {
                    engine.quit();
                    break;
                }
            }
        }

        render_focused(&mut stdout, engine, &names[focused])?;
    }

    execute!(stdout, terminal::LeaveAlternateScreen, cursor::Show)?;
    Ok(())
}

/// Returns `true` if this key should initiate a quit.
fn handle_key(engine: &mut Engine, names: &[String], focused: &mut usize, key: KeyEvent) -> bool {
    let current = names[*focused].clone();

    match key.code {
        KeyCode::Tab => {
            if let Some(controller) = engine.controller_mut(&current) {
                controller.blur();
            }
            *focused = (*focused + 1) % names.len();
            if let Some(controller) = engine.controller_mut(&names[*focused]) {
                controller.focus();
            }
            false
        }
        KeyCode::Char('q') if key.modifiers.contains(KeyModifiers::CONTROL) => true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => true,
        KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::ALT) => {
            if let Some(controller) = engine.controller_mut(&current) {
                controller.toggle();
            }
            false
        }
        KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::ALT) => {
            if let Some(controller) = engine.controller_mut(&current) {
                controller.restart();
            }
            false
        }
        _ => {
            // The focused tab is always in Interactive mode (set by
            // `focus()`/`blur()` above); every other key is forwarded to
            // its PTY stdin and the Router decides what survives.
            if let Some(controller) = engine.controller_mut(&current) {
                let bytes = key_to_bytes(key);
                if !bytes.is_empty() {
                    controller.send_input(&bytes);
                }
            }
            false
        }
    }
}

/// Translates a crossterm key event into raw bytes for the Input Router.
/// Only the bytes this demo host needs to exercise interactive mode;
/// anything else is left unforwarded (the host's hotkey registry, out of
/// scope per §1, would otherwise own the full key-to-byte mapping).
fn key_to_bytes(key: KeyEvent) -> Vec<u8> {
    match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let lower = c.to_ascii_lowercase();
            if lower.is_ascii_alphabetic() {
                vec![(lower as u8) & 0x1f]
            } else {
                Vec::new()
            }
        }
        KeyCode::Char(c) => {
            let mut buf = [0u8; 4];
            c.encode_utf8(&mut buf).as_bytes().to_vec()
        }
        KeyCode::Enter => vec![b'\n'],
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Tab => vec![b'\t'],
        KeyCode::Esc => vec![0x1b],
        KeyCode::Up => b"\x1b[A".to_vec(),
        KeyCode::Down => b"\x1b[B".to_vec(),
        KeyCode::Right => b"\x1b[C".to_vec(),
        KeyCode::Left => b"\x1b[D".to_vec(),
        _ => Vec::new(),
    }
}

/// Renders the focused controller's grid: cursor-home, then one line per
/// row (§6: "Cursor-home escape ... followed by a full frame of cells").
fn render_focused(stdout: &mut std::io::Stdout, engine: &Engine, name: &str) -> Result<()> {
    let Some(controller) = engine.controller(name) else {
        return Ok(());
    };
    queue!(stdout, cursor::MoveTo(0, 0))?;
    for line in controller.render_into() {
        queue!(stdout, Print(&line), Print("\r\n"))?;
    }
    use std::io::Write;
    stdout.flush()?;
    Ok(())
}
