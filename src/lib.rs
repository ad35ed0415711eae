//! Process/Terminal Engine: spawns and supervises child processes over
//! pseudo-terminals, ingests their output into a VT/ANSI screen model, and
//! routes keystrokes to the focused child. See `SPEC_FULL.md` for the full
//! component breakdown; each module below corresponds to one leaf of the
//! dependency order in §2.

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod input_router;
pub mod logging;
mod process_signal;
pub mod process_tree;
pub mod pty;
pub mod screen;
pub mod signals;
pub mod terminal_restore;

pub use config::EngineConfig;
pub use controller::{CommandSpec, ProcessController, ProcessState, StatusLine};
pub use engine::Engine;
pub use error::{EngineError, Result};
