//! Typed error kinds for the process/terminal engine.
//!
//! The five kinds mirror the error-handling design: each names a failure
//! mode the [`crate::controller::ProcessController`] reacts to differently.
//! Call sites that only need to bubble a failure up to a binary's `main`
//! wrap these in `anyhow::Result` at the boundary; the enum itself is for
//! matching inside the engine.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to spawn child process: {cause}")]
    SpawnFailed { cause: String },

    #[error("PTY read failed: {0}")]
    PTYReadFailed(io::Error),

    #[error("malformed escape sequence recovered: {0}")]
    ParseRecoverable(String),

    #[error("failed to signal process {pid}: {source}")]
    SignalFailed { pid: i32, source: io::Error },

    #[error("failed to query terminal dimensions, falling back to 80x24")]
    DimensionQueryFailed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
