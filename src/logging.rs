//! Structured logging init, grounded in the teacher's `tracing` +
//! `tracing-subscriber` dependency pair (the teacher's actual logging
//! backend, `legacy_tui::log_debug`, was a hand-rolled file writer; this
//! crate replaces it with the idiomatic subscriber the teacher already
//! depended on but never wired up).

use std::sync::OnceLock;

use crate::config::LogFormat;

static INIT: OnceLock<()> = OnceLock::new();

/// Installs a global `tracing` subscriber. Safe to call more than once;
/// only the first call takes effect.
pub fn init(format: LogFormat) {
    INIT.get_or_init(|| {
        let builder = tracing_subscriber::fmt()
            .with_target(false)
            .with_timer(tracing_subscriber::fmt::time::SystemTime);
        match format {
            LogFormat::Compact => {
                builder.compact().init();
            }
            LogFormat::Json => {
                builder.json().init();
            }
        }
    });
}
