//! On-disk settings for the engine, loaded once at startup.
//!
//! Mirrors the teacher's habit of keeping tunables (tick cadence, grace
//! periods, buffer sizes) out of hard-coded constants and behind a
//! `serde` + `toml` config file resolved via `dirs`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

fn default_tick_interval_ms() -> u64 {
    25
}

fn default_stop_grace_secs() -> u64 {
    5
}

fn default_quit_drain_secs() -> u64 {
    3
}

fn default_scrollback_rows() -> usize {
    2000
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

/// Tunables for the engine. Fields absent from the TOML file fall back to
/// the documented defaults, so an empty or missing config file is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
    #[serde(default = "default_quit_drain_secs")]
    pub quit_drain_secs: u64,
    #[serde(default = "default_scrollback_rows")]
    pub scrollback_rows: usize,
    #[serde(default = "default_cols")]
    pub default_cols: u16,
    #[serde(default = "default_rows")]
    pub default_rows: u16,
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            stop_grace_secs: default_stop_grace_secs(),
            quit_drain_secs: default_quit_drain_secs(),
            scrollback_rows: default_scrollback_rows(),
            default_cols: default_cols(),
            default_rows: default_rows(),
            log_format: default_log_format(),
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn quit_drain(&self) -> Duration {
        Duration::from_secs(self.quit_drain_secs)
    }

    /// Default config file location: `$XDG_CONFIG_HOME/proctab/config.toml`
    /// (or platform equivalent via `dirs::config_dir`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("proctab").join("config.toml"))
    }

    /// Load from `path`, falling back to defaults if the file is absent.
    /// A present-but-malformed file is still an error: silently ignoring a
    /// typo'd config would hide real operator mistakes.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = toml::from_str(&text)?;
        Ok(config)
    }

    /// Load from [`Self::default_path`], or defaults if no config dir is
    /// resolvable on this platform.
    pub fn load_default() -> anyhow::Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = EngineConfig::load(Path::new("/nonexistent/proctab.toml")).unwrap();
        assert_eq!(config.tick_interval_ms, 25);
        assert_eq!(config.scrollback_rows, 2000);
    }

    #[test]
    fn partial_toml_fills_remaining_defaults() {
        let dir = std::env::temp_dir().join(format!("proctab-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "stop_grace_secs = 10\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.stop_grace_secs, 10);
        assert_eq!(config.tick_interval_ms, 25);
        std::fs::remove_dir_all(&dir).ok();
    }
}
