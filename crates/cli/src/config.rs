//! Pathwatch configuration file
//!
//! Lives at `$XDG_CONFIG_HOME/pathwatch/config.toml` unless `--config` points
//! elsewhere. Every field has a default, so a missing file is not an error.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use watcher::EventMask;

use crate::probe::Probe;

pub const CONFIG_DIR_NAME: &str = "pathwatch";
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub const MIN_INTERVAL_MS: u64 = 10;
pub const MAX_INTERVAL_MS: u64 = 3_600_000;

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("monitor.interval_ms must be between 10 and 3600000, got {0}")]
    Interval(u64),

    #[error("unknown event name: {0}")]
    UnknownEvent(String),

    #[error("unknown log level: {0}")]
    LogLevel(String),

    #[error("could not determine the config directory")]
    NoConfigDir,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathwatchConfig {
    pub monitor: MonitorSection,
    pub watch: WatchSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    /// Polling period for `monitor --poll`
    pub interval_ms: u64,
    pub probe: Probe,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            probe: Probe::Stat,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    /// Event names registered on top of the base set, e.g. `"delete"`
    pub extra_events: Vec<String>,
}

impl WatchSection {
    pub fn extra_mask(&self) -> Result<EventMask, ConfigError> {
        parse_events(&self.extra_events)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
    /// Log to a daily file here instead of stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl PathwatchConfig {
    /// Load from `path`, or from the default location when `None`
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match config_file_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound && !explicit => {
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let interval = self.monitor.interval_ms;
        if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&interval) {
            return Err(ConfigError::Interval(interval));
        }

        self.watch.extra_mask()?;

        if !LOG_LEVELS.contains(&self.log.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::LogLevel(self.log.level.clone()));
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.monitor.interval_ms)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = self.to_toml()?;
        let write = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write)?;
        }
        fs::write(path, text).map_err(write)
    }
}

/// Default config file location
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Write the example config to `path` unless something is already there
///
/// Returns whether a file was created.
pub fn init_if_missing(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, example_config()).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}

/// Combine event names into one mask
pub fn parse_events<S: AsRef<str>>(names: &[S]) -> Result<EventMask, ConfigError> {
    names.iter().try_fold(EventMask::empty(), |mask, name| {
        let name = name.as_ref();
        EventMask::parse_name(name)
            .map(|bit| mask | bit)
            .ok_or_else(|| ConfigError::UnknownEvent(name.to_string()))
    })
}

pub fn example_config() -> &'static str {
    r#"# Pathwatch configuration

[monitor]
# Polling period in milliseconds for `pathwatch monitor --poll` (10-3600000)
interval_ms = 2000
# State read from each monitored path: "stat", "contents", "json" or "toml"
probe = "stat"

[watch]
# Events registered in addition to create, moved_to, moved_from,
# close_write and move_self. Names match inotify's without the IN_ prefix.
extra_events = []

[log]
# Overridden by RUST_LOG and by -v / -vv
level = "info"
# Write a daily log file here instead of logging to stderr
# directory = "/var/log/pathwatch"
"#
}
