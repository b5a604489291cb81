//! State accessors for monitored paths

use std::fmt;
use std::fs::{self, FileType, Metadata};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use monitor::{AccessError, Canonical, ToCanonical};
use serde::{Deserialize, Serialize};

/// What to read from a monitored path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Probe {
    /// Type, size, mode, inode and mtime
    #[default]
    Stat,
    /// File contents as text
    Contents,
    /// Parsed JSON document
    Json,
    /// Parsed TOML document
    Toml,
}

impl Probe {
    pub fn as_str(self) -> &'static str {
        match self {
            Probe::Stat => "stat",
            Probe::Contents => "contents",
            Probe::Json => "json",
            Probe::Toml => "toml",
        }
    }

    pub fn read(self, path: &Path) -> Result<Canonical, AccessError> {
        match self {
            Probe::Stat => stat(path),
            Probe::Contents => contents(path),
            Probe::Json => json(path),
            Probe::Toml => toml_document(path),
        }
    }

    /// Accessor bound to `path`, suitable for a `ChangeMonitor`
    pub fn accessor(self, path: PathBuf) -> impl FnMut() -> Result<Canonical, AccessError> + Send {
        move || self.read(&path)
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn stat(path: &Path) -> Result<Canonical, AccessError> {
    let meta = fs::metadata(path)?;
    Ok(Canonical::map([
        ("kind", Canonical::string(file_kind(meta.file_type()))),
        ("size", Canonical::uint(meta.size())),
        ("mode", Canonical::Int(i64::from(meta.mode() & 0o7777))),
        ("inode", Canonical::uint(meta.ino())),
        ("mtime_ns", Canonical::Int(mtime_ns(&meta))),
    ]))
}

fn mtime_ns(meta: &Metadata) -> i64 {
    meta.mtime()
        .saturating_mul(1_000_000_000)
        .saturating_add(meta.mtime_nsec())
}

fn file_kind(file_type: FileType) -> &'static str {
    if file_type.is_file() {
        "file"
    } else if file_type.is_dir() {
        "directory"
    } else if file_type.is_symlink() {
        "symlink"
    } else if file_type.is_fifo() {
        "fifo"
    } else if file_type.is_socket() {
        "socket"
    } else if file_type.is_block_device() {
        "block_device"
    } else if file_type.is_char_device() {
        "char_device"
    } else {
        "unknown"
    }
}

fn contents(path: &Path) -> Result<Canonical, AccessError> {
    let bytes = fs::read(path)?;
    Ok(Canonical::Str(String::from_utf8_lossy(&bytes).into_owned()))
}

fn json(path: &Path) -> Result<Canonical, AccessError> {
    let bytes = fs::read(path)?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;
    Ok(value.to_canonical())
}

fn toml_document(path: &Path) -> Result<Canonical, AccessError> {
    let text = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&text)
        .map_err(|err| AccessError::Invalid(format!("{}: {}", path.display(), err)))?;
    Ok(from_toml(value))
}

fn from_toml(value: toml::Value) -> Canonical {
    match value {
        toml::Value::String(s) => Canonical::Str(s),
        toml::Value::Integer(i) => Canonical::Int(i),
        toml::Value::Float(f) => Canonical::float(f),
        toml::Value::Boolean(b) => Canonical::Bool(b),
        toml::Value::Datetime(dt) => Canonical::Str(dt.to_string()),
        toml::Value::Array(items) => Canonical::List(items.into_iter().map(from_toml).collect()),
        toml::Value::Table(table) => {
            Canonical::Map(table.into_iter().map(|(k, v)| (k, from_toml(v))).collect())
        }
    }
}
