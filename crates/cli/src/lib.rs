//! Pathwatch CLI library
//!
//! Configuration, logging setup, event classification and the file probes
//! behind the `pathwatch` binary.

pub mod config;
pub mod event;
pub mod logging;
pub mod probe;

pub use config::{ConfigError, PathwatchConfig};
pub use event::{ChangeKind, EntryType, EventReporter};
pub use probe::Probe;
