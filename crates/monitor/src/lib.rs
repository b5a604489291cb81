//! Diff-and-emit monitoring
//!
//! This crate provides:
//! - A canonical, order-independent form for observed state
//! - A monitor that emits state only when it changes
//! - Line-oriented JSON sinks
//! - Watch-driven and timer-driven trigger loops

pub mod canonical;
pub mod error;
pub mod monitor;
pub mod sink;

// Re-exports
pub use canonical::{Canonical, Snapshot, ToCanonical};
pub use error::{AccessError, MonitorError};
pub use monitor::{ChangeMonitor, StateAccessor, DEFAULT_INTERVAL};
pub use sink::{LineSink, Sink};
