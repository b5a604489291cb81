//! Monitor error types

use std::io;

use thiserror::Error;
use watcher::ChannelError;

/// The state accessor could not produce a state
///
/// Never propagated by the monitor; it is reported as an absent state.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("state unavailable: {0}")]
    Io(#[from] io::Error),

    #[error("failed to decode state: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid state: {0}")]
    Invalid(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Conditions that end a monitoring loop
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The consumer went away
    #[error("failed to emit state: {0}")]
    Sink(#[source] io::Error),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}
