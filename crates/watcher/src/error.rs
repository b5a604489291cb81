//! Error types for the watch layer

use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use crate::codec::DecodeError;
use crate::raw::WatchHandle;

/// The notification channel itself failed
///
/// Creation failure is fatal at startup; read failures end the event loop.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to create inotify instance: {0}")]
    Create(#[source] Errno),

    #[error("failed to read inotify events: {0}")]
    Read(#[source] Errno),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Registering or removing a single watch failed
///
/// Recoverable: the caller logs it and carries on with whatever watch it
/// still has.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch {}: {errno}", path.display())]
    Register {
        path: PathBuf,
        #[source]
        errno: Errno,
    },

    #[error("failed to remove watch {handle}: {errno}")]
    Unregister {
        handle: WatchHandle,
        #[source]
        errno: Errno,
    },

    #[error("path contains an interior NUL byte: {}", path.display())]
    InvalidPath { path: PathBuf },
}

impl WatchError {
    /// Kernel error code, when there is one
    pub fn errno(&self) -> Option<Errno> {
        match self {
            WatchError::Register { errno, .. } | WatchError::Unregister { errno, .. } => Some(*errno),
            WatchError::InvalidPath { .. } => None,
        }
    }
}
