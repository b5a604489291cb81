//! Resilient single-path watching on Linux inotify
//!
//! This crate provides:
//! - Decoding of the raw inotify event stream
//! - A thin owner of one inotify descriptor
//! - Elastic watches that follow a path through creation, deletion and
//!   atomic replacement of the path or any of its ancestors

pub mod codec;
pub mod elastic;
pub mod error;
pub mod mask;
pub mod raw;

// Re-exports
pub use codec::{DecodeError, EventRecord, Events};
pub use elastic::{ElasticWatch, ElasticWatchState, Located, Reason, Step};
pub use error::{ChannelError, WatchError};
pub use mask::EventMask;
pub use raw::{RawWatch, WatchChannel, WatchHandle};
