//! Thin owner of one inotify instance

use std::ffi::CString;
use std::fmt;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::errno::{Errno, ErrnoSentinel};
use tracing::trace;

use crate::codec::{self, EventRecord, HEADER_LEN};
use crate::error::{ChannelError, WatchError};
use crate::mask::EventMask;

/// Default read buffer size
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Smallest buffer guaranteed to hold one record with a maximal name
const MIN_BUFFER_SIZE: usize = HEADER_LEN + libc::NAME_MAX as usize + 1;

/// Kernel-assigned identifier of one registered watch
///
/// Only meaningful for the channel that returned it. Stale after an
/// `IGNORED` event or `unwatch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(i32);

impl WatchHandle {
    pub fn from_raw(id: i32) -> Self {
        Self(id)
    }

    pub fn id(self) -> i32 {
        self.0
    }

    /// Whether `event` was reported on this watch
    pub fn matches(self, event: &EventRecord) -> bool {
        event.watch_id == self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd{}", self.0)
    }
}

/// What `ElasticWatch` needs from a notification channel
pub trait WatchChannel {
    /// Register interest in `path`
    fn watch(&mut self, path: &Path, mask: EventMask) -> Result<WatchHandle, WatchError>;

    /// Drop a registration. Failing on an already-invalid handle is expected.
    fn unwatch(&mut self, handle: WatchHandle) -> Result<(), WatchError>;

    /// Block until events are available. Empty means the channel closed.
    fn next_events(&mut self) -> Result<Vec<EventRecord>, ChannelError>;
}

/// Run a raw kernel call and tag its result with errno
fn syscall<T: ErrnoSentinel + PartialEq<T>>(ret: T) -> Result<T, Errno> {
    Errno::result(ret)
}

/// One inotify descriptor plus its read buffer
///
/// The descriptor is closed when this value is dropped.
#[derive(Debug)]
pub struct RawWatch {
    fd: OwnedFd,
    buffer: Vec<u8>,
}

impl RawWatch {
    /// Create a new inotify instance
    pub fn open() -> Result<Self, ChannelError> {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new inotify instance reading up to `size` bytes per call
    pub fn with_buffer_size(size: usize) -> Result<Self, ChannelError> {
        let raw = syscall(unsafe { libc::inotify_init1(libc::IN_CLOEXEC) })
            .map_err(ChannelError::Create)?;
        // SAFETY: inotify_init1 just returned this descriptor and nothing else owns it
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        trace!(fd = raw, "opened inotify channel");

        Ok(Self {
            fd,
            buffer: vec![0u8; size.max(MIN_BUFFER_SIZE)],
        })
    }

    /// Register interest in `path` for the events in `mask`
    ///
    /// Watching the same inode twice returns the same handle with its mask
    /// replaced.
    pub fn watch(&mut self, path: &Path, mask: EventMask) -> Result<WatchHandle, WatchError> {
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| WatchError::InvalidPath {
            path: path.to_path_buf(),
        })?;

        let wd = syscall(unsafe {
            libc::inotify_add_watch(self.fd.as_raw_fd(), c_path.as_ptr(), mask.bits())
        })
        .map_err(|errno| WatchError::Register {
            path: path.to_path_buf(),
            errno,
        })?;

        trace!(path = %path.display(), wd, "added watch");
        Ok(WatchHandle(wd))
    }

    /// Remove a registration
    pub fn unwatch(&mut self, handle: WatchHandle) -> Result<(), WatchError> {
        syscall(unsafe { libc::inotify_rm_watch(self.fd.as_raw_fd(), handle.0) })
            .map_err(|errno| WatchError::Unregister { handle, errno })?;

        trace!(%handle, "removed watch");
        Ok(())
    }

    /// Perform one blocking read and decode what it returned
    pub fn next_events(&mut self) -> Result<Vec<EventRecord>, ChannelError> {
        let len = loop {
            let ret = syscall(unsafe {
                libc::read(
                    self.fd.as_raw_fd(),
                    self.buffer.as_mut_ptr().cast(),
                    self.buffer.len(),
                )
            });
            match ret {
                Ok(n) => break n as usize,
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(ChannelError::Read(errno)),
            }
        };

        let events = codec::decode(&self.buffer[..len])?;
        trace!(bytes = len, count = events.len(), "read inotify events");
        Ok(events)
    }
}

impl WatchChannel for RawWatch {
    fn watch(&mut self, path: &Path, mask: EventMask) -> Result<WatchHandle, WatchError> {
        RawWatch::watch(self, path, mask)
    }

    fn unwatch(&mut self, handle: WatchHandle) -> Result<(), WatchError> {
        RawWatch::unwatch(self, handle)
    }

    fn next_events(&mut self) -> Result<Vec<EventRecord>, ChannelError> {
        RawWatch::next_events(self)
    }
}

impl AsFd for RawWatch {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for RawWatch {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_buffer_never_smaller_than_one_record() {
        let raw = RawWatch::with_buffer_size(16).unwrap();
        assert_eq!(raw.buffer.len(), MIN_BUFFER_SIZE);
    }

    #[test]
    fn test_watch_missing_path_fails_with_enoent() {
        let temp_dir = TempDir::new().unwrap();
        let mut raw = RawWatch::open().unwrap();

        let err = raw
            .watch(&temp_dir.path().join("missing"), EventMask::BASE)
            .unwrap_err();
        assert_eq!(err.errno(), Some(Errno::ENOENT));

        // Channel still usable after a failed registration
        assert!(raw.watch(temp_dir.path(), EventMask::BASE).is_ok());
    }

    #[test]
    fn test_watch_rejects_interior_nul() {
        use std::ffi::OsStr;

        let mut raw = RawWatch::open().unwrap();
        let path = Path::new(OsStr::from_bytes(b"/tmp/a\0b"));

        assert!(matches!(
            raw.watch(path, EventMask::BASE),
            Err(WatchError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_same_inode_returns_same_handle() {
        let temp_dir = TempDir::new().unwrap();
        let mut raw = RawWatch::open().unwrap();

        let first = raw.watch(temp_dir.path(), EventMask::BASE).unwrap();
        let second = raw.watch(temp_dir.path(), EventMask::BASE | EventMask::DELETE).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_create_event_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let mut raw = RawWatch::open().unwrap();
        let handle = raw.watch(temp_dir.path(), EventMask::BASE).unwrap();

        fs::create_dir(temp_dir.path().join("sub")).unwrap();

        let events = raw.next_events().unwrap();
        assert_eq!(events.len(), 1);
        assert!(handle.matches(&events[0]));
        assert!(events[0].mask.contains(EventMask::CREATE | EventMask::ISDIR));
        assert_eq!(events[0].name, b"sub");
    }

    #[test]
    fn test_unwatch_queues_ignored_and_second_unwatch_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut raw = RawWatch::open().unwrap();
        let handle = raw.watch(temp_dir.path(), EventMask::BASE).unwrap();

        raw.unwatch(handle).unwrap();
        let events = raw.next_events().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].mask.contains(EventMask::IGNORED));
        assert!(events[0].is_self());

        let err = raw.unwatch(handle).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::EINVAL));
    }
}
