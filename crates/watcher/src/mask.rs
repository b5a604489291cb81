//! inotify event flags

use bitflags::bitflags;
use serde::ser::{Serialize, SerializeSeq, Serializer};

bitflags! {
    /// Kernel event mask
    ///
    /// Used both as the interest set passed to `watch` and as the kind of a
    /// decoded [`EventRecord`](crate::EventRecord). Bits the kernel reports
    /// that have no name here are retained as-is.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        /// File was read
        const ACCESS = libc::IN_ACCESS;
        /// File contents were written
        const MODIFY = libc::IN_MODIFY;
        /// Metadata (permissions, timestamps, link count, ...) changed
        const ATTRIB = libc::IN_ATTRIB;
        /// File opened for writing was closed
        const CLOSE_WRITE = libc::IN_CLOSE_WRITE;
        /// File not opened for writing was closed
        const CLOSE_NOWRITE = libc::IN_CLOSE_NOWRITE;
        /// File or directory was opened
        const OPEN = libc::IN_OPEN;
        /// Entry was renamed away from the watched directory
        const MOVED_FROM = libc::IN_MOVED_FROM;
        /// Entry was renamed into the watched directory
        const MOVED_TO = libc::IN_MOVED_TO;
        /// Entry was created in the watched directory
        const CREATE = libc::IN_CREATE;
        /// Entry was deleted from the watched directory
        const DELETE = libc::IN_DELETE;
        /// The watched object itself was deleted
        const DELETE_SELF = libc::IN_DELETE_SELF;
        /// The watched object itself was moved
        const MOVE_SELF = libc::IN_MOVE_SELF;
        /// Filesystem holding the watched object was unmounted
        const UNMOUNT = libc::IN_UNMOUNT;
        /// Kernel event queue overflowed; events were lost
        const Q_OVERFLOW = libc::IN_Q_OVERFLOW;
        /// Watch was removed, explicitly or by the kernel
        const IGNORED = libc::IN_IGNORED;
        /// Subject of the event is a directory
        const ISDIR = libc::IN_ISDIR;
    }
}

impl EventMask {
    /// Interest set every elastic watch registers with
    pub const BASE: EventMask = EventMask::CREATE
        .union(EventMask::MOVED_TO)
        .union(EventMask::MOVED_FROM)
        .union(EventMask::CLOSE_WRITE)
        .union(EventMask::MOVE_SELF);

    /// Look up a flag by name, case-insensitively (`"close-write"`,
    /// `"CLOSE_WRITE"` and `"close_write"` are all accepted)
    pub fn parse_name(name: &str) -> Option<EventMask> {
        let normalized = name.trim().replace('-', "_").to_ascii_uppercase();
        EventMask::from_name(&normalized)
    }

    /// Lowercase names of the known flags that are set
    pub fn names(&self) -> Vec<String> {
        self.iter_names()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect()
    }
}

impl Serialize for EventMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names = self.names();
        let mut seq = serializer.serialize_seq(Some(names.len()))?;
        for name in &names {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}
