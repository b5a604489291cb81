//! Classified change reports for `pathwatch watch`

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use watcher::{EventMask, EventRecord, Located};

/// What happened, coarsely
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    Created,
    Deleted,
    AttributeChanged,
    /// A writer closed the file; its contents are likely complete
    DoneHint,
    Changed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

/// Map a raw mask to a change kind, with the entry type for creations
pub fn classify(mask: EventMask) -> (ChangeKind, Option<EntryType>) {
    if mask.intersects(EventMask::CREATE | EventMask::MOVED_TO) {
        let entry = if mask.contains(EventMask::ISDIR) {
            EntryType::Directory
        } else {
            EntryType::File
        };
        (ChangeKind::Created, Some(entry))
    } else if mask.intersects(EventMask::MOVED_FROM | EventMask::DELETE | EventMask::DELETE_SELF) {
        (ChangeKind::Deleted, None)
    } else if mask.contains(EventMask::ATTRIB) {
        (ChangeKind::AttributeChanged, None)
    } else if mask.contains(EventMask::CLOSE_WRITE) {
        (ChangeKind::DoneHint, None)
    } else {
        (ChangeKind::Changed, None)
    }
}

/// Identity of whatever is at `path`: `1:<inode>-<mtime>`, `-` when nothing
/// is there, `None` when it cannot be inspected
pub fn tag_from_path(path: &Path) -> Option<String> {
    match fs::metadata(path) {
        Ok(meta) => Some(format!("1:{}-{}.{:09}", meta.ino(), meta.mtime(), meta.mtime_nsec())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Some("-".to_string()),
        Err(_) => None,
    }
}

/// One output line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventReport {
    pub event: ChangeKind,
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub entry_type: Option<EntryType>,
    pub tag: Option<String>,
    pub target: PathBuf,
    pub watch_id: i32,
    pub events: EventMask,
    pub cookie: u32,
    pub name: Option<String>,
}

/// Turns surfaced events into reports, dropping repeated events on the
/// target itself while its identity is unchanged
#[derive(Debug)]
pub struct EventReporter {
    target: PathBuf,
    last_self_tag: Option<Option<String>>,
}

impl EventReporter {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            last_self_tag: None,
        }
    }

    pub fn report(&mut self, located: &Located) -> Option<EventReport> {
        let Located { path, event } = located;
        let tag = tag_from_path(path);

        if path == &self.target && event.name.is_empty() {
            if self.last_self_tag.as_ref() == Some(&tag) {
                return None;
            }
            self.last_self_tag = Some(tag.clone());
        }

        let (kind, entry_type) = classify(event.mask);
        Some(EventReport {
            event: kind,
            path: path.clone(),
            entry_type,
            tag,
            target: self.target.clone(),
            watch_id: event.watch_id,
            events: event.mask,
            cookie: event.cookie,
            name: event_name(event),
        })
    }
}

fn event_name(event: &EventRecord) -> Option<String> {
    (!event.name.is_empty()).then(|| String::from_utf8_lossy(&event.name).into_owned())
}
