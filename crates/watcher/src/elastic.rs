//! Watching a path that may not exist yet
//!
//! An elastic watch registers the deepest existing prefix of its target (the
//! *anchor*) and re-resolves whenever the next missing component (the
//! *pending component*) shows up, the anchor disappears, or the kernel drops
//! events. Consumers are notified of any event seen while the watch is, or
//! becomes, resolved to the exact target.

use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, trace, warn};

use crate::codec::EventRecord;
use crate::error::ChannelError;
use crate::mask::EventMask;
use crate::raw::{RawWatch, WatchChannel, WatchHandle};

/// Why a re-anchor was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// The kernel removed the anchor's watch
    Ignored,
    /// The pending component appeared (or was touched) in the anchor
    PendingChanged,
    /// The anchor itself was renamed
    AnchorMoved,
    /// Events were lost
    Overflow,
}

/// Outcome of applying one event to the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Event belongs to a watch we no longer hold
    Stale,
    /// Nothing to re-resolve
    Keep,
    /// Tear down and resolve again from the target
    Reanchor(Reason),
}

/// A surfaced event and the path it concerns
///
/// `path` is the directory the event was reported on, joined with the
/// event's name when it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub path: PathBuf,
    pub event: EventRecord,
}

/// Where a logical watch on `target` is currently anchored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElasticWatchState {
    target: PathBuf,
    anchor_dir: PathBuf,
    pending_component: Option<OsString>,
    current_handle: Option<WatchHandle>,
}

impl ElasticWatchState {
    /// Resolve `target` against the live filesystem, without registering
    pub fn resolve(target: &Path) -> Self {
        let target = normalize_target(target);
        let (anchor_dir, pending_component) = resolve_anchor(&target);
        Self {
            target,
            anchor_dir,
            pending_component,
            current_handle: None,
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn anchor_dir(&self) -> &Path {
        &self.anchor_dir
    }

    pub fn pending_component(&self) -> Option<&OsStr> {
        self.pending_component.as_deref()
    }

    pub fn current_handle(&self) -> Option<WatchHandle> {
        self.current_handle
    }

    /// Anchored on the target itself
    pub fn is_full(&self) -> bool {
        self.pending_component.is_none()
    }

    /// Decide what `event` means for this state. Performs no I/O.
    pub fn step(&self, event: &EventRecord) -> Step {
        // Overflow is reported with watch id -1, not on any particular watch
        if event.mask.contains(EventMask::Q_OVERFLOW) {
            return Step::Reanchor(Reason::Overflow);
        }

        match self.current_handle {
            Some(handle) if handle.matches(event) => {}
            _ => return Step::Stale,
        }

        if event.mask.contains(EventMask::IGNORED) {
            return Step::Reanchor(Reason::Ignored);
        }

        if event.is_self() && event.mask.contains(EventMask::MOVE_SELF) {
            return Step::Reanchor(Reason::AnchorMoved);
        }

        match &self.pending_component {
            Some(pending) if event.name_os() == pending.as_os_str() => {
                Step::Reanchor(Reason::PendingChanged)
            }
            _ => Step::Keep,
        }
    }
}

/// Make `path` lexically clean: `.` dropped, `..` pops the previous component
pub fn normalize_target(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Parent of `path`, with `.` standing in for the empty parent of a
/// single-component relative path
fn parent_of(path: &Path) -> Option<&Path> {
    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => {
            if path == Path::new(".") {
                None
            } else {
                Some(Path::new("."))
            }
        }
        other => other,
    }
}

/// Deepest existing prefix of `target` and the first missing component below it
fn resolve_anchor(target: &Path) -> (PathBuf, Option<OsString>) {
    if target.exists() {
        return (target.to_path_buf(), None);
    }

    let mut child = target;
    while let Some(parent) = parent_of(child) {
        if parent.is_dir() {
            return (parent.to_path_buf(), child.file_name().map(OsStr::to_os_string));
        }
        child = parent;
    }

    // Only reachable when even the root is missing
    (child.to_path_buf(), child.file_name().map(OsStr::to_os_string))
}

/// A logical watch on a single path, kept alive across creation, deletion
/// and replacement of the path and its ancestors
#[derive(Debug)]
pub struct ElasticWatch<C = RawWatch> {
    channel: C,
    state: ElasticWatchState,
    mask: EventMask,
}

impl ElasticWatch<RawWatch> {
    /// Open a kernel channel and anchor a watch on `target`
    ///
    /// `extra` is added to [`EventMask::BASE`].
    pub fn open(target: impl AsRef<Path>, extra: EventMask) -> Result<Self, ChannelError> {
        let channel = RawWatch::open()?;
        Ok(Self::with_channel(channel, target, extra))
    }
}

impl<C: WatchChannel> ElasticWatch<C> {
    /// Anchor a watch on `target` using an existing channel
    pub fn with_channel(channel: C, target: impl AsRef<Path>, extra: EventMask) -> Self {
        let mut watch = Self {
            channel,
            state: ElasticWatchState::resolve(target.as_ref()),
            mask: EventMask::BASE | extra,
        };
        let (anchor, pending) = (watch.state.anchor_dir.clone(), watch.state.pending_component.clone());
        watch.register(anchor, pending);
        watch
    }

    pub fn state(&self) -> &ElasticWatchState {
        &self.state
    }

    pub fn target(&self) -> &Path {
        &self.state.target
    }

    pub fn is_full(&self) -> bool {
        self.state.is_full()
    }

    pub fn mask(&self) -> EventMask {
        self.mask
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Apply one event; returns whether the consumer should be notified
    pub fn handle(&mut self, event: &EventRecord) -> bool {
        let was_full = self.state.is_full();

        match self.state.step(event) {
            Step::Stale => {
                trace!(wd = event.watch_id, mask = ?event.mask, "dropping stale event");
                return false;
            }
            Step::Keep => {}
            Step::Reanchor(reason) => {
                debug!(
                    path = %self.state.target.display(),
                    anchor = %self.state.anchor_dir.display(),
                    ?reason,
                    "re-resolving watch"
                );
                if reason == Reason::Ignored {
                    // The kernel already released it
                    self.state.current_handle = None;
                }
                self.reanchor();
            }
        }

        was_full || self.state.is_full()
    }

    /// Read one batch from the channel and return the events that should be
    /// surfaced. `None` means the channel was closed.
    ///
    /// A batch that fails to decode is treated like a queue overflow: the
    /// watch re-resolves and a synthetic `Q_OVERFLOW` record stands in for it.
    pub fn poll(&mut self) -> Result<Option<Vec<EventRecord>>, ChannelError> {
        Ok(self
            .poll_located()?
            .map(|fired| fired.into_iter().map(|located| located.event).collect()))
    }

    /// Like [`poll`](Self::poll), but pairs each event with the path it
    /// concerns, resolved against the anchor it was reported on
    pub fn poll_located(&mut self) -> Result<Option<Vec<Located>>, ChannelError> {
        let events = match self.channel.next_events() {
            Ok(events) => events,
            Err(ChannelError::Decode(err)) => {
                warn!(error = %err, "undecodable event batch, resynchronising");
                vec![EventRecord::new(-1, EventMask::Q_OVERFLOW, 0, Vec::new())]
            }
            Err(err) => return Err(err),
        };
        if events.is_empty() {
            return Ok(None);
        }

        let mut fired = Vec::new();
        for event in events {
            let path = if event.name.is_empty() {
                self.state.anchor_dir.clone()
            } else {
                self.state.anchor_dir.join(event.name_os())
            };
            if self.handle(&event) {
                fired.push(Located { path, event });
            }
        }
        Ok(Some(fired))
    }

    /// Re-resolve from the live filesystem without waiting for an event
    ///
    /// Recovers a watch that could not register anything, for example after
    /// every ancestor was unreadable.
    pub fn resync(&mut self) -> bool {
        let was_full = self.state.is_full();
        self.reanchor();
        was_full || self.state.is_full()
    }

    /// Deliver surfaced events to `callback` until the channel closes
    pub fn run<F>(&mut self, mut callback: F) -> Result<(), ChannelError>
    where
        F: FnMut(&EventRecord),
    {
        while let Some(fired) = self.poll()? {
            for event in &fired {
                callback(event);
            }
        }
        debug!(path = %self.state.target.display(), "watch channel closed");
        Ok(())
    }

    fn reanchor(&mut self) {
        let (anchor, pending) = resolve_anchor(&self.state.target);
        self.register(anchor, pending);
    }

    /// Register `anchor`, climbing towards the root while registration fails.
    /// If nothing can be registered the previous registration is kept.
    ///
    /// The pending component may appear between resolution and registration,
    /// in which case its CREATE was never queued on the new watch. Resolution
    /// repeats until the registered anchor is still the deepest existing one.
    fn register(&mut self, anchor: PathBuf, pending: Option<OsString>) {
        let mut next = Some((anchor, pending));
        while let Some((anchor, pending)) = next.take() {
            if !self.register_from(anchor, pending) {
                return;
            }

            let Some(pending) = &self.state.pending_component else {
                return;
            };
            if !self.state.anchor_dir.join(pending).exists() {
                return;
            }
            let (anchor, pending) = resolve_anchor(&self.state.target);
            if anchor == self.state.anchor_dir {
                return;
            }
            debug!(
                path = %self.state.target.display(),
                anchor = %anchor.display(),
                "pending component appeared during registration"
            );
            next = Some((anchor, pending));
        }
    }

    /// One registration attempt starting at `anchor`. Returns whether
    /// `anchor` itself was registered; climbing or total failure is `false`.
    fn register_from(&mut self, mut anchor: PathBuf, mut pending: Option<OsString>) -> bool {
        let mut climbed = false;
        loop {
            match self.channel.watch(&anchor, self.mask) {
                Ok(handle) => {
                    self.install(anchor, pending, handle);
                    return !climbed;
                }
                Err(err) => {
                    warn!(error = %err, "failed to anchor watch, trying parent");
                    let Some(parent) = parent_of(&anchor).map(Path::to_path_buf) else {
                        warn!(
                            path = %self.state.target.display(),
                            anchor = %self.state.anchor_dir.display(),
                            "no ancestor could be watched, keeping previous anchor"
                        );
                        return false;
                    };
                    pending = anchor.file_name().map(OsStr::to_os_string);
                    anchor = parent;
                    climbed = true;
                }
            }
        }
    }

    fn install(&mut self, anchor: PathBuf, pending: Option<OsString>, handle: WatchHandle) {
        if let Some(old) = self.state.current_handle {
            if old != handle {
                // Fails routinely when the kernel already dropped the watch
                if let Err(err) = self.channel.unwatch(old) {
                    debug!(error = %err, "old watch already gone");
                }
            }
        }

        debug!(
            path = %self.state.target.display(),
            anchor = %anchor.display(),
            pending = ?pending,
            %handle,
            "watch anchored"
        );

        self.state.anchor_dir = anchor;
        self.state.pending_component = pending;
        self.state.current_handle = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodeError;
    use crate::error::WatchError;
    use nix::errno::Errno;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::fs;
    use tempfile::TempDir;

    /// In-memory channel that checks paths against the real filesystem
    #[derive(Default)]
    struct FakeChannel {
        next_wd: i32,
        watches: HashMap<i32, PathBuf>,
        denied: HashSet<PathBuf>,
        removed: Vec<i32>,
        queue: VecDeque<Vec<EventRecord>>,
        corrupt_next: bool,
        /// `(watched, created)`: create directory `created` while `watched`
        /// is being registered
        create_on_watch: Option<(PathBuf, PathBuf)>,
    }

    impl FakeChannel {
        fn wd_for(&self, path: &Path) -> i32 {
            *self
                .watches
                .iter()
                .find(|(_, p)| p.as_path() == path)
                .map(|(wd, _)| wd)
                .expect("path not watched")
        }
    }

    impl WatchChannel for FakeChannel {
        fn watch(&mut self, path: &Path, _mask: EventMask) -> Result<WatchHandle, WatchError> {
            if self.denied.contains(path) {
                return Err(WatchError::Register { path: path.to_path_buf(), errno: Errno::EACCES });
            }
            if !path.exists() {
                return Err(WatchError::Register { path: path.to_path_buf(), errno: Errno::ENOENT });
            }
            if self.create_on_watch.as_ref().is_some_and(|(watched, _)| watched == path) {
                let (_, created) = self.create_on_watch.take().unwrap();
                fs::create_dir(created).unwrap();
            }
            self.next_wd += 1;
            self.watches.insert(self.next_wd, path.to_path_buf());
            Ok(WatchHandle::from_raw(self.next_wd))
        }

        fn unwatch(&mut self, handle: WatchHandle) -> Result<(), WatchError> {
            self.removed.push(handle.id());
            match self.watches.remove(&handle.id()) {
                Some(_) => Ok(()),
                None => Err(WatchError::Unregister { handle, errno: Errno::EINVAL }),
            }
        }

        fn next_events(&mut self) -> Result<Vec<EventRecord>, ChannelError> {
            if std::mem::take(&mut self.corrupt_next) {
                return Err(DecodeError::Truncated { offset: 0, needed: 16, available: 3 }.into());
            }
            Ok(self.queue.pop_front().unwrap_or_default())
        }
    }

    fn event(wd: i32, mask: EventMask, name: &str) -> EventRecord {
        EventRecord::new(wd, mask, 0, name)
    }

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize_target(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize_target(Path::new("a/b/..")), PathBuf::from("a"));
        assert_eq!(normalize_target(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(normalize_target(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn test_resolve_existing_target_is_full() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("cfg");
        fs::write(&file, b"x").unwrap();

        let state = ElasticWatchState::resolve(&file);
        assert!(state.is_full());
        assert_eq!(state.anchor_dir(), file.as_path());
        assert_eq!(state.pending_component(), None);
    }

    #[test]
    fn test_resolve_walks_to_deepest_existing_dir() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("a")).unwrap();
        let target = temp_dir.path().join("a/b/c");

        let state = ElasticWatchState::resolve(&target);
        assert!(!state.is_full());
        assert_eq!(state.anchor_dir(), temp_dir.path().join("a").as_path());
        assert_eq!(state.pending_component(), Some(OsStr::new("b")));
    }

    #[test]
    fn test_resolve_skips_regular_file_ancestor() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a"), b"not a dir").unwrap();

        let state = ElasticWatchState::resolve(&temp_dir.path().join("a/b"));
        assert_eq!(state.anchor_dir(), temp_dir.path());
        assert_eq!(state.pending_component(), Some(OsStr::new("a")));
    }

    #[test]
    fn test_parent_of_relative_paths() {
        assert_eq!(parent_of(Path::new("cfg")), Some(Path::new(".")));
        assert_eq!(parent_of(Path::new(".")), None);
        assert_eq!(parent_of(Path::new("/")), None);
        assert_eq!(parent_of(Path::new("/etc")), Some(Path::new("/")));
    }

    #[test]
    fn test_step_is_pure_decision() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = ElasticWatchState::resolve(&temp_dir.path().join("cfg"));
        state.current_handle = Some(WatchHandle::from_raw(7));

        assert_eq!(state.step(&event(7, EventMask::CREATE, "other")), Step::Keep);
        assert_eq!(
            state.step(&event(7, EventMask::MOVED_TO, "cfg")),
            Step::Reanchor(Reason::PendingChanged)
        );
        assert_eq!(state.step(&event(7, EventMask::IGNORED, "")), Step::Reanchor(Reason::Ignored));
        assert_eq!(
            state.step(&event(7, EventMask::MOVE_SELF, "")),
            Step::Reanchor(Reason::AnchorMoved)
        );
        assert_eq!(state.step(&event(3, EventMask::CREATE, "cfg")), Step::Stale);
        assert_eq!(
            state.step(&event(-1, EventMask::Q_OVERFLOW, "")),
            Step::Reanchor(Reason::Overflow)
        );
    }

    #[test]
    fn test_progressive_creation() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let target = root.join("a/b/c");

        let mut watch = ElasticWatch::with_channel(FakeChannel::default(), &target, EventMask::empty());
        assert_eq!(watch.state().anchor_dir(), root);
        assert_eq!(watch.state().pending_component(), Some(OsStr::new("a")));

        let mut fired = 0;

        fs::create_dir(root.join("a")).unwrap();
        let wd = watch.channel().wd_for(root);
        fired += watch.handle(&event(wd, EventMask::CREATE | EventMask::ISDIR, "a")) as usize;
        assert_eq!(watch.state().anchor_dir(), root.join("a").as_path());
        assert_eq!(watch.state().pending_component(), Some(OsStr::new("b")));

        // Our own unwatch of the old anchor comes back as a stale IGNORED
        fired += watch.handle(&event(wd, EventMask::IGNORED, "")) as usize;
        assert_eq!(watch.state().anchor_dir(), root.join("a").as_path());

        fs::create_dir(root.join("a/b")).unwrap();
        let wd = watch.channel().wd_for(&root.join("a"));
        fired += watch.handle(&event(wd, EventMask::CREATE | EventMask::ISDIR, "b")) as usize;
        assert_eq!(watch.state().anchor_dir(), root.join("a/b").as_path());
        assert_eq!(watch.state().pending_component(), Some(OsStr::new("c")));
        assert_eq!(fired, 0);

        fs::write(&target, b"hello").unwrap();
        let wd = watch.channel().wd_for(&root.join("a/b"));
        fired += watch.handle(&event(wd, EventMask::CREATE, "c")) as usize;
        assert!(watch.is_full());
        assert_eq!(watch.state().anchor_dir(), target.as_path());

        // Close of the writer, still queued on the directory watch
        fired += watch.handle(&event(wd, EventMask::CLOSE_WRITE, "c")) as usize;
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_reanchor_descends_through_existing_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let target = root.join("a/b/c");

        let mut watch = ElasticWatch::with_channel(FakeChannel::default(), &target, EventMask::empty());
        let wd = watch.channel().wd_for(root);

        // The whole tree appears before the event is processed
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(&target, b"").unwrap();

        assert!(watch.handle(&event(wd, EventMask::MOVED_TO | EventMask::ISDIR, "a")));
        assert!(watch.is_full());
    }

    #[test]
    fn test_partial_events_never_notify() {
        let temp_dir = TempDir::new().unwrap();
        let mut watch =
            ElasticWatch::with_channel(FakeChannel::default(), temp_dir.path().join("cfg"), EventMask::empty());
        let wd = watch.channel().wd_for(temp_dir.path());

        assert!(!watch.handle(&event(wd, EventMask::CREATE, "cfg.tmp")));
        assert!(!watch.handle(&event(wd, EventMask::CLOSE_WRITE, "cfg.tmp")));
        assert!(!watch.handle(&event(wd, EventMask::MOVED_FROM, "cfg.tmp")));
        assert!(!watch.is_full());
    }

    #[test]
    fn test_ancestor_removal_reanchors_and_notifies() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("dev");
        fs::create_dir(&target).unwrap();

        let mut watch = ElasticWatch::with_channel(FakeChannel::default(), &target, EventMask::empty());
        assert!(watch.is_full());
        let wd = watch.channel().wd_for(&target);

        fs::remove_dir(&target).unwrap();
        watch.channel.watches.remove(&wd);

        assert!(watch.handle(&event(wd, EventMask::IGNORED, "")));
        assert_eq!(watch.state().anchor_dir(), temp_dir.path());
        assert_eq!(watch.state().pending_component(), Some(OsStr::new("dev")));
        // unwatch of the dead handle was attempted and failed quietly
        assert_eq!(watch.channel().removed, vec![wd]);
    }

    #[test]
    fn test_failed_registration_climbs_to_ancestor() {
        let temp_dir = TempDir::new().unwrap();
        let locked = temp_dir.path().join("locked");
        fs::create_dir(&locked).unwrap();

        let mut channel = FakeChannel::default();
        channel.denied.insert(locked.clone());

        let watch = ElasticWatch::with_channel(channel, locked.join("cfg"), EventMask::empty());
        assert_eq!(watch.state().anchor_dir(), temp_dir.path());
        assert_eq!(watch.state().pending_component(), Some(OsStr::new("locked")));
        assert!(watch.state().current_handle().is_some());
    }

    #[test]
    fn test_entry_created_during_registration_is_followed() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let target = root.join("a").join("b");

        let channel = FakeChannel {
            create_on_watch: Some((root.clone(), root.join("a"))),
            ..FakeChannel::default()
        };
        let mut watch = ElasticWatch::with_channel(channel, &target, EventMask::empty());

        // `a` appeared after resolution but before the watch on root existed
        assert_eq!(watch.state().anchor_dir(), root.join("a"));
        assert_eq!(watch.state().pending_component(), Some(OsStr::new("b")));
        assert_eq!(watch.channel().removed, vec![1]);

        fs::write(&target, b"").unwrap();
        let wd = watch.channel().wd_for(&root.join("a"));
        assert!(watch.handle(&event(wd, EventMask::CREATE, "b")));
        assert!(watch.is_full());
    }

    #[test]
    fn test_existing_file_ancestor_does_not_loop() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a"), b"").unwrap();

        let watch = ElasticWatch::with_channel(
            FakeChannel::default(),
            temp_dir.path().join("a").join("b"),
            EventMask::empty(),
        );
        assert_eq!(watch.state().anchor_dir(), temp_dir.path());
        assert_eq!(watch.state().pending_component(), Some(OsStr::new("a")));
        assert_eq!(watch.channel().next_wd, 1);
    }

    #[test]
    fn test_denied_anchor_after_ignored_climbs_then_recovers() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("d");
        let target = dir.join("cfg");
        fs::create_dir(&dir).unwrap();

        let mut watch = ElasticWatch::with_channel(FakeChannel::default(), &target, EventMask::empty());
        let first = watch.channel().wd_for(&dir);

        // d was replaced by a directory we may not watch
        watch.channel.denied.insert(dir.clone());
        assert!(!watch.handle(&event(first, EventMask::IGNORED, "")));
        assert_eq!(watch.state().anchor_dir(), temp_dir.path());
        assert_eq!(watch.state().pending_component(), Some(OsStr::new("d")));
        // The ignored handle is already gone, nothing to remove
        assert!(watch.channel().removed.is_empty());

        let parent_wd = watch.channel().wd_for(temp_dir.path());
        watch.channel.denied.clear();
        assert!(!watch.handle(&event(parent_wd, EventMask::ATTRIB, "d")));
        assert_eq!(watch.state().anchor_dir(), dir);
        assert_eq!(watch.channel().removed, vec![parent_wd]);

        fs::write(&target, b"").unwrap();
        let dir_wd = watch.channel().wd_for(&dir);
        assert!(watch.handle(&event(dir_wd, EventMask::CREATE, "cfg")));
        assert!(watch.is_full());
    }

    #[test]
    fn test_all_ancestors_denied_after_ignored_detaches() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("cfg");
        fs::write(&target, b"").unwrap();

        let mut watch = ElasticWatch::with_channel(FakeChannel::default(), &target, EventMask::empty());
        let wd = watch.channel().wd_for(&target);

        watch.channel.denied.extend(target.ancestors().map(Path::to_path_buf));
        // Was full, so the loss itself is reported
        assert!(watch.handle(&event(wd, EventMask::IGNORED, "")));
        assert_eq!(watch.state().anchor_dir(), target);
        assert_eq!(watch.state().current_handle(), None);

        // Nothing is registered; leftovers for the dead handle are stale
        assert!(!watch.handle(&event(wd, EventMask::CLOSE_WRITE, "")));

        watch.channel.denied.clear();
        assert!(watch.resync());
        assert_eq!(
            watch.state().current_handle().map(WatchHandle::id),
            Some(watch.channel().wd_for(&target))
        );
        assert!(watch.is_full());
    }

    #[test]
    fn test_poll_located_joins_names_onto_the_reporting_anchor() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("cfg");

        let mut watch = ElasticWatch::with_channel(FakeChannel::default(), &target, EventMask::empty());
        let dir_wd = watch.channel().wd_for(temp_dir.path());

        fs::write(&target, b"").unwrap();
        watch.channel.queue.push_back(vec![event(dir_wd, EventMask::CREATE, "cfg")]);
        let fired = watch.poll_located().unwrap().unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].path, target);

        let file_wd = watch.channel().wd_for(&target);
        watch.channel.queue.push_back(vec![event(file_wd, EventMask::CLOSE_WRITE, "")]);
        let fired = watch.poll_located().unwrap().unwrap();
        assert_eq!(fired[0].path, target);
    }

    #[test]
    fn test_overflow_resyncs() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("cfg");
        let mut watch = ElasticWatch::with_channel(FakeChannel::default(), &target, EventMask::empty());

        // cfg appeared but its CREATE was lost
        fs::write(&target, b"").unwrap();
        assert!(watch.handle(&event(-1, EventMask::Q_OVERFLOW, "")));
        assert!(watch.is_full());
    }

    #[test]
    fn test_undecodable_batch_resyncs() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("cfg");
        let mut watch = ElasticWatch::with_channel(FakeChannel::default(), &target, EventMask::empty());

        fs::write(&target, b"").unwrap();
        watch.channel.corrupt_next = true;

        let fired = watch.poll().unwrap().unwrap();
        assert_eq!(fired.len(), 1);
        assert!(fired[0].mask.contains(EventMask::Q_OVERFLOW));
        assert!(watch.is_full());
    }

    #[test]
    fn test_poll_reports_only_surfaced_events() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("cfg");

        let mut watch = ElasticWatch::with_channel(FakeChannel::default(), &target, EventMask::empty());
        let wd = watch.channel().wd_for(temp_dir.path());

        fs::write(temp_dir.path().join("cfg.tmp"), b"v1").unwrap();
        fs::rename(temp_dir.path().join("cfg.tmp"), &target).unwrap();
        watch.channel.queue.push_back(vec![
            event(wd, EventMask::CREATE, "cfg.tmp"),
            event(wd, EventMask::CLOSE_WRITE, "cfg.tmp"),
            EventRecord::new(wd, EventMask::MOVED_FROM, 9, "cfg.tmp"),
            EventRecord::new(wd, EventMask::MOVED_TO, 9, "cfg"),
        ]);

        let fired = watch.poll().unwrap().unwrap();
        assert_eq!(fired.len(), 1);
        assert!(fired[0].mask.contains(EventMask::MOVED_TO));
        assert_eq!(fired[0].name, b"cfg");

        // Empty queue reads as a closed channel
        assert!(watch.poll().unwrap().is_none());
    }

    #[test]
    fn test_run_stops_when_channel_closes() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("cfg");
        fs::write(&target, b"").unwrap();

        let mut watch = ElasticWatch::with_channel(FakeChannel::default(), &target, EventMask::empty());
        let wd = watch.channel().wd_for(&target);
        watch.channel.queue.push_back(vec![event(wd, EventMask::CLOSE_WRITE, "")]);
        watch.channel.queue.push_back(vec![event(wd, EventMask::CLOSE_WRITE, "")]);

        let mut seen = 0;
        watch.run(|_| seen += 1).unwrap();
        assert_eq!(seen, 2);
    }
}
