//! Diff-and-emit monitoring loop

use std::thread;
use std::time::Duration;

use tracing::{debug, info, trace, warn};
use watcher::{ElasticWatch, WatchChannel};

use crate::canonical::{Canonical, Snapshot, ToCanonical};
use crate::error::{AccessError, MonitorError};
use crate::sink::Sink;

/// Default polling period for timer-driven monitors
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Source of the current state
pub trait StateAccessor {
    fn access(&mut self) -> Result<Canonical, AccessError>;
}

impl<F, T, E> StateAccessor for F
where
    F: FnMut() -> Result<T, E>,
    T: ToCanonical,
    E: Into<AccessError>,
{
    fn access(&mut self) -> Result<Canonical, AccessError> {
        (*self)().map(|state| state.to_canonical()).map_err(Into::into)
    }
}

/// Emits the accessor's state whenever it differs from the last emission
///
/// The first state is always emitted. A failing accessor is reported as
/// [`Snapshot::Absent`].
pub struct ChangeMonitor<A, K> {
    accessor: A,
    sink: K,
    last: Option<Snapshot>,
    triggers: u64,
    emissions: u64,
}

impl<A: StateAccessor, K: Sink> ChangeMonitor<A, K> {
    pub fn new(accessor: A, sink: K) -> Self {
        Self {
            accessor,
            sink,
            last: None,
            triggers: 0,
            emissions: 0,
        }
    }

    /// Last snapshot handed to the sink
    pub fn last_emitted(&self) -> Option<&Snapshot> {
        self.last.as_ref()
    }

    pub fn triggers(&self) -> u64 {
        self.triggers
    }

    pub fn emissions(&self) -> u64 {
        self.emissions
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Observe once; returns whether a new state was emitted
    pub fn trigger(&mut self) -> Result<bool, MonitorError> {
        self.triggers += 1;

        let snapshot = match self.accessor.access() {
            Ok(state) => Snapshot::Present(state),
            Err(err) => {
                if matches!(self.last, Some(Snapshot::Absent)) {
                    debug!(error = %err, "state still unavailable");
                } else {
                    warn!(error = %err, "state unavailable, reporting absent");
                }
                Snapshot::Absent
            }
        };

        if self.last.as_ref() == Some(&snapshot) {
            trace!(trigger = self.triggers, "state unchanged");
            return Ok(false);
        }

        self.sink.emit(&snapshot).map_err(MonitorError::Sink)?;
        self.emissions += 1;
        self.last = Some(snapshot);
        debug!(trigger = self.triggers, emissions = self.emissions, "state emitted");
        Ok(true)
    }

    /// Poll every `period`, stopping after `limit` observations if given
    pub fn run_interval(&mut self, period: Duration, limit: Option<u64>) -> Result<(), MonitorError> {
        info!(?period, ?limit, "starting polling monitor");

        let mut ticks = 0u64;
        loop {
            self.trigger()?;
            ticks += 1;
            if limit.is_some_and(|limit| ticks >= limit) {
                return Ok(());
            }
            thread::sleep(period);
        }
    }

    /// Observe once up front, then once per batch of surfaced watch events,
    /// until the watch channel closes
    pub fn run_watch<C: WatchChannel>(&mut self, watch: &mut ElasticWatch<C>) -> Result<(), MonitorError> {
        info!(path = %watch.target().display(), "starting watch monitor");

        self.trigger()?;
        while let Some(fired) = watch.poll()? {
            if fired.is_empty() {
                continue;
            }
            trace!(events = fired.len(), "watch fired");
            self.trigger()?;
        }

        info!(path = %watch.target().display(), "watch closed, monitor stopping");
        Ok(())
    }
}
