//! `pathwatch monitor`: emit the state of each path whenever it changes

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use cli_lib::{PathwatchConfig, Probe};
use monitor::{ChangeMonitor, LineSink};
use tracing::info;
use watcher::{ElasticWatch, EventMask};

pub struct MonitorArgs {
    pub paths: Vec<PathBuf>,
    pub probe: Option<Probe>,
    pub interval_ms: Option<u64>,
    pub poll: bool,
    pub count: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Watch(EventMask),
    Poll { period: Duration, limit: Option<u64> },
}

pub fn run(args: MonitorArgs, config: &PathwatchConfig) -> Result<()> {
    let mut effective = config.clone();
    if let Some(probe) = args.probe {
        effective.monitor.probe = probe;
    }
    if let Some(interval_ms) = args.interval_ms {
        effective.monitor.interval_ms = interval_ms;
    }
    effective.validate()?;

    let trigger = if args.poll {
        Trigger::Poll {
            period: effective.interval(),
            limit: args.count,
        }
    } else {
        Trigger::Watch(effective.watch.extra_mask()?)
    };
    let probe = effective.monitor.probe;
    let labeled = args.paths.len() > 1;

    let workers = args
        .paths
        .into_iter()
        .map(|path| move || monitor_path(path, probe, trigger, labeled))
        .collect();
    super::run_until_interrupted(workers)
}

fn monitor_path(path: PathBuf, probe: Probe, trigger: Trigger, labeled: bool) -> Result<()> {
    let mut sink = LineSink::stdout();
    if labeled {
        sink = sink.labeled(path.display().to_string());
    }
    let mut monitor = ChangeMonitor::new(probe.accessor(path.clone()), sink);

    info!(path = %path.display(), %probe, ?trigger, "monitoring");
    match trigger {
        Trigger::Watch(extra) => {
            let mut watch =
                ElasticWatch::open(&path, extra).context("failed to open inotify channel")?;
            monitor.run_watch(&mut watch)?;
        }
        Trigger::Poll { period, limit } => monitor.run_interval(period, limit)?,
    }

    info!(
        path = %path.display(),
        triggers = monitor.triggers(),
        emissions = monitor.emissions(),
        "monitor finished"
    );
    Ok(())
}
