//! `pathwatch watch`: print classified events as JSON lines

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cli_lib::config::{parse_events, PathwatchConfig};
use cli_lib::EventReporter;
use monitor::LineSink;
use tracing::{debug, info};
use watcher::{ElasticWatch, EventMask};

pub fn run(path: PathBuf, events: Vec<String>, config: &PathwatchConfig) -> Result<()> {
    let extra = config.watch.extra_mask()? | parse_events(&events)?;
    let worker = move || watch_path(&path, extra);
    super::run_until_interrupted(vec![worker])
}

fn watch_path(path: &Path, extra: EventMask) -> Result<()> {
    let mut watch = ElasticWatch::open(path, extra).context("failed to open inotify channel")?;
    info!(
        path = %path.display(),
        anchor = %watch.state().anchor_dir().display(),
        full = watch.is_full(),
        "watching"
    );

    let mut reporter = EventReporter::new(path);
    let mut out = LineSink::stdout();
    while let Some(fired) = watch.poll_located()? {
        for located in &fired {
            match reporter.report(located) {
                Some(report) => out.write_record(&report).context("failed to write event")?,
                None => debug!(path = %located.path.display(), "unchanged self event suppressed"),
            }
        }
    }
    Ok(())
}
