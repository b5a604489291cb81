//! Command implementations

pub mod config;
pub mod monitor;
pub mod watch;

use anyhow::{Context, Result};
use futures::future::{try_join_all, FutureExt};
use tracing::info;

/// Run blocking workers on a tokio runtime until they all finish, one of
/// them fails, or the process is interrupted
///
/// Workers sit inside blocking reads, so the runtime is shut down without
/// waiting for them.
pub fn run_until_interrupted<F>(workers: Vec<F>) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    let outcome = runtime.block_on(async move {
        let handles = workers.into_iter().map(|worker| {
            tokio::task::spawn_blocking(worker)
                .map(|joined| joined.context("worker panicked").and_then(|result| result))
        });

        tokio::select! {
            finished = try_join_all(handles) => finished.map(|_| ()),
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for interrupt")?;
                info!("interrupted, shutting down");
                Ok(())
            }
        }
    });

    runtime.shutdown_background();
    outcome
}
