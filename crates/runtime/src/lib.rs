//! Runtime bootstrap for the OEE dataflow: tracing, timely workers,
//! configuration and metrics.

use anyhow::{anyhow, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod metrics;

pub use config::{ConfigError, PipelineConfig};

/// Install the fmt subscriber. Logs go to stderr; `RUST_LOG` overrides the
/// default `info` filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub type Worker = timely::worker::Worker<timely::communication::allocator::Generic>;

/// Start a single-process timely runtime and execute the provided closure once per worker.
///
/// The first worker error, or a worker panic, is returned once all workers
/// have finished.
pub fn start_runtime<F>(workers: usize, f: F) -> Result<()>
where
    F: Fn(usize, &mut Worker) -> Result<()> + Send + Sync + 'static,
{
    info!(%workers, "starting timely runtime");
    let guards = timely::execute(timely::Config::process(workers), move |worker| {
        let index = worker.index();
        f(index, worker)
    })
    .map_err(|e| anyhow!("failed to start timely runtime: {e}"))?;

    for outcome in guards.join() {
        outcome.map_err(|e| anyhow!("timely worker panicked: {e}"))??;
    }
    Ok(())
}
