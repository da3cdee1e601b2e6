use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use oee_core::{parse_payload, KpiRow};
use oee_runtime::metrics::{EpochTimer, MetricsRegistry};
use oee_runtime::{init_tracing, start_runtime, PipelineConfig, Worker};
use oee_views::{PipelineContext, PipelineDriver, WorkforceTable};

/// Compute windowed OEE KPIs from raw device telemetry.
///
/// KPI rows are written to stdout as JSON lines; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "oee_pipeline")]
struct Args {
    /// Raw device payloads, one JSON document per line.
    #[arg(long)]
    input: PathBuf,

    /// Workforce records: a JSON array of {"shiftNumber", "employeeCount"}.
    #[arg(long)]
    workforce: PathBuf,

    /// Pipeline configuration (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Payloads per timely epoch.
    #[arg(long, default_value_t = 1_000)]
    batch_size: usize,
}

fn write_row(row: &KpiRow) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let written = serde_json::to_writer(&mut out, row)
        .map_err(io::Error::from)
        .and_then(|_| writeln!(out));
    if let Err(e) = written {
        error!(window = %row.key(), %e, "failed to write kpi row");
    }
}

fn feed(
    path: &Path,
    batch_size: usize,
    driver: &mut PipelineDriver,
    worker: &mut Worker,
    metrics: &MetricsRegistry,
) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut pending = 0usize;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {} line {}", path.display(), index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_payload(&line) {
            Ok(event) => {
                driver.send(event);
                pending += 1;
            }
            Err(e) => {
                metrics.inc_malformed_records(1);
                warn!(line = index + 1, %e, "skipping malformed record");
            }
        }
        if pending >= batch_size {
            driver.advance(worker)?;
            pending = 0;
        }
    }
    if pending > 0 {
        driver.advance(worker)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    info!(input = %args.input.display(), "oee_pipeline starting");

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let workforce_text = std::fs::read_to_string(&args.workforce)
        .with_context(|| format!("reading workforce {}", args.workforce.display()))?;
    let workforce = WorkforceTable::from_json(&workforce_text).context("parsing workforce records")?;

    let metrics = MetricsRegistry::default();
    let ctx = PipelineContext::from_config(&config, workforce, metrics.clone())?;
    let timer = EpochTimer::start();
    let input = args.input.clone();
    let batch_size = args.batch_size.max(1);

    start_runtime(1, move |index, worker| {
        let mut driver = PipelineDriver::build(worker, &ctx, write_row)?;
        if index == 0 {
            feed(&input, batch_size, &mut driver, worker, &ctx.metrics)?;
        }
        driver.finish(worker)?;
        Ok(())
    })?;

    let summary = metrics.snapshot().to_json_line("final", Some(timer.elapsed()));
    info!(%summary, "oee_pipeline finished");
    Ok(())
}
