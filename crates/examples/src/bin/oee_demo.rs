use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::info;

use oee_core::{KpiRow, MachineHealth, MessageProperties, TelemetryEvent, WorkforceRecord};
use oee_runtime::metrics::{EpochTimer, MetricsRegistry};
use oee_runtime::{init_tracing, start_runtime, PipelineConfig};
use oee_views::{PipelineContext, PipelineDriver, WorkforceTable};

const PLANTS: [&str; 2] = ["Everett", "Dublin"];
const LINES: [&str; 2] = ["ProductionLine 1", "ProductionLine 2"];
const MACHINES_PER_LINE: u64 = 3;
const MINUTES: u64 = 40;
const READINGS_PER_MINUTE: u64 = 4;

fn log_row(row: &KpiRow) {
    let key = row.key();
    info!(
        window = %key.window_start.format("%H:%M"),
        plant = %key.plant_name,
        line = %key.production_line,
        shift = key.shift_number,
        events = row.kpi.aggregate.total_count,
        availability = row.kpi.metrics.availability,
        quality = ?row.kpi.metrics.quality,
        oee = ?row.kpi.metrics.oee,
        workforce = row.workforce_count,
        warnings = ?row.warnings,
        "kpi row"
    );
}

/// Deterministic synthetic reading for one machine at one tick. A small
/// share of readings is invalid (bad shift, negative oil) and some arrive
/// late, stamped a few minutes in the past.
fn reading(start: DateTime<Utc>, minute: u64, tick: u64, plant: usize, line: usize, machine: u64) -> TelemetryEvent {
    let seq = minute * 97 + tick * 31 + plant as u64 * 13 + line as u64 * 7 + machine;
    let health = match seq % 11 {
        0 => MachineHealth::Error,
        1 | 2 => MachineHealth::Warning,
        _ => MachineHealth::Healthy,
    };
    let shift = if seq % 53 == 0 { 4 } else { 1 + ((minute / 15) % 3) as i64 };
    let oil = if seq % 67 == 0 { -5.0 } else { 58.0 + (seq % 40) as f64 };
    let delay = if seq % 29 == 0 { 7 * 60 } else { 0 };
    let offset = (minute * 60 + tick * (60 / READINGS_PER_MINUTE)) as i64 - delay;
    let device_id = format!("{}-{}-Machine-{}", PLANTS[plant], line + 1, machine);

    TelemetryEvent {
        application_id: "3e9449fe-3df7-4d06-9375-5ee9eeb0891c".to_string(),
        message_properties: Some(MessageProperties {
            connection_device_id: Some(device_id.clone()),
            ..MessageProperties::default()
        }),
        device_id,
        plant_name: PLANTS[plant].to_string(),
        production_line: LINES[line].to_string(),
        shift_number: shift,
        message_timestamp: start + Duration::seconds(offset),
        machine_health: health,
        total_parts_made: 80 + (seq % 25) as i64,
        defective_parts_made: (seq % 4) as i64,
        oil_level: oil,
        temperature: 65.0 + (seq % 30) as f64,
        system_disk_free_percent: 60.0 + (seq % 20) as f64,
        system_disk_used_percent: 40.0 - (seq % 20) as f64,
        cpu_load: 1.0 + (seq % 5) as f64 * 0.5,
        memory_free: 200_000_000.0,
        memory_used: 56_000_000.0,
        batch_number: Some((minute + 1) as i64),
    }
}

fn main() -> Result<()> {
    init_tracing();
    info!("oee_demo starting");

    // Shift 3 has no headcount record, so its rows are dropped by the join.
    let workforce = WorkforceTable::new([
        WorkforceRecord { shift_number: 1, employee_count: 42 },
        WorkforceRecord { shift_number: 2, employee_count: 35 },
    ]);
    let metrics = MetricsRegistry::default();
    let ctx = PipelineContext::from_config(&PipelineConfig::default(), workforce, metrics.clone())?;

    start_runtime(1, move |_index, worker| {
        info!("oee_demo worker running");
        let mut driver = PipelineDriver::build(worker, &ctx, log_row)?;
        let start = Utc.with_ymd_and_hms(2022, 5, 3, 22, 0, 0).single().unwrap_or_else(Utc::now);

        for minute in 0..MINUTES {
            let epoch_timer = EpochTimer::start();
            let epoch = driver.epoch();
            for tick in 0..READINGS_PER_MINUTE {
                for plant in 0..PLANTS.len() {
                    for line in 0..LINES.len() {
                        for machine in 0..MACHINES_PER_LINE {
                            driver.send(reading(start, minute, tick, plant, line, machine));
                        }
                    }
                }
            }
            driver.advance(worker)?;

            let snapshot = ctx.metrics.snapshot();
            info!(
                epoch,
                duration_ms = epoch_timer.elapsed().as_millis(),
                received = snapshot.events_received,
                dropped = snapshot.events_dropped,
                late = snapshot.late_events,
                rows = snapshot.rows_emitted,
                join_misses = snapshot.join_misses,
                "epoch complete"
            );
        }
        driver.finish(worker)?;
        Ok(())
    })?;

    let final_snapshot = metrics.snapshot();
    info!(?final_snapshot, "final metrics summary");
    Ok(())
}
