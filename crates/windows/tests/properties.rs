//! Order-independence and late-data properties of the window aggregator.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use oee_core::{MachineHealth, TelemetryEvent, WindowAggregate};
use oee_windows::{AggregatorConfig, WindowAccumulator, WindowAggregator};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
}

fn arb_health() -> impl Strategy<Value = MachineHealth> {
    prop::sample::select(vec![MachineHealth::Healthy, MachineHealth::Warning, MachineHealth::Error])
}

/// Events spread over a few windows and keys, with fractional readings.
fn arb_event(span_secs: i64) -> impl Strategy<Value = TelemetryEvent> {
    (
        0..span_secs,
        prop::sample::select(vec!["Line1", "Line2"]),
        1..=3i64,
        arb_health(),
        0..50i64,
        0..5i64,
        0.0..100.0f64,
        50.0..110.0f64,
        0.0..100.0f64,
    )
        .prop_map(|(offset, line, shift, health, parts, defects, oil, temp, disk_free)| TelemetryEvent {
            application_id: "app".into(),
            device_id: format!("PlantA-{line}-{shift}"),
            message_properties: None,
            plant_name: "PlantA".into(),
            production_line: line.into(),
            shift_number: shift,
            message_timestamp: base() + Duration::seconds(offset),
            machine_health: health,
            total_parts_made: parts,
            defective_parts_made: defects,
            oil_level: oil,
            temperature: temp,
            system_disk_free_percent: disk_free,
            system_disk_used_percent: 100.0 - disk_free,
            cpu_load: 1.0,
            memory_free: 1.0,
            memory_used: 1.0,
            batch_number: None,
        })
}

fn run(config: AggregatorConfig, events: &[TelemetryEvent]) -> Vec<WindowAggregate> {
    let mut agg = WindowAggregator::new(config).unwrap();
    let mut out = Vec::new();
    for e in events {
        out.extend(agg.observe(e).unwrap().closed);
    }
    out.extend(agg.flush());
    out
}

fn generous() -> AggregatorConfig {
    AggregatorConfig { window: Duration::minutes(5), allowed_lateness: Duration::hours(2) }
}

proptest! {
    #[test]
    fn output_is_independent_of_arrival_order(
        (original, shuffled) in prop::collection::vec(arb_event(1_200), 1..60)
            .prop_flat_map(|events| (Just(events.clone()), Just(events).prop_shuffle()))
    ) {
        prop_assert_eq!(run(generous(), &original), run(generous(), &shuffled));
    }

    #[test]
    fn every_emitted_window_is_non_empty(events in prop::collection::vec(arb_event(3_600), 0..60)) {
        let config = AggregatorConfig { window: Duration::minutes(5), allowed_lateness: Duration::seconds(30) };
        for window in run(config, &events) {
            prop_assert!(window.total_count > 0);
            prop_assert_eq!(
                window.total_count,
                window.healthy_count + window.warning_count + window.error_count
            );
        }
    }

    #[test]
    fn late_events_never_change_closed_windows(
        included in prop::collection::vec(arb_event(300), 1..20),
        late in prop::collection::vec(arb_event(300), 1..20),
    ) {
        let config = AggregatorConfig { window: Duration::minutes(5), allowed_lateness: Duration::seconds(60) };
        let mut agg = WindowAggregator::new(config).unwrap();
        for e in &included {
            prop_assert!(agg.observe(e).unwrap().closed.is_empty());
        }

        // Push the watermark well past 10:05 so every first-window key closes.
        let mut trigger = included[0].clone();
        trigger.message_timestamp = base() + Duration::minutes(20);
        let mut closed = agg.observe(&trigger).unwrap().closed;
        closed.sort_by(|a, b| a.key.cmp(&b.key));

        let mut expected: Vec<WindowAggregate> = {
            let mut by_key = std::collections::BTreeMap::new();
            for e in &included {
                let key = agg.key_for(e).unwrap();
                by_key
                    .entry(key.clone())
                    .or_insert_with(|| WindowAccumulator::new(key))
                    .update(e)
                    .unwrap();
            }
            by_key.into_values().map(WindowAccumulator::finalize).collect()
        };
        expected.sort_by(|a, b| a.key.cmp(&b.key));
        prop_assert_eq!(&closed, &expected);

        for e in &late {
            let step = agg.observe(e).unwrap();
            prop_assert!(step.late);
            prop_assert!(step.closed.is_empty());
        }
        let remaining = agg.flush();
        prop_assert_eq!(remaining.len(), 1);
        prop_assert_eq!(remaining[0].total_count, 1);
        prop_assert_eq!(agg.stats().late_events, late.len() as u64);
    }
}
