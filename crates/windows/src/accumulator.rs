use oee_core::{MachineHealth, TelemetryEvent, WindowAggregate, WindowKey};

use crate::{AggregateError, ExactSum};

#[derive(Debug, Clone, PartialEq)]
struct RunningStats {
    sum: ExactSum,
    min: f64,
    max: f64,
}

impl RunningStats {
    fn empty() -> Self {
        Self { sum: ExactSum::new(), min: f64::INFINITY, max: f64::NEG_INFINITY }
    }

    fn checked_add(&self, value: f64) -> Option<Self> {
        Some(Self {
            sum: self.sum.checked_add(value)?,
            min: self.min.min(value),
            max: self.max.max(value),
        })
    }

    fn checked_merge(&self, other: &RunningStats) -> Option<Self> {
        Some(Self {
            sum: self.sum.checked_merge(&other.sum)?,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        })
    }
}

/// Running partial aggregate for one open window.
///
/// Every update is a sum, count, min or max, so the finalized aggregate does
/// not depend on the order in which a window's events arrive. Float sums are
/// exact and rounded once at finalization. Integer counters and float sums
/// are checked; overflow is reported instead of wrapping.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowAccumulator {
    key: WindowKey,
    total_count: u64,
    healthy_count: u64,
    error_count: u64,
    warning_count: u64,
    total_parts_made: i64,
    defective_parts_made: i64,
    oil_level: RunningStats,
    temperature: RunningStats,
    disk_free_sum: ExactSum,
}

impl WindowAccumulator {
    pub fn new(key: WindowKey) -> Self {
        Self {
            key,
            total_count: 0,
            healthy_count: 0,
            error_count: 0,
            warning_count: 0,
            total_parts_made: 0,
            defective_parts_made: 0,
            oil_level: RunningStats::empty(),
            temperature: RunningStats::empty(),
            disk_free_sum: ExactSum::new(),
        }
    }

    pub fn key(&self) -> &WindowKey {
        &self.key
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    fn checked<T>(&self, value: Option<T>, field: &'static str) -> Result<T, AggregateError> {
        value.ok_or_else(|| AggregateError::Overflow { field, key: Box::new(self.key.clone()) })
    }

    /// Fold one event into the window. On error the accumulator is unchanged.
    pub fn update(&mut self, event: &TelemetryEvent) -> Result<(), AggregateError> {
        let total_count = self.checked(self.total_count.checked_add(1), "total_count")?;
        let (mut healthy, mut error, mut warning) =
            (self.healthy_count, self.error_count, self.warning_count);
        let (slot, field) = match event.machine_health {
            MachineHealth::Healthy => (&mut healthy, "healthy_count"),
            MachineHealth::Error => (&mut error, "error_count"),
            MachineHealth::Warning => (&mut warning, "warning_count"),
        };
        *slot = self.checked(slot.checked_add(1), field)?;
        let total_parts_made = self.checked(
            self.total_parts_made.checked_add(event.total_parts_made),
            "totalPartsMade",
        )?;
        let defective_parts_made = self.checked(
            self.defective_parts_made.checked_add(event.defective_parts_made),
            "defectivePartsMade",
        )?;
        let oil_level = self.checked(self.oil_level.checked_add(event.oil_level), "oilLevel")?;
        let temperature = self.checked(self.temperature.checked_add(event.temperature), "temperature")?;
        let disk_free_sum = self.checked(
            self.disk_free_sum.checked_add(event.system_disk_free_percent),
            "systemDiskFreePercent",
        )?;

        self.total_count = total_count;
        self.healthy_count = healthy;
        self.error_count = error;
        self.warning_count = warning;
        self.total_parts_made = total_parts_made;
        self.defective_parts_made = defective_parts_made;
        self.oil_level = oil_level;
        self.temperature = temperature;
        self.disk_free_sum = disk_free_sum;
        Ok(())
    }

    /// Combine a partial accumulator for the same key, e.g. from another shard.
    pub fn merge(&mut self, other: &WindowAccumulator) -> Result<(), AggregateError> {
        if self.key != other.key {
            return Err(AggregateError::KeyMismatch {
                left: Box::new(self.key.clone()),
                right: Box::new(other.key.clone()),
            });
        }
        let total_count = self.checked(self.total_count.checked_add(other.total_count), "total_count")?;
        let healthy = self.checked(self.healthy_count.checked_add(other.healthy_count), "healthy_count")?;
        let error = self.checked(self.error_count.checked_add(other.error_count), "error_count")?;
        let warning = self.checked(self.warning_count.checked_add(other.warning_count), "warning_count")?;
        let total_parts_made = self.checked(
            self.total_parts_made.checked_add(other.total_parts_made),
            "totalPartsMade",
        )?;
        let defective_parts_made = self.checked(
            self.defective_parts_made.checked_add(other.defective_parts_made),
            "defectivePartsMade",
        )?;
        let oil_level = self.checked(self.oil_level.checked_merge(&other.oil_level), "oilLevel")?;
        let temperature = self.checked(self.temperature.checked_merge(&other.temperature), "temperature")?;
        let disk_free_sum = self.checked(
            self.disk_free_sum.checked_merge(&other.disk_free_sum),
            "systemDiskFreePercent",
        )?;

        self.total_count = total_count;
        self.healthy_count = healthy;
        self.error_count = error;
        self.warning_count = warning;
        self.total_parts_made = total_parts_made;
        self.defective_parts_made = defective_parts_made;
        self.oil_level = oil_level;
        self.temperature = temperature;
        self.disk_free_sum = disk_free_sum;
        Ok(())
    }

    /// Freeze the window into its output aggregate. Averages are taken over
    /// `total_count`, which callers guarantee is non-zero.
    pub fn finalize(self) -> WindowAggregate {
        let n = self.total_count as f64;
        let avg = |sum: &ExactSum| sum.value() / n;
        WindowAggregate {
            key: self.key,
            total_count: self.total_count,
            healthy_count: self.healthy_count,
            error_count: self.error_count,
            warning_count: self.warning_count,
            total_parts_made: self.total_parts_made,
            defective_parts_made: self.defective_parts_made,
            avg_oil_level: avg(&self.oil_level.sum),
            min_oil_level: self.oil_level.min,
            max_oil_level: self.oil_level.max,
            avg_temperature: avg(&self.temperature.sum),
            min_temperature: self.temperature.min,
            max_temperature: self.temperature.max,
            avg_system_disk_free_percent: avg(&self.disk_free_sum),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn key() -> WindowKey {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        WindowKey {
            window_start: start,
            window_end: start + chrono::Duration::minutes(5),
            plant_name: "PlantA".into(),
            production_line: "Line1".into(),
            shift_number: 1,
        }
    }

    fn event(health: MachineHealth, parts: i64, defects: i64, oil: f64, temp: f64) -> TelemetryEvent {
        TelemetryEvent {
            application_id: "app".into(),
            device_id: "dev".into(),
            message_properties: None,
            plant_name: "PlantA".into(),
            production_line: "Line1".into(),
            shift_number: 1,
            message_timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, 1, 0).unwrap(),
            machine_health: health,
            total_parts_made: parts,
            defective_parts_made: defects,
            oil_level: oil,
            temperature: temp,
            system_disk_free_percent: 50.0,
            system_disk_used_percent: 50.0,
            cpu_load: 1.0,
            memory_free: 1.0,
            memory_used: 1.0,
            batch_number: None,
        }
    }

    #[test]
    fn folds_counts_and_extremes() {
        let mut acc = WindowAccumulator::new(key());
        acc.update(&event(MachineHealth::Healthy, 10, 0, 90.0, 80.0)).unwrap();
        acc.update(&event(MachineHealth::Warning, 5, 2, 60.0, 72.0)).unwrap();
        acc.update(&event(MachineHealth::Error, 0, 0, 75.0, 95.0)).unwrap();
        let agg = acc.finalize();
        assert_eq!(agg.total_count, 3);
        assert_eq!((agg.healthy_count, agg.warning_count, agg.error_count), (1, 1, 1));
        assert_eq!(agg.total_parts_made, 15);
        assert_eq!(agg.defective_parts_made, 2);
        assert_eq!(agg.min_oil_level, 60.0);
        assert_eq!(agg.max_oil_level, 90.0);
        assert_eq!(agg.avg_oil_level, 75.0);
        assert_eq!(agg.min_temperature, 72.0);
        assert_eq!(agg.max_temperature, 95.0);
        assert_eq!(agg.avg_system_disk_free_percent, 50.0);
    }

    #[test]
    fn overflow_leaves_state_untouched() {
        let mut acc = WindowAccumulator::new(key());
        acc.update(&event(MachineHealth::Healthy, i64::MAX, 0, 90.0, 80.0)).unwrap();
        let before = acc.clone();
        let err = acc.update(&event(MachineHealth::Healthy, 1, 0, 10.0, 10.0)).unwrap_err();
        assert!(matches!(err, AggregateError::Overflow { field: "totalPartsMade", .. }));
        assert_eq!(acc, before);
    }

    #[test]
    fn fractional_readings_average_the_same_in_reverse() {
        let events: Vec<_> = [0.1, 0.2, 0.3, 97.50000000000014]
            .into_iter()
            .map(|oil| TelemetryEvent {
                system_disk_free_percent: oil / 3.0,
                ..event(MachineHealth::Healthy, 1, 0, oil, oil + 0.7)
            })
            .collect();
        let mut forward = WindowAccumulator::new(key());
        for e in &events {
            forward.update(e).unwrap();
        }
        let mut reversed = WindowAccumulator::new(key());
        for e in events.iter().rev() {
            reversed.update(e).unwrap();
        }
        assert_eq!(forward.finalize(), reversed.finalize());
    }

    #[test]
    fn float_overflow_is_reported() {
        let mut acc = WindowAccumulator::new(key());
        acc.update(&event(MachineHealth::Healthy, 1, 0, f64::MAX, 80.0)).unwrap();
        let before = acc.clone();
        let err = acc.update(&event(MachineHealth::Healthy, 1, 0, f64::MAX, 80.0)).unwrap_err();
        assert!(matches!(err, AggregateError::Overflow { field: "oilLevel", .. }));
        assert_eq!(acc, before);
    }

    #[test]
    fn merge_matches_single_pass() {
        let events = [
            event(MachineHealth::Healthy, 10, 1, 91.1, 80.3),
            event(MachineHealth::Error, 4, 0, 62.7, 71.05),
            event(MachineHealth::Warning, 7, 3, 88.0, 90.0),
        ];
        let mut whole = WindowAccumulator::new(key());
        for e in &events {
            whole.update(e).unwrap();
        }
        let mut left = WindowAccumulator::new(key());
        left.update(&events[0]).unwrap();
        let mut right = WindowAccumulator::new(key());
        right.update(&events[1]).unwrap();
        right.update(&events[2]).unwrap();
        left.merge(&right).unwrap();
        assert_eq!(left.finalize(), whole.finalize());
    }

    #[test]
    fn merge_rejects_foreign_key() {
        let mut acc = WindowAccumulator::new(key());
        let other = WindowAccumulator::new(WindowKey { shift_number: 2, ..key() });
        assert!(matches!(acc.merge(&other), Err(AggregateError::KeyMismatch { .. })));
    }
}
