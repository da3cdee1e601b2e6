use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, trace};

use oee_core::{TelemetryEvent, WindowAggregate, WindowKey};

use crate::{AggregateError, WatermarkTracker, WindowAccumulator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Tumbling window size.
    pub window: Duration,
    /// How far behind the newest event time the watermark trails.
    pub allowed_lateness: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { window: Duration::minutes(5), allowed_lateness: Duration::seconds(60) }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub late_events: u64,
    pub windows_opened: u64,
    pub windows_closed: u64,
    pub open_windows_peak: u64,
}

/// What one observed event did to the aggregator.
#[derive(Debug, Default, PartialEq)]
pub struct Step {
    /// The event's window had already closed; it was not aggregated.
    pub late: bool,
    /// Windows finalized by the watermark advance this event caused, in
    /// close order.
    pub closed: Vec<WindowAggregate>,
}

/// Keyed store of open windows with watermark-driven eviction.
///
/// A window is open from its first event until the watermark reaches its
/// end; it is then finalized, returned to the caller and removed. Nothing
/// reopens a closed window. After a fatal fault the aggregator refuses all
/// further input with [`AggregateError::Halted`].
#[derive(Debug)]
pub struct WindowAggregator {
    config: AggregatorConfig,
    window_millis: i64,
    watermark: WatermarkTracker,
    open: BTreeMap<WindowKey, WindowAccumulator>,
    stats: AggregatorStats,
    halted: bool,
}

impl WindowAggregator {
    pub fn new(config: AggregatorConfig) -> Result<Self, AggregateError> {
        let window_millis = config.window.num_milliseconds();
        if window_millis <= 0 {
            return Err(AggregateError::InvalidWindowSize { millis: window_millis });
        }
        Ok(Self {
            config,
            window_millis,
            watermark: WatermarkTracker::new(config.allowed_lateness),
            open: BTreeMap::new(),
            stats: AggregatorStats::default(),
            halted: false,
        })
    }

    pub fn stats(&self) -> AggregatorStats {
        self.stats
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark.current()
    }

    pub fn open_windows(&self) -> usize {
        self.open.len()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Start of the window containing `ts`, aligned to the window size.
    pub fn window_start(&self, ts: DateTime<Utc>) -> Result<DateTime<Utc>, AggregateError> {
        let millis = ts.timestamp_millis();
        let aligned = millis - millis.rem_euclid(self.window_millis);
        DateTime::<Utc>::from_timestamp_millis(aligned)
            .ok_or(AggregateError::InvalidTimestamp { timestamp: ts })
    }

    pub fn key_for(&self, event: &TelemetryEvent) -> Result<WindowKey, AggregateError> {
        let ts = event.message_timestamp;
        let window_start = self.window_start(ts)?;
        let window_end = window_start
            .checked_add_signed(self.config.window)
            .ok_or(AggregateError::InvalidTimestamp { timestamp: ts })?;
        Ok(WindowKey {
            window_start,
            window_end,
            plant_name: event.plant_name.clone(),
            production_line: event.production_line.clone(),
            shift_number: event.shift_number,
        })
    }

    /// Aggregate one accepted event and close every window the resulting
    /// watermark has passed.
    pub fn observe(&mut self, event: &TelemetryEvent) -> Result<Step, AggregateError> {
        if self.halted {
            return Err(AggregateError::Halted);
        }
        let result = self.try_observe(event);
        if let Err(fault) = &result {
            error!(%fault, "window aggregator halted");
            self.halted = true;
        }
        result
    }

    fn try_observe(&mut self, event: &TelemetryEvent) -> Result<Step, AggregateError> {
        let key = self.key_for(event)?;
        if self.watermark.has_passed(key.window_end) {
            self.stats.late_events += 1;
            debug!(
                window = %key,
                event_time = %event.message_timestamp,
                device = %event.device_id,
                "dropping late event"
            );
            return Ok(Step { late: true, ..Step::default() });
        }

        let mut step = Step::default();
        match self.open.get_mut(&key) {
            Some(acc) => acc.update(event)?,
            None => {
                let mut acc = WindowAccumulator::new(key.clone());
                acc.update(event)?;
                trace!(window = %key, "window opened");
                self.open.insert(key, acc);
                self.stats.windows_opened += 1;
            }
        }
        self.stats.open_windows_peak = self.stats.open_windows_peak.max(self.open.len() as u64);

        if self.watermark.observe(event.message_timestamp) {
            step.closed = self.close_passed();
        }
        Ok(step)
    }

    fn close_passed(&mut self) -> Vec<WindowAggregate> {
        let Some(watermark) = self.watermark.current() else {
            return Vec::new();
        };
        let mut closed = Vec::new();
        // Keys sort by window start, and all windows share one size, so the
        // closable windows form a prefix of the map.
        while let Some(entry) = self.open.first_entry() {
            if entry.key().window_end > watermark {
                break;
            }
            let acc = entry.remove();
            if let Some(aggregate) = self.finalize(acc) {
                closed.push(aggregate);
            }
        }
        closed
    }

    fn finalize(&mut self, acc: WindowAccumulator) -> Option<WindowAggregate> {
        if acc.is_empty() {
            return None;
        }
        self.stats.windows_closed += 1;
        debug!(window = %acc.key(), total_count = acc.total_count(), "window closed");
        Some(acc.finalize())
    }

    /// Finalize every open window regardless of the watermark. Used once the
    /// input has ended for good.
    pub fn flush(&mut self) -> Vec<WindowAggregate> {
        let open = std::mem::take(&mut self.open);
        open.into_values().filter_map(|acc| self.finalize(acc)).collect()
    }
}
