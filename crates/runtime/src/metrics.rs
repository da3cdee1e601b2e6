use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use oee_windows::AggregatorStats;
use serde::Serialize;

/// Pipeline counters shared by every stage and worker.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    events_received: AtomicU64,
    malformed_records: AtomicU64,
    events_accepted: AtomicU64,
    events_dropped: AtomicU64,
    late_events: AtomicU64,
    windows_opened: AtomicU64,
    windows_closed: AtomicU64,
    open_windows_peak: AtomicU64,
    undefined_kpis: AtomicU64,
    join_misses: AtomicU64,
    rows_emitted: AtomicU64,
    rows_flagged: AtomicU64,
    rule_failures: Mutex<BTreeMap<String, u64>>,
    row_warnings: Mutex<BTreeMap<String, u64>>,
}

fn tally<'a>(map: &Mutex<BTreeMap<String, u64>>, names: impl IntoIterator<Item = &'a String>) {
    let mut map = map.lock().unwrap_or_else(PoisonError::into_inner);
    for name in names {
        *map.entry(name.clone()).or_insert(0) += 1;
    }
}

impl MetricsRegistry {
    pub fn inc_events_received(&self, delta: u64) {
        self.inner.events_received.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc_malformed_records(&self, delta: u64) {
        self.inner.malformed_records.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc_events_accepted(&self, delta: u64) {
        self.inner.events_accepted.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc_events_dropped(&self, delta: u64) {
        self.inner.events_dropped.fetch_add(delta, Ordering::Relaxed);
    }

    /// Fold in what one aggregator did since `reported`, its stats at the
    /// previous report. Workers report their own aggregators into one
    /// registry, so counts are added as deltas.
    pub fn record_aggregator(&self, reported: &AggregatorStats, now: &AggregatorStats) {
        let inner = &self.inner;
        inner.late_events.fetch_add(now.late_events - reported.late_events, Ordering::Relaxed);
        inner.windows_opened.fetch_add(now.windows_opened - reported.windows_opened, Ordering::Relaxed);
        inner.windows_closed.fetch_add(now.windows_closed - reported.windows_closed, Ordering::Relaxed);
        inner.open_windows_peak.fetch_max(now.open_windows_peak, Ordering::Relaxed);
    }

    pub fn inc_undefined_kpis(&self, delta: u64) {
        self.inner.undefined_kpis.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc_join_misses(&self, delta: u64) {
        self.inner.join_misses.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc_rows_emitted(&self, delta: u64) {
        self.inner.rows_emitted.fetch_add(delta, Ordering::Relaxed);
    }

    /// Count one failure per named event rule, whether or not the event was dropped.
    pub fn record_rule_failures<'a>(&self, rules: impl IntoIterator<Item = &'a String>) {
        tally(&self.inner.rule_failures, rules);
    }

    /// Count one flagged row and one hit per warning rule it failed.
    pub fn record_row_warnings<'a>(&self, rules: impl IntoIterator<Item = &'a String>) {
        let mut rules = rules.into_iter().peekable();
        if rules.peek().is_some() {
            self.inner.rows_flagged.fetch_add(1, Ordering::Relaxed);
            tally(&self.inner.row_warnings, rules);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let copy = |map: &Mutex<BTreeMap<String, u64>>| {
            map.lock().unwrap_or_else(PoisonError::into_inner).clone()
        };
        MetricsSnapshot {
            events_received: load(&self.inner.events_received),
            malformed_records: load(&self.inner.malformed_records),
            events_accepted: load(&self.inner.events_accepted),
            events_dropped: load(&self.inner.events_dropped),
            late_events: load(&self.inner.late_events),
            windows_opened: load(&self.inner.windows_opened),
            windows_closed: load(&self.inner.windows_closed),
            open_windows_peak: load(&self.inner.open_windows_peak),
            undefined_kpis: load(&self.inner.undefined_kpis),
            join_misses: load(&self.inner.join_misses),
            rows_emitted: load(&self.inner.rows_emitted),
            rows_flagged: load(&self.inner.rows_flagged),
            rule_failures: copy(&self.inner.rule_failures),
            row_warnings: copy(&self.inner.row_warnings),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub malformed_records: u64,
    pub events_accepted: u64,
    pub events_dropped: u64,
    pub late_events: u64,
    pub windows_opened: u64,
    pub windows_closed: u64,
    pub open_windows_peak: u64,
    pub undefined_kpis: u64,
    pub join_misses: u64,
    pub rows_emitted: u64,
    pub rows_flagged: u64,
    pub rule_failures: BTreeMap<String, u64>,
    pub row_warnings: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    pub fn to_json_line(&self, label: &str, elapsed: Option<Duration>) -> String {
        #[derive(Serialize)]
        struct Snapshot<'a> {
            label: &'a str,
            #[serde(flatten)]
            metrics: &'a MetricsSnapshot,
            elapsed_ms: Option<u128>,
        }

        let payload = Snapshot { label, metrics: self, elapsed_ms: elapsed.map(|d| d.as_millis()) };
        serde_json::to_string(&payload).unwrap_or_else(|_| String::from("{}"))
    }
}

pub struct EpochTimer {
    start: Instant,
}

impl EpochTimer {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
