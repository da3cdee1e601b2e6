use chrono::{DateTime, Duration, Utc};

/// Bounded out-of-orderness watermark: the maximum event time observed,
/// minus a fixed lateness bound. Never moves backwards.
#[derive(Debug, Clone)]
pub struct WatermarkTracker {
    lateness: Duration,
    max_event_time: Option<DateTime<Utc>>,
}

impl WatermarkTracker {
    pub fn new(lateness: Duration) -> Self {
        Self { lateness, max_event_time: None }
    }

    /// Record an event time; returns true if the watermark moved forward.
    pub fn observe(&mut self, event_time: DateTime<Utc>) -> bool {
        match self.max_event_time {
            Some(max) if event_time <= max => false,
            _ => {
                self.max_event_time = Some(event_time);
                true
            }
        }
    }

    /// `None` until the first event has been observed.
    pub fn current(&self) -> Option<DateTime<Utc>> {
        self.max_event_time
            .map(|max| max.checked_sub_signed(self.lateness).unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    /// True if the watermark has reached `window_end`, i.e. that window is
    /// closed and any event belonging to it is late.
    pub fn has_passed(&self, window_end: DateTime<Utc>) -> bool {
        self.current().map_or(false, |wm| wm >= window_end)
    }
}
