use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ShiftNumber;

/// Identifies one aggregation bucket: a `[window_start, window_end)` interval
/// for a single (plant, line, shift).
///
/// Keys order by window start first, so iterating a sorted map of keys walks
/// windows in close order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowKey {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub plant_name: String,
    pub production_line: String,
    pub shift_number: ShiftNumber,
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} - {}) {}/{}/shift {}",
            self.window_start.format("%Y-%m-%d %H:%M:%S"),
            self.window_end.format("%Y-%m-%d %H:%M:%S"),
            self.plant_name,
            self.production_line,
            self.shift_number
        )
    }
}
