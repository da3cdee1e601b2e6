//! Event-time tumbling windows over accepted telemetry.
//!
//! [`WindowAggregator`] keeps one [`WindowAccumulator`] per open
//! [`WindowKey`](oee_core::WindowKey) and finalizes windows once the
//! watermark (max event time seen minus the allowed lateness) reaches their
//! end. Events for windows the watermark has already passed are late and
//! never aggregated.

pub mod accumulator;
pub mod aggregator;
pub mod sum;
pub mod watermark;

pub use accumulator::WindowAccumulator;
pub use aggregator::{AggregatorConfig, AggregatorStats, Step, WindowAggregator};
pub use sum::ExactSum;
pub use watermark::WatermarkTracker;

use chrono::{DateTime, Utc};
use oee_core::WindowKey;

/// Faults after which the aggregates of a partition can no longer be trusted.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    #[error("accumulator overflow in {field} for window {key}")]
    Overflow { field: &'static str, key: Box<WindowKey> },

    #[error("event timestamp {timestamp} cannot be mapped to a window")]
    InvalidTimestamp { timestamp: DateTime<Utc> },

    #[error("invalid window size: {millis}ms, must be greater than 0")]
    InvalidWindowSize { millis: i64 },

    #[error("cannot merge accumulator for {right} into {left}")]
    KeyMismatch { left: Box<WindowKey>, right: Box<WindowKey> },

    #[error("aggregator halted after an earlier fault")]
    Halted,
}
