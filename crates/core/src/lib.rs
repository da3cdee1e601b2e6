//! Core types for the OEE streaming pipeline: telemetry records, window keys,
//! aggregates and the KPI calculator.

pub mod kpi;
pub mod telemetry;
pub mod window;
pub mod workforce;

pub use kpi::{calculate, KpiMetrics, KpiRow, WindowAggregate, WindowKpi};
pub use telemetry::{parse_payload, MachineHealth, MessageProperties, TelemetryEvent};
pub use window::WindowKey;
pub use workforce::{WorkforceLookup, WorkforceRecord};

pub type ShiftNumber = i64;

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// A raw payload that does not match the telemetry schema.
    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// A KPI with a zero denominator that has no sentinel policy.
    #[error("{metric} is undefined for window {key}: zero denominator")]
    DivisionUndefined { metric: &'static str, key: Box<WindowKey> },
}
