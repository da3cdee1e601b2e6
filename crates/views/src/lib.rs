//! Dataflow views over the telemetry stream: the workforce join and the
//! timely assembly of the full KPI pipeline.

use std::sync::{Arc, Mutex, PoisonError};

use oee_windows::AggregateError;

pub mod dataflow;
pub mod join;

pub use dataflow::{kpi_dataflow, PipelineContext, PipelineDriver};
pub use join::{WorkforceJoiner, WorkforceTable};

/// First fatal fault raised inside the dataflow, shared with the driver.
///
/// Operators cannot return errors, so the aggregation operator parks its
/// fault here and the driver stops stepping once one is present.
#[derive(Clone, Default)]
pub struct FaultSlot {
    inner: Arc<Mutex<Option<AggregateError>>>,
}

impl FaultSlot {
    /// Keeps the first fault; later ones are consequences of it.
    pub fn raise(&self, fault: AggregateError) {
        let mut slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(fault);
        }
    }

    pub fn check(&self) -> Result<(), AggregateError> {
        match &*self.inner.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }
}
