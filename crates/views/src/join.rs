use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{info, warn};

use oee_core::{KpiRow, ShiftNumber, WindowKpi, WorkforceLookup, WorkforceRecord};

type Shifts = HashMap<ShiftNumber, WorkforceRecord>;

/// Versioned, read-mostly workforce dataset.
///
/// Each refresh installs a whole new table; readers clone the current `Arc`
/// and so always see one complete version. The lock is held only for the
/// pointer swap or clone.
#[derive(Clone, Default)]
pub struct WorkforceTable {
    current: Arc<RwLock<Arc<Shifts>>>,
}

impl WorkforceTable {
    pub fn new(records: impl IntoIterator<Item = WorkforceRecord>) -> Self {
        let table = Self::default();
        table.refresh(records);
        table
    }

    /// Parse a JSON array of `{"shiftNumber": .., "employeeCount": ..}`.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let records: Vec<WorkforceRecord> = serde_json::from_str(text)?;
        Ok(Self::new(records))
    }

    /// Replace the table. A shift listed twice keeps its last record.
    pub fn refresh(&self, records: impl IntoIterator<Item = WorkforceRecord>) {
        let next: Shifts = records.into_iter().map(|r| (r.shift_number, r)).collect();
        info!(shifts = next.len(), "workforce table refreshed");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    pub fn snapshot(&self) -> Arc<Shifts> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl WorkforceLookup for WorkforceTable {
    fn lookup(&self, shift: ShiftNumber) -> Option<WorkforceRecord> {
        self.snapshot().get(&shift).cloned()
    }
}

/// Inner join of KPI windows with the shift headcount.
#[derive(Clone)]
pub struct WorkforceJoiner<L> {
    lookup: L,
}

impl<L: WorkforceLookup> WorkforceJoiner<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }

    /// `None` when the shift has no workforce record; the row is dropped.
    pub fn join(&self, kpi: WindowKpi) -> Option<KpiRow> {
        let shift = kpi.aggregate.key.shift_number;
        match self.lookup.lookup(shift) {
            Some(record) => Some(KpiRow::new(kpi, record.employee_count)),
            None => {
                warn!(window = %kpi.aggregate.key, shift, "no workforce record for shift, dropping kpi row");
                None
            }
        }
    }
}
