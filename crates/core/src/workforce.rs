use serde::{Deserialize, Serialize};

use crate::ShiftNumber;

/// Headcount for one shift, owned by the workforce dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkforceRecord {
    pub shift_number: ShiftNumber,
    pub employee_count: i64,
}

/// Read-only view of the workforce dataset.
pub trait WorkforceLookup {
    fn lookup(&self, shift: ShiftNumber) -> Option<WorkforceRecord>;
}
