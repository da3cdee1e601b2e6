use tracing::debug;

use oee_core::{KpiRow, TelemetryEvent};

use crate::{OnFail, Outcome, RuleError, RuleSet, RuleSpec};

/// Field-level rules applied to every structured telemetry event.
pub fn default_event_rules() -> Vec<RuleSpec> {
    vec![
        RuleSpec::new("positive_defective_parts", "defectivePartsMade >= 0"),
        RuleSpec::new("positive_parts_made", "totalPartsMade >= 0"),
        RuleSpec::new("positive_oil_level", "oilLevel >= 0"),
        RuleSpec::new("expected_shifts", "shiftNumber >= 1 and shiftNumber <= 3"),
    ]
}

/// Row-level rules applied to every emitted KPI row.
pub fn default_result_rules() -> Vec<RuleSpec> {
    vec![
        RuleSpec::new("warn_defective_parts", "defectivePartsMade < 35"),
        RuleSpec::new("warn_low_temperature", "min_temperature > 70"),
        RuleSpec::new("warn_low_oilLevel", "min_oilLevel > 60"),
        RuleSpec::new("warn_decrease_Quality", "Quality > 99"),
        RuleSpec::new("warn_decrease_OEE", "OEE > 99.3"),
    ]
}

/// Drops any event that fails at least one rule.
#[derive(Debug, Clone)]
pub struct EventValidator {
    rules: RuleSet<TelemetryEvent>,
}

impl EventValidator {
    pub fn new(specs: &[RuleSpec]) -> Result<Self, RuleError> {
        Ok(Self { rules: RuleSet::compile(OnFail::Drop, specs)? })
    }

    pub fn rules(&self) -> &RuleSet<TelemetryEvent> {
        &self.rules
    }

    /// `outcome.record` is the unchanged event when every rule passed.
    pub fn validate(&self, event: TelemetryEvent) -> Outcome<TelemetryEvent> {
        let outcome = self.rules.apply(event);
        if outcome.record.is_none() {
            debug!(failed = ?outcome.failed, "dropping telemetry event");
        }
        outcome
    }
}

impl Default for EventValidator {
    fn default() -> Self {
        Self {
            rules: RuleSet::compile(OnFail::Drop, &default_event_rules())
                .unwrap_or_else(|e| unreachable!("built-in event rules: {e}")),
        }
    }
}

/// Tags KPI rows with the names of failed rules. Never drops a row.
#[derive(Debug, Clone)]
pub struct ResultValidator {
    rules: RuleSet<KpiRow>,
}

impl ResultValidator {
    pub fn new(specs: &[RuleSpec]) -> Result<Self, RuleError> {
        Ok(Self { rules: RuleSet::compile(OnFail::Tag, specs)? })
    }

    pub fn rules(&self) -> &RuleSet<KpiRow> {
        &self.rules
    }

    pub fn check(&self, mut row: KpiRow) -> KpiRow {
        let failed = self.rules.failures(&row);
        if !failed.is_empty() {
            debug!(window = %row.key(), ?failed, "kpi row flagged");
        }
        row.warnings.extend(failed);
        row
    }
}

impl Default for ResultValidator {
    fn default() -> Self {
        Self {
            rules: RuleSet::compile(OnFail::Tag, &default_result_rules())
                .unwrap_or_else(|e| unreachable!("built-in result rules: {e}")),
        }
    }
}
