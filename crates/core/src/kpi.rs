use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{CoreError, WindowKey};

/// Finalized, immutable content of one closed window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowAggregate {
    #[serde(flatten)]
    pub key: WindowKey,
    pub total_count: u64,
    pub healthy_count: u64,
    pub error_count: u64,
    pub warning_count: u64,
    #[serde(rename = "totalPartsMade")]
    pub total_parts_made: i64,
    #[serde(rename = "defectivePartsMade")]
    pub defective_parts_made: i64,
    #[serde(rename = "avg_oilLevel")]
    pub avg_oil_level: f64,
    #[serde(rename = "min_oilLevel")]
    pub min_oil_level: f64,
    #[serde(rename = "max_oilLevel")]
    pub max_oil_level: f64,
    pub avg_temperature: f64,
    pub min_temperature: f64,
    pub max_temperature: f64,
    #[serde(rename = "avg_systemDiskFreePercent")]
    pub avg_system_disk_free_percent: f64,
}

/// Derived effectiveness metrics, in percent.
///
/// `None` is the sentinel for a metric whose denominator was zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct KpiMetrics {
    #[serde(rename = "Availability")]
    pub availability: f64,
    #[serde(rename = "Performance")]
    pub performance: Option<f64>,
    #[serde(rename = "Quality")]
    pub quality: Option<f64>,
    #[serde(rename = "OEE")]
    pub oee: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowKpi {
    #[serde(flatten)]
    pub aggregate: WindowAggregate,
    #[serde(flatten)]
    pub metrics: KpiMetrics,
}

/// Output record: a window's KPIs joined with the shift headcount, plus the
/// names of any warning rules the row failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KpiRow {
    #[serde(flatten)]
    pub kpi: WindowKpi,
    #[serde(rename = "workforceCount")]
    pub workforce_count: i64,
    pub warnings: BTreeSet<String>,
}

impl KpiRow {
    pub fn new(kpi: WindowKpi, workforce_count: i64) -> Self {
        Self { kpi, workforce_count, warnings: BTreeSet::new() }
    }

    pub fn key(&self) -> &WindowKey {
        &self.kpi.aggregate.key
    }

    pub fn has_warning(&self, rule: &str) -> bool {
        self.warnings.contains(rule)
    }
}

fn percent(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(numerator * 100.0 / denominator)
    }
}

/// Derive Availability, Performance, Quality and OEE from a closed window.
///
/// An empty window has no defined Availability and is rejected with
/// [`CoreError::DivisionUndefined`]. Zero parts made or zero classified
/// health readings leave Quality or Performance (and therefore OEE) as `None`.
pub fn calculate(aggregate: &WindowAggregate) -> Result<KpiMetrics, CoreError> {
    let healthy = aggregate.healthy_count as f64;
    let error = aggregate.error_count as f64;
    let warning = aggregate.warning_count as f64;

    let availability = percent(healthy - error, aggregate.total_count as f64).ok_or_else(|| {
        CoreError::DivisionUndefined {
            metric: "Availability",
            key: Box::new(aggregate.key.clone()),
        }
    })?;
    let performance = percent(healthy, healthy + error + warning);
    let total_parts = aggregate.total_parts_made as f64;
    let quality = percent(total_parts - aggregate.defective_parts_made as f64, total_parts);
    let oee = match (quality, performance) {
        (Some(q), Some(p)) => Some((availability + q + p) / 3.0),
        _ => None,
    };

    Ok(KpiMetrics { availability, performance, quality, oee })
}
