use oee_core::{KpiRow, TelemetryEvent};

/// Records that rules can be compiled against.
///
/// `accessor` resolves a column name, as written in a rule expression, to a
/// function reading that column as a number. `None` from the accessor means
/// the column has no value for this record.
pub trait RuleFields: Sized {
    fn accessor(field: &str) -> Option<fn(&Self) -> Option<f64>>;
}

impl RuleFields for TelemetryEvent {
    fn accessor(field: &str) -> Option<fn(&Self) -> Option<f64>> {
        let f: fn(&Self) -> Option<f64> = match field {
            "defectivePartsMade" => |e| Some(e.defective_parts_made as f64),
            "totalPartsMade" => |e| Some(e.total_parts_made as f64),
            "oilLevel" => |e| Some(e.oil_level),
            "shiftNumber" => |e| Some(e.shift_number as f64),
            "temperature" => |e| Some(e.temperature),
            "systemDiskFreePercent" => |e| Some(e.system_disk_free_percent),
            "systemDiskUsedPercent" => |e| Some(e.system_disk_used_percent),
            "cpuLoad" => |e| Some(e.cpu_load),
            "memoryFree" => |e| Some(e.memory_free),
            "memoryUsed" => |e| Some(e.memory_used),
            "batchNumber" => |e| e.batch_number.map(|b| b as f64),
            _ => return None,
        };
        Some(f)
    }
}

impl RuleFields for KpiRow {
    fn accessor(field: &str) -> Option<fn(&Self) -> Option<f64>> {
        let f: fn(&Self) -> Option<f64> = match field {
            "shiftNumber" => |r| Some(r.kpi.aggregate.key.shift_number as f64),
            "total_count" => |r| Some(r.kpi.aggregate.total_count as f64),
            "healthy_count" => |r| Some(r.kpi.aggregate.healthy_count as f64),
            "error_count" => |r| Some(r.kpi.aggregate.error_count as f64),
            "warning_count" => |r| Some(r.kpi.aggregate.warning_count as f64),
            "totalPartsMade" => |r| Some(r.kpi.aggregate.total_parts_made as f64),
            "defectivePartsMade" => |r| Some(r.kpi.aggregate.defective_parts_made as f64),
            "avg_oilLevel" => |r| Some(r.kpi.aggregate.avg_oil_level),
            "min_oilLevel" => |r| Some(r.kpi.aggregate.min_oil_level),
            "max_oilLevel" => |r| Some(r.kpi.aggregate.max_oil_level),
            "avg_temperature" => |r| Some(r.kpi.aggregate.avg_temperature),
            "min_temperature" => |r| Some(r.kpi.aggregate.min_temperature),
            "max_temperature" => |r| Some(r.kpi.aggregate.max_temperature),
            "avg_systemDiskFreePercent" => |r| Some(r.kpi.aggregate.avg_system_disk_free_percent),
            "Availability" => |r| Some(r.kpi.metrics.availability),
            "Performance" => |r| r.kpi.metrics.performance,
            "Quality" => |r| r.kpi.metrics.quality,
            "OEE" => |r| r.kpi.metrics.oee,
            "workforceCount" => |r| Some(r.workforce_count as f64),
            _ => return None,
        };
        Some(f)
    }
}
