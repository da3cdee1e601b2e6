use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoreError, ShiftNumber};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MachineHealth {
    Healthy,
    Warning,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageProperties {
    #[serde(rename = "iothub-connection-device-id", default)]
    pub connection_device_id: Option<String>,
    #[serde(rename = "iothub-creation-time-utc", default)]
    pub creation_time_utc: Option<String>,
    #[serde(rename = "iothub-interface-id", default)]
    pub interface_id: Option<String>,
}

/// One structured device reading, flattened out of the raw envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub application_id: String,
    pub device_id: String,
    #[serde(default)]
    pub message_properties: Option<MessageProperties>,
    pub plant_name: String,
    pub production_line: String,
    pub shift_number: ShiftNumber,
    pub message_timestamp: DateTime<Utc>,
    pub machine_health: MachineHealth,
    pub total_parts_made: i64,
    pub defective_parts_made: i64,
    pub oil_level: f64,
    pub temperature: f64,
    pub system_disk_free_percent: f64,
    pub system_disk_used_percent: f64,
    pub cpu_load: f64,
    pub memory_free: f64,
    pub memory_used: f64,
    #[serde(default)]
    pub batch_number: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    application_id: String,
    device_id: String,
    #[serde(default)]
    message_properties: Option<MessageProperties>,
    telemetry: RawTelemetry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTelemetry {
    #[serde(default)]
    batch_number: Option<i64>,
    cpu_load: f64,
    defective_parts_made: i64,
    machine_health: MachineHealth,
    memory_free: f64,
    memory_used: f64,
    message_timestamp: DateTime<Utc>,
    oil_level: f64,
    plant_name: String,
    production_line: String,
    shift_number: ShiftNumber,
    system_disk_free_percent: f64,
    system_disk_used_percent: f64,
    temperature: f64,
    total_parts_made: i64,
}

/// Decode one raw device payload into a [`TelemetryEvent`].
///
/// The schema is fixed: a missing required field, a value of the wrong type,
/// an unknown `machineHealth` or an unparseable `messageTimestamp` is a
/// [`CoreError::MalformedRecord`].
pub fn parse_payload(body: &str) -> Result<TelemetryEvent, CoreError> {
    let raw: RawPayload = serde_json::from_str(body).map_err(|e| CoreError::MalformedRecord {
        reason: e.to_string(),
    })?;
    let t = raw.telemetry;
    Ok(TelemetryEvent {
        application_id: raw.application_id,
        device_id: raw.device_id,
        message_properties: raw.message_properties,
        plant_name: t.plant_name,
        production_line: t.production_line,
        shift_number: t.shift_number,
        message_timestamp: t.message_timestamp,
        machine_health: t.machine_health,
        total_parts_made: t.total_parts_made,
        defective_parts_made: t.defective_parts_made,
        oil_level: t.oil_level,
        temperature: t.temperature,
        system_disk_free_percent: t.system_disk_free_percent,
        system_disk_used_percent: t.system_disk_used_percent,
        cpu_load: t.cpu_load,
        memory_free: t.memory_free,
        memory_used: t.memory_used,
        batch_number: t.batch_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const BODY: &str = r#"{
      "applicationId":"3e9449fe-3df7-4d06-9375-5ee9eeb0891c",
      "deviceId":"Everett-BoltMachine-2",
      "messageProperties":{"iothub-connection-device-id":"Everett-BoltMachine-2","iothub-creation-time-utc":"2022-05-03T17:05:26-05:00","iothub-interface-id":""},
      "telemetry": {"batchNumber":23,"cpuLoad":3.03,"defectivePartsMade":2,"machineHealth":"Healthy","memoryFree":211895179,"memoryUsed":56540277,
       "messageTimestamp":"2022-05-03T22:05:26.402569Z","oilLevel":97.50000000000014,"plantName":"Everett","productionLine":"ProductionLine 2",
       "shiftNumber":3,"systemDiskFreePercent":75,"systemDiskUsedPercent":25,"temperature":89.5,"totalPartsMade":99}}"#;

    #[test]
    fn parses_device_envelope() {
        let event = parse_payload(BODY).unwrap();
        assert_eq!(event.device_id, "Everett-BoltMachine-2");
        assert_eq!(event.plant_name, "Everett");
        assert_eq!(event.production_line, "ProductionLine 2");
        assert_eq!(event.shift_number, 3);
        assert_eq!(event.machine_health, MachineHealth::Healthy);
        assert_eq!(event.total_parts_made, 99);
        assert_eq!(event.defective_parts_made, 2);
        assert_eq!(event.batch_number, Some(23));
        assert_eq!(event.memory_free, 211_895_179.0);
        let expected = Utc.with_ymd_and_hms(2022, 5, 3, 22, 5, 26).unwrap();
        assert_eq!(event.message_timestamp.timestamp(), expected.timestamp());
        let props = event.message_properties.unwrap();
        assert_eq!(props.interface_id.as_deref(), Some(""));
    }

    #[test]
    fn missing_field_is_malformed() {
        let body = BODY.replace("\"oilLevel\":97.50000000000014,", "");
        let err = parse_payload(&body).unwrap_err();
        assert!(matches!(err, CoreError::MalformedRecord { .. }), "{err}");
        assert!(err.to_string().contains("oilLevel"));
    }

    #[test]
    fn wrong_type_is_malformed() {
        let body = BODY.replace("\"shiftNumber\":3", "\"shiftNumber\":\"third\"");
        assert!(matches!(parse_payload(&body), Err(CoreError::MalformedRecord { .. })));
    }

    #[test]
    fn wide_shift_number_parses() {
        let body = BODY.replace("\"shiftNumber\":3", "\"shiftNumber\":4294967297");
        let event = parse_payload(&body).unwrap();
        assert_eq!(event.shift_number, 4_294_967_297);
    }

    #[test]
    fn unknown_health_state_is_malformed() {
        let body = BODY.replace("\"Healthy\"", "\"Exploded\"");
        assert!(matches!(parse_payload(&body), Err(CoreError::MalformedRecord { .. })));
    }

    #[test]
    fn bad_timestamp_is_malformed() {
        let body = BODY.replace("2022-05-03T22:05:26.402569Z", "yesterday");
        assert!(matches!(parse_payload(&body), Err(CoreError::MalformedRecord { .. })));
    }

    #[test]
    fn message_properties_are_optional() {
        let start = BODY.find("\"messageProperties\"").unwrap();
        let end = BODY.find("\"telemetry\"").unwrap();
        let body = format!("{}{}", &BODY[..start], &BODY[end..]);
        let event = parse_payload(&body).unwrap();
        assert!(event.message_properties.is_none());
    }
}
