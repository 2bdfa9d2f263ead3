use crate::metering_p1::structs::{CosemObject, CosemValue, Telegram, TelegramDiagnostics, TelegramState};
use crate::{get_id, get_unix_ts};
use serde::Serialize;
use serde_json::{Map, Value};

/// One decoded telegram flattened for publishing
#[derive(Debug, Clone, Serialize)]
pub struct MeteringData {
    pub id: String,
    pub meter_name: String,
    pub manufacturer: String,
    pub family: String,
    pub state: TelegramState,
    pub transmission_time: u64,
    /// Meter clock (`0-0:1.0.0`) as RFC 3339
    pub metered_time: Option<String>,
    pub metered_values: Map<String, Value>,
    /// Objects the meter family does not declare, keyed by OBIS id
    pub unknown_values: Map<String, Value>,
    pub diagnostics: TelegramDiagnostics,
}

fn value_to_json(value: &CosemValue, utc_offset: i32) -> Value {
    match value {
        CosemValue::Number { value, .. } => serde_json::Number::from_f64(value.as_f64())
            .map(Value::Number)
            .unwrap_or(Value::Null),
        CosemValue::Text(text) => Value::String(text.clone()),
        CosemValue::Timestamp(ts) => match ts.to_fixed_offset(utc_offset) {
            Some(dt) => Value::String(dt.to_rfc3339()),
            None => Value::String(ts.raw().to_string()),
        },
        CosemValue::Flags { bits, .. } => Value::from(*bits),
    }
}

fn object_to_json(object: &CosemObject, utc_offset: i32) -> Value {
    let values: Vec<Value> = object
        .values()
        .iter()
        .map(|v| match v {
            Ok(value) => value_to_json(value, utc_offset),
            Err(_) => Value::Null,
        })
        .collect();

    match values.len() {
        1 => values.into_iter().next().unwrap_or(Value::Null),
        _ => Value::Array(values),
    }
}

/* Only when the hex string decodes to printable text */
fn decoded_text(value: &CosemValue) -> Option<String> {
    let text = value.decode_hex_text()?;
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        return None;
    }
    Some(text)
}

impl MeteringData {
    pub fn from_telegram(telegram: &Telegram, family: &str, utc_offset: i32) -> Self {
        let meter_name = telegram.identification().to_string();
        let manufacturer = telegram
            .device()
            .map(|d| d.manufacturer.clone())
            .unwrap_or_default();

        let mut metered_values = Map::new();
        let mut unknown_values = Map::new();
        let mut metered_time = None;

        for object in telegram.cosem_objects() {
            let json = object_to_json(object, utc_offset);
            let channel = match object.channel() {
                Some(channel) if !object.is_unknown() => channel,
                _ => {
                    unknown_values.insert(object.obis().to_string(), json);
                    continue;
                }
            };

            if channel == "timestamp" {
                metered_time = json.as_str().map(|s| s.to_string());
            }

            /* single valued objects carry their unit next to them */
            if let [Ok(value)] = object.values() {
                if let Some(unit) = value.unit() {
                    metered_values.insert(format!("{}_unit", channel), unit.to_string().into());
                }
                if let Some(text) = decoded_text(value) {
                    metered_values.insert(format!("{}_text", channel), text.into());
                }
            }
            metered_values.insert(channel.to_string(), json);
        }

        MeteringData {
            id: get_id("p1".to_string(), &meter_name),
            meter_name,
            manufacturer,
            family: family.to_string(),
            state: telegram.state(),
            transmission_time: get_unix_ts(),
            metered_time,
            metered_values,
            unknown_values,
            diagnostics: *telegram.diagnostics(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metering_p1::meter_definitions::{get_meter_descriptor, MeterFamily};
    use crate::metering_p1::{P1Pipeline, PipelineOptions};

    const TELEGRAM: &str = "/ISk5\\2MT382-1000\r\n\r\n0-0:1.0.0(101209113020W)\r\n0-0:96.1.1(4B384547303034303436333935353037)\r\n1-0:1.8.1(123456.789*kWh)\r\n0-0:96.14.0(0002)\r\n1-0:99.97.0(1)(0-0:96.7.19)(101208152415W)(0000000240*s)\r\n1-0:99.1.0(7)\r\n!\r\n";

    fn telegram() -> Telegram {
        let mut pipeline = P1Pipeline::new(get_meter_descriptor(MeterFamily::Dsmr50), PipelineOptions::default());
        pipeline.push(TELEGRAM.as_bytes());
        pipeline.next().unwrap().unwrap()
    }

    #[test]
    fn test_from_telegram() {
        let data = MeteringData::from_telegram(&telegram(), "dsmr50", 3600);

        assert_eq!(data.meter_name, "ISk5\\2MT382-1000");
        assert_eq!(data.manufacturer, "ISk");
        assert_eq!(data.state, TelegramState::Ok);
        assert_eq!(data.metered_time.as_deref(), Some("2010-12-09T11:30:20+01:00"));
        assert_eq!(data.metered_values["energy_consumed_t1"], Value::from(123456.789));
        assert_eq!(data.metered_values["energy_consumed_t1_unit"], Value::from("kWh"));
        assert_eq!(data.metered_values["equipment_id_text"], Value::from("K8EG004046395507"));
        assert_eq!(data.metered_values["tariff_indicator"], Value::from("0002"));
        assert!(data.metered_values.get("tariff_indicator_text").is_none());

        let log = data.metered_values["power_failure_log"].as_array().unwrap();
        assert_eq!(log.len(), 4);
        assert_eq!(log[3], Value::from(240.0));

        assert_eq!(data.unknown_values["1-0:99.1.0"], Value::from(7.0));
        assert_eq!(data.diagnostics.unknown_objects, 1);
    }

    #[test]
    fn test_failed_reading_is_published_as_unknown() {
        let input = "/FLU5\\253769484_A\r\n1-0:1.8.1(000000.034*kWh)\r\n0-1:24.2.3(632525252525W)(00000.000)\r\n!\r\n";
        let mut pipeline = P1Pipeline::new(get_meter_descriptor(MeterFamily::Fluvius), PipelineOptions::default());
        pipeline.push(input.as_bytes());
        let data = MeteringData::from_telegram(&pipeline.next().unwrap().unwrap(), "fluvius", 3600);

        assert!(data.metered_values.get("mbus_reading").is_none());
        assert_eq!(data.unknown_values["0-1:24.2.3"], Value::Array(vec![Value::Null, Value::from(0.0)]));
        assert_eq!(data.diagnostics.value_errors, 1);
    }

    #[test]
    fn test_serialize() {
        let data = MeteringData::from_telegram(&telegram(), "dsmr50", 3600);
        let json: Value = serde_json::from_str(&serde_json::to_string(&data).unwrap()).unwrap();
        assert_eq!(json["state"], "OK");
        assert_eq!(json["family"], "dsmr50");
        assert_eq!(json["diagnostics"]["unknown_objects"], 1);
    }
}
