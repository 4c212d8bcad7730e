// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One telemetry reading as published by a device.
///
/// The timestamp is kept as an ISO-8601 string with a UTC designator, the readings are optional
/// because devices may leave any of them out.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Sample {
    pub timestamp: String,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub aqi_proxy: Option<f64>,
}

/// Why an inbound payload could not be turned into a [`Sample`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,
}

impl Sample {
    /// A sample taken at `timestamp` without any readings.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: format_timestamp(timestamp),
            ..Default::default()
        }
    }

    /// Decodes a raw message payload.
    ///
    /// Unknown keys are ignored, missing or non-numeric readings become `None`. A missing or
    /// unparseable `timestamp` is replaced by `received_at`.
    pub fn decode(raw: &[u8], received_at: DateTime<Utc>) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(raw)?;
        let Value::Object(record) = serde_json::from_str::<Value>(text)? else {
            return Err(DecodeError::NotAnObject);
        };

        let timestamp = record
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .unwrap_or(received_at);

        Ok(Self {
            timestamp: format_timestamp(timestamp),
            temperature_c: reading(&record, "temperature_c"),
            humidity_pct: reading(&record, "humidity_pct"),
            aqi_proxy: reading(&record, "aqi_proxy"),
        })
    }

    /// The parsed timestamp, `None` if it is not a valid ISO-8601 time.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

fn reading(record: &Map<String, Value>, key: &str) -> Option<f64> {
    record.get(key).and_then(Value::as_f64)
}

/// Parses an ISO-8601 timestamp. Times without an offset are taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(time.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

/// Formats `time` the way samples store it, e.g. `2024-05-01T12:00:00.000Z`.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
fn receipt_time() -> DateTime<Utc> {
    parse_timestamp("2024-05-01T12:00:00Z").unwrap()
}

#[test]
fn test_decode_partial_payload() {
    let sample = Sample::decode(br#"{"temperature_c": 21.5}"#, receipt_time()).unwrap();

    assert_eq!(sample.temperature_c, Some(21.5));
    assert_eq!(sample.humidity_pct, None);
    assert_eq!(sample.aqi_proxy, None);
    assert_eq!(sample.timestamp, "2024-05-01T12:00:00.000Z");
}

#[test]
fn test_decode_full_payload_keeps_device_time() {
    let payload = br#"{
        "timestamp": "2024-05-01T14:30:05+02:00",
        "temperature_c": 23.25,
        "humidity_pct": 41,
        "aqi_proxy": 87.5,
        "firmware": "1.2.0"
    }"#;
    let sample = Sample::decode(payload, receipt_time()).unwrap();

    assert_eq!(sample.timestamp, "2024-05-01T12:30:05.000Z");
    assert_eq!(sample.temperature_c, Some(23.25));
    assert_eq!(sample.humidity_pct, Some(41.0));
    assert_eq!(sample.aqi_proxy, Some(87.5));
}

#[test]
fn test_decode_naive_timestamp_is_utc() {
    let payload = br#"{"timestamp": "2024-05-01T08:15:00.250", "aqi_proxy": 12}"#;
    let sample = Sample::decode(payload, receipt_time()).unwrap();

    assert_eq!(sample.timestamp, "2024-05-01T08:15:00.250Z");
}

#[test]
fn test_decode_bad_timestamp_uses_receipt_time() {
    for payload in [
        r#"{"timestamp": "yesterday", "humidity_pct": 50.0}"#,
        r#"{"timestamp": 1714564800, "humidity_pct": 50.0}"#,
        r#"{"timestamp": null, "humidity_pct": 50.0}"#,
        r#"{"timestamp": "", "humidity_pct": 50.0}"#,
    ] {
        let sample = Sample::decode(payload.as_bytes(), receipt_time()).unwrap();
        assert_eq!(sample.timestamp, "2024-05-01T12:00:00.000Z");
        assert_eq!(sample.humidity_pct, Some(50.0));
    }
}

#[test]
fn test_decode_non_numeric_readings_are_missing() {
    let payload = br#"{"temperature_c": "warm", "humidity_pct": null, "aqi_proxy": [1]}"#;
    let sample = Sample::decode(payload, receipt_time()).unwrap();

    assert_eq!(sample.temperature_c, None);
    assert_eq!(sample.humidity_pct, None);
    assert_eq!(sample.aqi_proxy, None);
}

#[test]
fn test_decode_rejects_malformed_payloads() {
    assert!(matches!(
        Sample::decode(b"not valid json", receipt_time()),
        Err(DecodeError::Json(_))
    ));
    assert!(matches!(
        Sample::decode(&[0x7b, 0xff, 0xfe, 0x7d], receipt_time()),
        Err(DecodeError::Encoding(_))
    ));
    assert!(matches!(
        Sample::decode(b"[21.5, 40]", receipt_time()),
        Err(DecodeError::NotAnObject)
    ));
}

#[test]
fn test_sample_time() {
    assert_eq!(Sample::at(receipt_time()).time(), Some(receipt_time()));

    let broken = Sample {
        timestamp: "not a time".into(),
        ..Default::default()
    };
    assert_eq!(broken.time(), None);
}

#[test]
fn test_sample_json_keeps_utc_timestamp() {
    let sample = Sample::decode(br#"{"temperature_c": 19.0}"#, receipt_time()).unwrap();

    let json = serde_json::to_value(&sample).unwrap();
    assert_eq!(json["timestamp"], "2024-05-01T12:00:00.000Z");
    assert_eq!(json["humidity_pct"], Value::Null);

    let restored: Sample = serde_json::from_value(json).unwrap();
    assert_eq!(restored, sample);
    assert_eq!(restored.time(), Some(receipt_time()));
}
