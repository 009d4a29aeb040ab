//! Telemetry decoding - raw publishes into normalized readings.
//!
//! Sensors publish JSON reports on `{namespace}/{device}/report`. Field
//! firmware varies, so the decoder accepts the known aliases and normalizes
//! battery levels to 0-100. The raw payload is retained verbatim on the
//! reading for diagnostics.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use tankwatch_types::Reading;

use crate::DecodeError;

/// Unit assumed when the report does not name one.
const DEFAULT_DEPTH_UNIT: &str = "in";

/// Parses raw inbound messages into [`Reading`]s.
#[derive(Debug, Clone)]
pub struct TelemetryDecoder {
    namespace: String,
}

/// Wire shape of a sensor report. Everything except depth is optional.
#[derive(Debug, Deserialize)]
struct ReportPayload {
    #[serde(alias = "level")]
    depth: Option<f64>,
    #[serde(alias = "depth_unit")]
    unit: Option<String>,
    #[serde(alias = "battery_level")]
    battery: Option<f64>,
    #[serde(alias = "temp")]
    temperature: Option<f64>,
}

impl TelemetryDecoder {
    /// Create a decoder scoped to one installation namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Decode one raw publish into a reading.
    ///
    /// `received_at` is assigned by the caller at arrival time; sensor-side
    /// clocks are never trusted. Any failure leaves liveness state for the
    /// device untouched - the caller drops the message.
    pub fn decode(
        &self,
        topic: &str,
        payload: &[u8],
        received_at: DateTime<Utc>,
    ) -> Result<Reading, DecodeError> {
        let device_id = self.device_from_topic(topic)?;

        let raw: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| DecodeError::Json(e.to_string()))?;

        let report: ReportPayload = serde_json::from_value(raw.clone())
            .map_err(|e| DecodeError::Json(e.to_string()))?;

        let depth = report.depth.ok_or(DecodeError::MissingDepth)?;

        Ok(Reading {
            device_id,
            received_at,
            depth,
            depth_unit: report
                .unit
                .unwrap_or_else(|| DEFAULT_DEPTH_UNIT.to_string()),
            battery: report.battery.map(normalize_battery),
            temperature: report.temperature,
            raw_payload: raw,
        })
    }

    /// Extract the device id from a `{namespace}/{device}/report` topic.
    fn device_from_topic(&self, topic: &str) -> Result<String, DecodeError> {
        let mut parts = topic.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(ns), Some(device), Some("report"), None)
                if ns == self.namespace && !device.is_empty() =>
            {
                Ok(device.to_string())
            }
            _ => Err(DecodeError::Topic(topic.to_string())),
        }
    }
}

/// Normalize a reported battery level to the 0-100 range.
///
/// Some firmware reports a 0-1 fraction, some a percentage. Values at or
/// below 1.0 are treated as fractions; everything is clamped to 0-100.
fn normalize_battery(raw: f64) -> f64 {
    let percent = if (0.0..=1.0).contains(&raw) {
        raw * 100.0
    } else {
        raw
    };
    percent.clamp(0.0, 100.0)
}
