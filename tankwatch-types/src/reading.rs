//! Decoded telemetry readings and the current-reading snapshot entry.

use chrono::{DateTime, Utc};

use crate::LivenessStatus;

/// One decoded telemetry sample from a sensor.
///
/// A reading is immutable once created; the next reading for the same device
/// supersedes it, nothing ever mutates it in place. `received_at` is assigned
/// by the monitor when the message arrives, not taken from the sensor - field
/// clocks are not trusted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    /// Stable external identifier of the reporting device.
    pub device_id: String,

    /// Monitor-assigned arrival timestamp.
    pub received_at: DateTime<Utc>,

    /// Measured water depth.
    pub depth: f64,

    /// Unit of the depth value (e.g. "in", "cm").
    pub depth_unit: String,

    /// Battery level normalized to 0-100, when the sensor reported one.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub battery: Option<f64>,

    /// Ambient temperature, when the sensor reported one.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub temperature: Option<f64>,

    /// The raw payload as received, retained for diagnostics.
    pub raw_payload: serde_json::Value,
}

impl Reading {
    /// Create a reading with just the required fields.
    pub fn new(
        device_id: impl Into<String>,
        received_at: DateTime<Utc>,
        depth: f64,
        depth_unit: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            received_at,
            depth,
            depth_unit: depth_unit.into(),
            battery: None,
            temperature: None,
            raw_payload: serde_json::Value::Null,
        }
    }
}

/// Latest known state of one device, as published in the readings snapshot.
///
/// This is a `Reading` joined with the liveness classification the monitor
/// held when the snapshot was written. `status_changed_at` is the time of the
/// most recent status transition, kept in sync with the state machine.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceRecord {
    /// The most recent decoded reading.
    pub reading: Reading,

    /// Liveness classification at snapshot time.
    pub status: LivenessStatus,

    /// When the device last changed status.
    pub status_changed_at: DateTime<Utc>,
}

impl DeviceRecord {
    /// Pair a reading with its current classification.
    pub fn new(reading: Reading, status: LivenessStatus, status_changed_at: DateTime<Utc>) -> Self {
        Self {
            reading,
            status,
            status_changed_at,
        }
    }
}
