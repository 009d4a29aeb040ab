//! Snapshot types - the persisted contract between the monitor and readers.
//!
//! The monitor writes these as whole-file JSON replacements; the HTTP front
//! end and the operator CLI only ever read them. No reader can observe a
//! partial write.

use std::collections::BTreeMap;

use crate::{DeviceRecord, Event, LivenessStatus, SchemaVersion, SensorSummary};

/// The persisted event history plus per-device summaries.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventLogSnapshot {
    /// Schema version for forward compatibility.
    #[cfg_attr(feature = "serde", serde(default))]
    pub version: SchemaVersion,

    /// Bounded event sequence, oldest first.
    pub events: Vec<Event>,

    /// Rolling summary per device, keyed by device id.
    pub sensors: BTreeMap<String, SensorSummary>,
}

impl EventLogSnapshot {
    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when no events are stored.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Hour-bucketed status history per device.
///
/// Bucket keys are ISO-8601 hour floors in UTC (e.g. `2026-08-31T14:00:00Z`);
/// values are the last status written within that hour.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimelineSnapshot {
    /// Schema version for forward compatibility.
    #[cfg_attr(feature = "serde", serde(default))]
    pub version: SchemaVersion,

    /// device id -> (ISO hour bucket -> status).
    pub devices: BTreeMap<String, BTreeMap<String, LivenessStatus>>,
}

impl TimelineSnapshot {
    /// Number of devices with at least one bucket.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True when no device has any buckets.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Latest reading-derived record per device, with liveness status attached.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadingsSnapshot {
    /// Schema version for forward compatibility.
    #[cfg_attr(feature = "serde", serde(default))]
    pub version: SchemaVersion,

    /// device id -> latest record.
    pub devices: BTreeMap<String, DeviceRecord>,
}

impl ReadingsSnapshot {
    /// Number of devices with a known reading.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True when no device has reported yet.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshots_are_empty_and_current() {
        let events = EventLogSnapshot::default();
        assert!(events.is_empty());
        assert!(events.version.is_compatible());

        let timeline = TimelineSnapshot::default();
        assert!(timeline.is_empty());

        let readings = ReadingsSnapshot::default();
        assert!(readings.is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn event_log_snapshot_shape() {
        use crate::{Event, EventDetails, EventKind, SensorSummary};
        use chrono::Utc;

        let mut snapshot = EventLogSnapshot::default();
        snapshot.events.push(Event::device(
            EventKind::Startup,
            "tank-01",
            Utc::now(),
            EventDetails::default(),
        ));
        snapshot
            .sensors
            .insert("tank-01".into(), SensorSummary::new(Utc::now()));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["events"].is_array());
        assert!(json["sensors"]["tank-01"].is_object());
        assert_eq!(json["version"]["major"], crate::SCHEMA_VERSION);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn timeline_snapshot_roundtrip() {
        let mut snapshot = TimelineSnapshot::default();
        snapshot.devices.entry("tank-01".into()).or_default().insert(
            "2026-08-31T14:00:00Z".into(),
            LivenessStatus::Online,
        );

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: TimelineSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, parsed);
        assert_eq!(
            parsed.devices["tank-01"]["2026-08-31T14:00:00Z"],
            LivenessStatus::Online
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn snapshot_missing_version_defaults_to_current() {
        let parsed: EventLogSnapshot =
            serde_json::from_str(r#"{ "events": [], "sensors": {} }"#).unwrap();
        assert!(parsed.version.is_compatible());
    }
}
