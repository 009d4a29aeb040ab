//! Events - immutable records of state transitions and notable occurrences.

use chrono::{DateTime, Utc};

/// What kind of occurrence an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EventKind {
    /// Device came (back) online after an outage.
    Online,
    /// Device crossed the offline threshold.
    Offline,
    /// Device crossed the stale threshold while nominally online.
    Stale,
    /// Device was seen for the first time.
    Startup,
    /// Monitor lifecycle event, not tied to a device.
    System,
}

impl EventKind {
    /// True for the online/offline connectivity edges.
    ///
    /// Stale and startup are informational; system events are lifecycle.
    pub fn is_transition(&self) -> bool {
        matches!(self, EventKind::Online | EventKind::Offline)
    }

    /// Lowercase label used in snapshots and operator output.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Online => "online",
            EventKind::Offline => "offline",
            EventKind::Stale => "stale",
            EventKind::Startup => "startup",
            EventKind::System => "system",
        }
    }
}

/// Structured detail payload attached to an event.
///
/// All fields are optional and omitted from serialization when absent; which
/// ones are set depends on the event kind.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventDetails {
    /// Human-readable note.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub message: Option<String>,

    /// For online events: how long the device was down, in milliseconds.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub offline_duration_ms: Option<u64>,

    /// For offline events: the battery level from the last reading.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_battery: Option<f64>,

    /// Heuristic cause hint (e.g. "battery critically low").
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub cause: Option<String>,
}

impl EventDetails {
    /// Details carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// True when no detail field is set.
    pub fn is_empty(&self) -> bool {
        self.message.is_none()
            && self.offline_duration_ms.is_none()
            && self.last_battery.is_none()
            && self.cause.is_none()
    }
}

/// An immutable record of a state transition or notable occurrence.
///
/// Events form an append-only sequence, globally ordered by timestamp. The
/// persisted log is bounded; the oldest events are dropped first.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    /// When the occurrence was detected.
    pub timestamp: DateTime<Utc>,

    /// What kind of occurrence this is.
    pub kind: EventKind,

    /// The device concerned; `None` for system events.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub device_id: Option<String>,

    /// Structured detail payload.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "EventDetails::is_empty"))]
    pub details: EventDetails,
}

impl Event {
    /// An event concerning a specific device.
    pub fn device(
        kind: EventKind,
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        details: EventDetails,
    ) -> Self {
        Self {
            timestamp,
            kind,
            device_id: Some(device_id.into()),
            details,
        }
    }

    /// A monitor lifecycle event with a message and no device.
    pub fn system(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            kind: EventKind::System,
            device_id: None,
            details: EventDetails::message(message),
        }
    }
}
