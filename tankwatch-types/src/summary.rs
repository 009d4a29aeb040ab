//! Per-device rolling summaries derived from the event log.

use chrono::{DateTime, Utc};

use crate::{LivenessStatus, Reading};

/// Derived, per-device summary, rebuilt incrementally as events append.
///
/// A summary is created on the first event referencing a previously unseen
/// device, updated on every subsequent event for that device, and never
/// deleted - it is a historical record even for devices that stop existing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorSummary {
    /// Timestamp of the first event referencing this device.
    pub first_seen: DateTime<Utc>,

    /// When the device last transitioned to online.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_online_at: Option<DateTime<Utc>>,

    /// When the device last transitioned to offline.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_offline_at: Option<DateTime<Utc>>,

    /// When the device last transitioned to stale.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_stale_at: Option<DateTime<Utc>>,

    /// The most recent decoded reading, when one has arrived.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_reading: Option<Reading>,

    /// How many times the device has gone offline.
    pub total_offline_events: u64,

    /// How many times the device has gone stale.
    pub total_stale_events: u64,

    /// Status as of the most recent event.
    pub current_status: LivenessStatus,
}

impl SensorSummary {
    /// A fresh summary for a device first referenced at `first_seen`.
    pub fn new(first_seen: DateTime<Utc>) -> Self {
        Self {
            first_seen,
            last_online_at: None,
            last_offline_at: None,
            last_stale_at: None,
            last_reading: None,
            total_offline_events: 0,
            total_stale_events: 0,
            current_status: LivenessStatus::Unknown,
        }
    }

    /// The later of the last offline and last stale transitions.
    ///
    /// This is the outage start used for duration accounting when the device
    /// comes back online.
    pub fn last_down_at(&self) -> Option<DateTime<Utc>> {
        match (self.last_offline_at, self.last_stale_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }
}
