//! Device connectivity status derived from message recency.

use core::fmt;

/// Classified connectivity of a monitored sensor.
///
/// The monitor derives this from how recently a device reported, compared
/// against the stale and offline thresholds. `Unknown` means the device has
/// never been seen since the monitor has been keeping state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LivenessStatus {
    #[default]
    Unknown,
    Online,
    Stale,
    Offline,
}

impl LivenessStatus {
    /// Lowercase label used in snapshots and operator output.
    pub fn label(&self) -> &'static str {
        match self {
            LivenessStatus::Unknown => "unknown",
            LivenessStatus::Online => "online",
            LivenessStatus::Stale => "stale",
            LivenessStatus::Offline => "offline",
        }
    }

    /// True only for `Online`; used by uptime accounting.
    pub fn is_online(&self) -> bool {
        matches!(self, LivenessStatus::Online)
    }
}

impl fmt::Display for LivenessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
