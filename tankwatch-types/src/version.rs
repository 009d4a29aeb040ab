//! Schema versioning for the persisted snapshot files.

use crate::SCHEMA_VERSION;

/// Schema version embedded in every snapshot.
///
/// Snapshot files outlive monitor restarts and upgrades; readers check this
/// to detect and handle format changes gracefully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchemaVersion {
    /// Major version - breaking changes increment this.
    pub major: u32,

    /// Minor version - backwards-compatible additions increment this.
    pub minor: u32,
}

impl SchemaVersion {
    /// Create a specific schema version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// The version written by this library.
    pub const fn current() -> Self {
        Self {
            major: SCHEMA_VERSION,
            minor: 0,
        }
    }

    /// True when a reader built against this library can consume the snapshot
    /// (major versions match; minor differences are fine).
    pub fn is_compatible(&self) -> bool {
        self.major == SCHEMA_VERSION
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_is_compatible() {
        assert!(SchemaVersion::current().is_compatible());
        assert!(SchemaVersion::default().is_compatible());
    }

    #[test]
    fn other_major_is_not() {
        assert!(!SchemaVersion::new(SCHEMA_VERSION + 1, 0).is_compatible());
    }

    #[test]
    fn minor_differences_are_fine() {
        assert!(SchemaVersion::new(SCHEMA_VERSION, 9).is_compatible());
    }
}
