//! Read-side access to the monitor's snapshot files.
//!
//! The CLI never talks to the broker or mutates state; it reads whatever the
//! monitor last wrote. Because the monitor replaces files atomically, a read
//! here either sees a complete snapshot or no file at all.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;

use tankwatch_types::{EventLogSnapshot, ReadingsSnapshot, TimelineSnapshot};

/// Synchronous reader over a monitor state directory.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    dir: PathBuf,
}

impl SnapshotReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The persisted event log, or `None` when the monitor has not yet
    /// written one.
    pub fn events(&self) -> anyhow::Result<Option<EventLogSnapshot>> {
        self.read("events.json")
    }

    /// The persisted uptime timeline.
    pub fn timeline(&self) -> anyhow::Result<Option<TimelineSnapshot>> {
        self.read("timeline.json")
    }

    /// The persisted current readings.
    pub fn readings(&self) -> anyhow::Result<Option<ReadingsSnapshot>> {
        self.read("readings.json")
    }

    fn read<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        let path = self.dir.join(name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };
        let value = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(value))
    }
}

/// Shared "no data yet" message for the read-only commands.
pub fn no_snapshot_hint(dir: &Path) -> String {
    format!(
        "no snapshot found in {} - is the monitor running?",
        dir.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_directory_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let reader = SnapshotReader::new(dir.path());
        assert!(reader.events().unwrap().is_none());
        assert!(reader.timeline().unwrap().is_none());
        assert!(reader.readings().unwrap().is_none());
    }

    #[test]
    fn reads_back_what_the_store_writes() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = EventLogSnapshot::default();
        std::fs::write(
            dir.path().join("events.json"),
            serde_json::to_vec(&snapshot).unwrap(),
        )
        .unwrap();

        let reader = SnapshotReader::new(dir.path());
        assert_eq!(reader.events().unwrap().unwrap(), snapshot);
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("timeline.json"), b"{").unwrap();

        let reader = SnapshotReader::new(dir.path());
        assert!(reader.timeline().is_err());
    }
}
