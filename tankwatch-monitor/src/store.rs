//! Snapshot persistence.
//!
//! The monitor owns three snapshot files and replaces each atomically:
//! serialize to a sibling temp file, then rename over the target. Readers
//! (the CLI, an HTTP front end) only ever see a complete file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use tankwatch_types::{EventLogSnapshot, ReadingsSnapshot, TimelineSnapshot};

/// Why a load or save failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The persistence seam between the monitor and its storage.
///
/// Loads return `Ok(None)` when no snapshot exists yet; that is the normal
/// first-run case, not an error.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_events(&self) -> Result<Option<EventLogSnapshot>, PersistenceError>;
    async fn save_events(&self, snapshot: &EventLogSnapshot) -> Result<(), PersistenceError>;

    async fn load_timeline(&self) -> Result<Option<TimelineSnapshot>, PersistenceError>;
    async fn save_timeline(&self, snapshot: &TimelineSnapshot) -> Result<(), PersistenceError>;

    async fn load_readings(&self) -> Result<Option<ReadingsSnapshot>, PersistenceError>;
    async fn save_readings(&self, snapshot: &ReadingsSnapshot) -> Result<(), PersistenceError>;
}

/// File names within the state directory.
const EVENTS_FILE: &str = "events.json";
const TIMELINE_FILE: &str = "timeline.json";
const READINGS_FILE: &str = "readings.json";

/// Snapshot store writing pretty-printed JSON files under one directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at `dir`. The directory is created on first
    /// save, not here.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The state directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn load<T>(&self, name: &str) -> Result<Option<T>, PersistenceError>
    where
        T: serde::de::DeserializeOwned,
    {
        let path = self.dir.join(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn save<T>(&self, name: &str, value: &T) -> Result<(), PersistenceError>
    where
        T: serde::Serialize,
    {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        let json = serde_json::to_vec_pretty(value)?;

        tokio::fs::write(&tmp, &json).await?;
        // Rename within the same directory is atomic; readers never see a
        // partial file.
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), bytes = json.len(), "snapshot written");
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load_events(&self) -> Result<Option<EventLogSnapshot>, PersistenceError> {
        self.load(EVENTS_FILE).await
    }

    async fn save_events(&self, snapshot: &EventLogSnapshot) -> Result<(), PersistenceError> {
        self.save(EVENTS_FILE, snapshot).await
    }

    async fn load_timeline(&self) -> Result<Option<TimelineSnapshot>, PersistenceError> {
        self.load(TIMELINE_FILE).await
    }

    async fn save_timeline(&self, snapshot: &TimelineSnapshot) -> Result<(), PersistenceError> {
        self.save(TIMELINE_FILE, snapshot).await
    }

    async fn load_readings(&self) -> Result<Option<ReadingsSnapshot>, PersistenceError> {
        self.load(READINGS_FILE).await
    }

    async fn save_readings(&self, snapshot: &ReadingsSnapshot) -> Result<(), PersistenceError> {
        self.save(READINGS_FILE, snapshot).await
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: parking_lot::Mutex<Option<EventLogSnapshot>>,
    timeline: parking_lot::Mutex<Option<TimelineSnapshot>>,
    readings: parking_lot::Mutex<Option<ReadingsSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_events(&self) -> Result<Option<EventLogSnapshot>, PersistenceError> {
        Ok(self.events.lock().clone())
    }

    async fn save_events(&self, snapshot: &EventLogSnapshot) -> Result<(), PersistenceError> {
        *self.events.lock() = Some(snapshot.clone());
        Ok(())
    }

    async fn load_timeline(&self) -> Result<Option<TimelineSnapshot>, PersistenceError> {
        Ok(self.timeline.lock().clone())
    }

    async fn save_timeline(&self, snapshot: &TimelineSnapshot) -> Result<(), PersistenceError> {
        *self.timeline.lock() = Some(snapshot.clone());
        Ok(())
    }

    async fn load_readings(&self) -> Result<Option<ReadingsSnapshot>, PersistenceError> {
        Ok(self.readings.lock().clone())
    }

    async fn save_readings(&self, snapshot: &ReadingsSnapshot) -> Result<(), PersistenceError> {
        *self.readings.lock() = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tankwatch_types::{Event, EventKind, EventDetails};

    #[tokio::test]
    async fn missing_files_load_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        assert!(store.load_events().await.unwrap().is_none());
        assert!(store.load_timeline().await.unwrap().is_none());
        assert!(store.load_readings().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        let mut snapshot = EventLogSnapshot::default();
        snapshot.events.push(Event::device(
            EventKind::Startup,
            "tank-01",
            Utc::now(),
            EventDetails::default(),
        ));

        store.save_events(&snapshot).await.unwrap();
        let loaded = store.load_events().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn save_creates_the_state_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("state").join("tankwatch");
        let store = JsonFileStore::new(&nested);

        store
            .save_timeline(&TimelineSnapshot::default())
            .await
            .unwrap();
        assert!(nested.join("timeline.json").exists());
    }

    #[tokio::test]
    async fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store
            .save_readings(&ReadingsSnapshot::default())
            .await
            .unwrap();
        assert!(dir.path().join("readings.json").exists());
        assert!(!dir.path().join("readings.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_not_none() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("events.json"), b"{ truncated")
            .await
            .unwrap();

        let store = JsonFileStore::new(dir.path());
        assert!(matches!(
            store.load_events().await,
            Err(PersistenceError::Serde(_))
        ));
    }

    #[tokio::test]
    async fn memory_store_roundtrips() {
        let store = MemoryStore::new();
        assert!(store.load_events().await.unwrap().is_none());

        store.save_events(&EventLogSnapshot::default()).await.unwrap();
        assert!(store.load_events().await.unwrap().is_some());
    }
}
