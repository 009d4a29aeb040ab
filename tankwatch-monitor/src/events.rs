//! Bounded event log with per-device rolling summaries.
//!
//! Events append in detection order; once the cap is reached the oldest
//! entries are dropped. Summaries update incrementally on append and are
//! never deleted, so a device that stops existing keeps its history.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};

use tankwatch_types::{
    Event, EventKind, EventLogSnapshot, LivenessStatus, Reading, SensorSummary,
};

/// Maximum number of retained events.
pub const MAX_EVENTS: usize = 500;

/// The in-memory event history plus derived summaries.
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<Event>,
    sensors: BTreeMap<String, SensorSummary>,
    max_events: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(MAX_EVENTS)
    }
}

impl EventLog {
    /// Create an empty log bounded at `max_events`.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(MAX_EVENTS)),
            sensors: BTreeMap::new(),
            max_events,
        }
    }

    /// Append an event, updating the concerned device's summary.
    ///
    /// For online events with no explicit outage duration, the duration is
    /// derived from the summary's most recent offline or stale transition
    /// before the summary is updated.
    pub fn append(&mut self, mut event: Event) {
        if let Some(device_id) = event.device_id.clone() {
            let summary = self
                .sensors
                .entry(device_id)
                .or_insert_with(|| SensorSummary::new(event.timestamp));

            if event.kind == EventKind::Online && event.details.offline_duration_ms.is_none() {
                if let Some(down_at) = summary.last_down_at() {
                    let down_ms = (event.timestamp - down_at).num_milliseconds().max(0);
                    event.details.offline_duration_ms = Some(down_ms as u64);
                }
            }

            match event.kind {
                EventKind::Online | EventKind::Startup => {
                    summary.last_online_at = Some(event.timestamp);
                    summary.current_status = LivenessStatus::Online;
                }
                EventKind::Offline => {
                    summary.last_offline_at = Some(event.timestamp);
                    summary.total_offline_events += 1;
                    summary.current_status = LivenessStatus::Offline;
                }
                EventKind::Stale => {
                    summary.last_stale_at = Some(event.timestamp);
                    summary.total_stale_events += 1;
                    summary.current_status = LivenessStatus::Stale;
                }
                EventKind::System => {}
            }
        }

        self.events.push_back(event);
        while self.events.len() > self.max_events {
            self.events.pop_front();
        }
    }

    /// Record the latest reading on the device's summary without emitting an
    /// event. Creates the summary if the device is new.
    pub fn note_reading(&mut self, reading: &Reading) {
        let summary = self
            .sensors
            .entry(reading.device_id.clone())
            .or_insert_with(|| SensorSummary::new(reading.received_at));
        summary.last_reading = Some(reading.clone());
    }

    /// The summary for a device, if any event or reading has referenced it.
    pub fn summary(&self, device_id: &str) -> Option<&SensorSummary> {
        self.sensors.get(device_id)
    }

    /// All summaries, keyed by device id.
    pub fn summaries(&self) -> &BTreeMap<String, SensorSummary> {
        &self.sensors
    }

    /// Events matching a filter, oldest first. A limit keeps the most recent
    /// matches.
    pub fn query(&self, filter: &EventFilter) -> Vec<Event> {
        let matches: Vec<&Event> = self
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .collect();

        let skip = match filter.limit {
            Some(limit) if matches.len() > limit => matches.len() - limit,
            _ => 0,
        };

        matches.into_iter().skip(skip).cloned().collect()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when no events are stored.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Timestamp of the newest stored event, if any.
    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        self.events.back().map(|e| e.timestamp)
    }

    /// Copy the log into its persisted form.
    pub fn snapshot(&self) -> EventLogSnapshot {
        EventLogSnapshot {
            version: Default::default(),
            events: self.events.iter().cloned().collect(),
            sensors: self.sensors.clone(),
        }
    }

    /// Rebuild a log from a persisted snapshot. Events beyond the cap are
    /// trimmed oldest-first.
    pub fn restore(snapshot: EventLogSnapshot, max_events: usize) -> Self {
        let mut events: VecDeque<Event> = snapshot.events.into();
        while events.len() > max_events {
            events.pop_front();
        }
        Self {
            events,
            sensors: snapshot.sensors,
            max_events,
        }
    }
}

/// Criteria for querying the event log. All unset criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    device_id: Option<String>,
    kind: Option<EventKind>,
    transitions_only: bool,
    limit: Option<usize>,
}

impl EventFilter {
    /// Match everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only events for this device.
    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Only events of this kind.
    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Only online/offline connectivity edges.
    pub fn transitions_only(mut self) -> Self {
        self.transitions_only = true;
        self
    }

    /// Keep only the most recent `limit` matches.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, event: &Event) -> bool {
        if let Some(device_id) = &self.device_id {
            if event.device_id.as_deref() != Some(device_id.as_str()) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if event.kind != kind {
                return false;
            }
        }
        if self.transitions_only && !event.kind.is_transition() {
            return false;
        }
        true
    }
}
