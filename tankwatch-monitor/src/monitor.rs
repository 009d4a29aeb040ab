//! The orchestrator tying transport, decoding, liveness, and persistence
//! together.
//!
//! All state mutation funnels through one run loop: inbound messages, sweep
//! ticks, and shutdown are arms of a single `select!`, so a sweep never
//! races a message for the same device, and every persisted snapshot
//! reflects a consistent point in time.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tankwatch_broker::{
    CredentialProvider, RawMessage, SessionConfig, TelemetryDecoder, TransportSession,
};
use tankwatch_types::{DeviceRecord, Event, EventDetails, EventKind, LivenessStatus, Reading};

use crate::events::{EventFilter, EventLog, MAX_EVENTS};
use crate::liveness::{LivenessRecord, LivenessThresholds, LivenessTracker, Transition};
use crate::store::{MemoryStore, StateStore};
use crate::timeline::{Timeline, UptimeStats, DEFAULT_RETENTION_HOURS};

/// Battery level at or below which an offline event gets a cause hint.
const LOW_BATTERY_CUTOFF: f64 = 25.0;
const LOW_BATTERY_CAUSE: &str = "battery critically low";

/// Everything the run loop mutates, guarded by one lock.
struct MonitorState {
    tracker: LivenessTracker,
    event_log: EventLog,
    timeline: Timeline,
    readings: BTreeMap<String, DeviceRecord>,
}

/// The liveness monitor core.
///
/// Owns the state machine, event log, timeline, and current readings, and
/// knows how to load them from and persist them to a [`StateStore`]. The
/// transport session is attached by [`start`](Self::start).
pub struct Monitor {
    sweep_interval: Duration,
    max_events: usize,
    retention_hours: i64,
    store: Arc<dyn StateStore>,
    state: Mutex<MonitorState>,
}

impl Monitor {
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::default()
    }

    /// Restore state from the store's snapshots.
    ///
    /// Missing snapshots are the normal first run; each present snapshot
    /// seeds its component, and the readings snapshot additionally seeds the
    /// state machine so silence accounting resumes where it left off.
    pub async fn load(&self) -> Result<(), crate::PersistenceError> {
        let events = self.store.load_events().await?;
        let timeline = self.store.load_timeline().await?;
        let readings = self.store.load_readings().await?;

        let mut state = self.state.lock();

        if let Some(snapshot) = events {
            info!(events = snapshot.len(), "restored event log");
            state.event_log = EventLog::restore(snapshot, self.max_events);
        }
        if let Some(snapshot) = timeline {
            info!(devices = snapshot.len(), "restored uptime timeline");
            state.timeline = Timeline::restore(snapshot, self.retention_hours);
        }
        if let Some(snapshot) = readings {
            info!(devices = snapshot.len(), "restored device readings");
            for (device_id, record) in &snapshot.devices {
                state.tracker.restore(
                    device_id.clone(),
                    LivenessRecord {
                        last_seen_at: record.reading.received_at,
                        last_reading: Some(record.reading.clone()),
                        status: record.status,
                        status_changed_at: record.status_changed_at,
                    },
                );
            }
            state.readings = snapshot.devices;
        }

        Ok(())
    }

    /// Decode and apply one raw message. Returns true when the message
    /// produced a reading; undecodable messages are dropped without touching
    /// any device state.
    pub fn apply_message(
        &self,
        decoder: &TelemetryDecoder,
        raw: &RawMessage,
        now: DateTime<Utc>,
    ) -> bool {
        match decoder.decode(&raw.topic, &raw.payload, now) {
            Ok(reading) => {
                self.apply_reading(reading, now);
                true
            }
            Err(e) => {
                warn!(topic = %raw.topic, error = %e, "dropping undecodable message");
                false
            }
        }
    }

    /// Apply one decoded reading: advance the state machine, log any
    /// transition, and refresh the timeline and current-reading record.
    pub fn apply_reading(&self, reading: Reading, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        let device_id = reading.device_id.clone();

        state.event_log.note_reading(&reading);
        let transition = state.tracker.observe(reading.clone(), now);

        if let Some(transition) = &transition {
            let kind = if transition.is_startup() {
                EventKind::Startup
            } else {
                EventKind::Online
            };
            info!(device_id = %device_id, status = %transition.to, "device transition");
            state
                .event_log
                .append(Event::device(kind, &device_id, now, EventDetails::default()));
        } else {
            debug!(device_id = %device_id, depth = reading.depth, "reading");
        }

        state.timeline.record(&device_id, LivenessStatus::Online, now);

        let status_changed_at = state
            .tracker
            .record(&device_id)
            .map(|r| r.status_changed_at)
            .unwrap_or(now);
        state.readings.insert(
            device_id,
            DeviceRecord::new(reading, LivenessStatus::Online, status_changed_at),
        );
    }

    /// Run one sweep pass over every tracked device. Returns how many
    /// devices changed status.
    pub fn apply_sweep(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock();
        let transitions = state.tracker.sweep(now);

        for transition in &transitions {
            let Transition {
                device_id,
                to,
                last_battery,
                ..
            } = transition;

            let kind = match to {
                LivenessStatus::Offline => EventKind::Offline,
                _ => EventKind::Stale,
            };

            let mut details = EventDetails::default();
            if kind == EventKind::Offline {
                details.last_battery = *last_battery;
                if matches!(last_battery, Some(b) if *b <= LOW_BATTERY_CUTOFF) {
                    details.cause = Some(LOW_BATTERY_CAUSE.to_string());
                }
            }

            warn!(device_id = %device_id, status = %to, "device transition");
            state
                .event_log
                .append(Event::device(kind, device_id, now, details));
            state.timeline.record(device_id, *to, now);

            if let Some(record) = state.readings.get_mut(device_id) {
                record.status = *to;
                record.status_changed_at = now;
            }
        }

        transitions.len()
    }

    /// Append a monitor lifecycle event.
    pub fn record_system_event(&self, message: &str, now: DateTime<Utc>) {
        self.state.lock().event_log.append(Event::system(message, now));
    }

    /// Write all three snapshots. Failures are logged and swallowed; the
    /// monitor keeps running on its in-memory state and retries on the next
    /// persistence point.
    pub async fn persist(&self) {
        let (events, timeline, readings) = {
            let state = self.state.lock();
            let readings = crate::ReadingsSnapshot {
                version: Default::default(),
                devices: state.readings.clone(),
            };
            (state.event_log.snapshot(), state.timeline.snapshot(), readings)
        };

        if let Err(e) = self.store.save_events(&events).await {
            warn!(error = %e, "failed to persist event log");
        }
        if let Err(e) = self.store.save_timeline(&timeline).await {
            warn!(error = %e, "failed to persist timeline");
        }
        if let Err(e) = self.store.save_readings(&readings).await {
            warn!(error = %e, "failed to persist readings");
        }
    }

    /// Current liveness classification of a device.
    pub fn status(&self, device_id: &str) -> LivenessStatus {
        self.state.lock().tracker.status(device_id)
    }

    /// Events matching a filter, oldest first.
    pub fn events(&self, filter: &EventFilter) -> Vec<Event> {
        self.state.lock().event_log.query(filter)
    }

    /// Uptime over the retained timeline window.
    pub fn uptime_stats(&self, device_id: &str) -> Option<UptimeStats> {
        self.state.lock().timeline.uptime_stats(device_id)
    }

    /// The latest reading-derived record for a device.
    pub fn device_record(&self, device_id: &str) -> Option<DeviceRecord> {
        self.state.lock().readings.get(device_id).cloned()
    }

    /// Attach the transport and start the run loop.
    ///
    /// Restores persisted state first, then serves until the handle's
    /// [`shutdown`](MonitorHandle::shutdown) is called. State is persisted
    /// one final time on the way out.
    pub fn start(
        self: Arc<Self>,
        session_config: SessionConfig,
        credentials: Arc<CredentialProvider>,
    ) -> MonitorHandle {
        let shutdown = CancellationToken::new();
        let task_shutdown = shutdown.clone();

        let join = tokio::spawn(async move {
            run_monitor(self, session_config, credentials, task_shutdown).await;
        });

        MonitorHandle { join, shutdown }
    }
}

async fn run_monitor(
    monitor: Arc<Monitor>,
    session_config: SessionConfig,
    credentials: Arc<CredentialProvider>,
    shutdown: CancellationToken,
) {
    if let Err(e) = monitor.load().await {
        warn!(error = %e, "snapshot restore failed; starting with empty state");
    }

    monitor.record_system_event("listener started", Utc::now());
    monitor.persist().await;

    let decoder = TelemetryDecoder::new(&session_config.namespace);
    let (session, mut messages) = TransportSession::spawn(session_config, credentials);

    let mut sweep = tokio::time::interval(monitor.sweep_interval);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // Skip the immediate first tick; devices get their full silence
    // allowance before the first evaluation.
    sweep.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            message = messages.recv() => match message {
                Some(raw) => {
                    if monitor.apply_message(&decoder, &raw, Utc::now()) {
                        monitor.persist().await;
                    }
                }
                None => {
                    warn!("transport channel closed; stopping monitor");
                    break;
                }
            },

            _ = sweep.tick() => {
                let changed = monitor.apply_sweep(Utc::now());
                if changed > 0 {
                    info!(transitions = changed, "sweep detected transitions");
                    monitor.persist().await;
                }
            }
        }
    }

    monitor.record_system_event("listener stopped", Utc::now());
    monitor.persist().await;
    session.stop().await;
    info!("monitor stopped");
}

/// Handle to the running monitor task.
pub struct MonitorHandle {
    join: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl MonitorHandle {
    /// Request shutdown and wait for the final snapshot write.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.join.await;
    }
}

/// Builder for [`Monitor`]. Defaults match the shipped configuration.
pub struct MonitorBuilder {
    thresholds: LivenessThresholds,
    sweep_interval: Duration,
    retention_hours: i64,
    max_events: usize,
    store: Option<Arc<dyn StateStore>>,
}

impl Default for MonitorBuilder {
    fn default() -> Self {
        Self {
            thresholds: LivenessThresholds::default(),
            sweep_interval: Duration::from_secs(10 * 60),
            retention_hours: DEFAULT_RETENTION_HOURS,
            max_events: MAX_EVENTS,
            store: None,
        }
    }
}

impl MonitorBuilder {
    pub fn thresholds(mut self, thresholds: LivenessThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn retention_hours(mut self, hours: i64) -> Self {
        self.retention_hours = hours;
        self
    }

    pub fn max_events(mut self, max: usize) -> Self {
        self.max_events = max;
        self
    }

    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the monitor. Without an explicit store, state lives in memory
    /// only.
    pub fn build(self) -> Monitor {
        Monitor {
            sweep_interval: self.sweep_interval,
            max_events: self.max_events,
            retention_hours: self.retention_hours,
            store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            state: Mutex::new(MonitorState {
                tracker: LivenessTracker::new(self.thresholds),
                event_log: EventLog::new(self.max_events),
                timeline: Timeline::new(self.retention_hours),
                readings: BTreeMap::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn minutes(m: i64) -> chrono::Duration {
        chrono::Duration::minutes(m)
    }

    fn monitor() -> Monitor {
        Monitor::builder().build()
    }

    fn raw(topic: &str, payload: &str) -> RawMessage {
        RawMessage {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[test]
    fn first_message_produces_startup_and_online_state() {
        let monitor = monitor();
        let decoder = TelemetryDecoder::new("tanks");

        let applied = monitor.apply_message(
            &decoder,
            &raw("tanks/tank-01/report", r#"{ "depth": 22.0, "battery": 90 }"#),
            t0(),
        );

        assert!(applied);
        assert_eq!(monitor.status("tank-01"), LivenessStatus::Online);

        let events = monitor.events(&EventFilter::new());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Startup);

        let record = monitor.device_record("tank-01").unwrap();
        assert_eq!(record.reading.depth, 22.0);
        assert_eq!(record.status, LivenessStatus::Online);
    }

    #[test]
    fn undecodable_message_leaves_state_untouched() {
        let monitor = monitor();
        let decoder = TelemetryDecoder::new("tanks");

        let applied = monitor.apply_message(
            &decoder,
            &raw("tanks/tank-01/report", "not json"),
            t0(),
        );

        assert!(!applied);
        assert_eq!(monitor.status("tank-01"), LivenessStatus::Unknown);
        assert!(monitor.events(&EventFilter::new()).is_empty());
    }

    #[test]
    fn silence_walks_through_stale_to_offline_and_back() {
        let monitor = monitor();
        let mut reading = Reading::new("tank-01", t0(), 20.0, "in");
        reading.battery = Some(80.0);
        monitor.apply_reading(reading, t0());

        // 31 minutes silent: stale.
        assert_eq!(monitor.apply_sweep(t0() + minutes(31)), 1);
        assert_eq!(monitor.status("tank-01"), LivenessStatus::Stale);

        // 121 minutes silent: offline, carrying the last battery level.
        assert_eq!(monitor.apply_sweep(t0() + minutes(121)), 1);
        assert_eq!(monitor.status("tank-01"), LivenessStatus::Offline);

        let offline = monitor.events(&EventFilter::new().kind(EventKind::Offline));
        assert_eq!(offline[0].details.last_battery, Some(80.0));
        assert!(offline[0].details.cause.is_none());

        // Device reports again: online, outage measured from the offline
        // edge.
        let back = t0() + minutes(130);
        monitor.apply_reading(Reading::new("tank-01", back, 19.0, "in"), back);
        assert_eq!(monitor.status("tank-01"), LivenessStatus::Online);

        let online = monitor.events(&EventFilter::new().kind(EventKind::Online));
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].details.offline_duration_ms, Some(9 * 60 * 1000));
    }

    #[test]
    fn long_silence_skips_stale_entirely() {
        let monitor = monitor();
        monitor.apply_reading(Reading::new("tank-01", t0(), 20.0, "in"), t0());

        assert_eq!(monitor.apply_sweep(t0() + minutes(180)), 1);
        assert_eq!(monitor.status("tank-01"), LivenessStatus::Offline);
        assert!(monitor
            .events(&EventFilter::new().kind(EventKind::Stale))
            .is_empty());
    }

    #[test]
    fn low_battery_offline_gets_a_cause_hint() {
        let monitor = monitor();
        let mut reading = Reading::new("tank-01", t0(), 20.0, "in");
        reading.battery = Some(18.0);
        monitor.apply_reading(reading, t0());

        monitor.apply_sweep(t0() + minutes(180));

        let offline = monitor.events(&EventFilter::new().kind(EventKind::Offline));
        assert_eq!(
            offline[0].details.cause.as_deref(),
            Some("battery critically low")
        );
    }

    #[test]
    fn stale_events_do_not_carry_battery_details() {
        let monitor = monitor();
        let mut reading = Reading::new("tank-01", t0(), 20.0, "in");
        reading.battery = Some(10.0);
        monitor.apply_reading(reading, t0());

        monitor.apply_sweep(t0() + minutes(31));

        let stale = monitor.events(&EventFilter::new().kind(EventKind::Stale));
        assert!(stale[0].details.last_battery.is_none());
        assert!(stale[0].details.cause.is_none());
    }

    #[test]
    fn sweep_updates_timeline_and_readings_record() {
        let monitor = monitor();
        monitor.apply_reading(Reading::new("tank-01", t0(), 20.0, "in"), t0());

        let offline_at = t0() + minutes(180);
        monitor.apply_sweep(offline_at);

        let record = monitor.device_record("tank-01").unwrap();
        assert_eq!(record.status, LivenessStatus::Offline);
        assert_eq!(record.status_changed_at, offline_at);

        let stats = monitor.uptime_stats("tank-01").unwrap();
        assert_eq!(stats.total_buckets, 2);
        assert_eq!(stats.online_buckets, 1);
        assert_eq!(stats.uptime_percent, 50.0);
    }

    #[tokio::test]
    async fn persist_and_load_roundtrip_through_a_shared_store() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());

        let first = Monitor::builder().store(store.clone()).build();
        let mut reading = Reading::new("tank-01", t0(), 20.0, "in");
        reading.battery = Some(75.0);
        first.apply_reading(reading, t0());
        first.apply_sweep(t0() + minutes(31));
        first.persist().await;

        let second = Monitor::builder().store(store).build();
        second.load().await.unwrap();

        assert_eq!(second.status("tank-01"), LivenessStatus::Stale);
        assert_eq!(second.events(&EventFilter::new()).len(), 2);
        assert_eq!(
            second.device_record("tank-01").unwrap().reading.battery,
            Some(75.0)
        );

        // Silence accounting resumes from the persisted last-seen time.
        assert_eq!(second.apply_sweep(t0() + minutes(121)), 1);
        assert_eq!(second.status("tank-01"), LivenessStatus::Offline);
    }

    #[tokio::test]
    async fn load_on_an_empty_store_is_a_clean_first_run() {
        let monitor = Monitor::builder()
            .store(Arc::new(MemoryStore::new()))
            .build();
        monitor.load().await.unwrap();
        assert!(monitor.events(&EventFilter::new()).is_empty());
    }

    #[test]
    fn steady_reporter_and_silent_neighbor_stay_independent() {
        let monitor = monitor();

        // tank-01 reports every 20 minutes for six hours; tank-02 never
        // reports at all.
        for i in 0..18 {
            let now = t0() + minutes(i * 20);
            monitor.apply_reading(Reading::new("tank-01", now, 20.0, "in"), now);
            monitor.apply_sweep(now + minutes(10));
        }

        assert_eq!(monitor.status("tank-01"), LivenessStatus::Online);
        assert_eq!(monitor.status("tank-02"), LivenessStatus::Unknown);
        assert!(monitor.device_record("tank-02").is_none());
        assert!(monitor.uptime_stats("tank-02").is_none());

        // Only the startup event; a steady reporter generates no churn.
        assert_eq!(monitor.events(&EventFilter::new()).len(), 1);
        assert_eq!(monitor.uptime_stats("tank-01").unwrap().uptime_percent, 100.0);
    }

    #[tokio::test]
    async fn shutdown_flushes_lifecycle_events_to_the_store() {
        // However the shutdown request arrives, the handle must leave a
        // persisted log with both lifecycle markers and close the transport.
        let store = Arc::new(MemoryStore::new());
        let monitor = Arc::new(
            Monitor::builder()
                .store(store.clone() as Arc<dyn StateStore>)
                .build(),
        );

        let credentials = Arc::new(
            CredentialProvider::builder()
                .token_url("http://127.0.0.1:1/token")
                .timeout(std::time::Duration::from_millis(100))
                .build(),
        );

        let handle = monitor.start(SessionConfig::default(), credentials);
        handle.shutdown().await;

        let snapshot = store.load_events().await.unwrap().unwrap();
        let messages: Vec<_> = snapshot
            .events
            .iter()
            .filter(|e| e.kind == EventKind::System)
            .filter_map(|e| e.details.message.as_deref())
            .collect();
        assert!(messages.contains(&"listener started"));
        assert!(messages.contains(&"listener stopped"));
    }

    #[test]
    fn system_events_record_lifecycle() {
        let monitor = monitor();
        monitor.record_system_event("listener started", t0());

        let events = monitor.events(&EventFilter::new().kind(EventKind::System));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details.message.as_deref(), Some("listener started"));
    }
}
