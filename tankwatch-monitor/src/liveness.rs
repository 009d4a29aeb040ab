//! The per-device liveness state machine.
//!
//! Connectivity is a pure function of message recency against two ordered
//! thresholds, but transitions are only *detected* when a message arrives or
//! when the periodic sweep runs - the stored status can lag its true
//! derivation until the next check. Both entry points run through the same
//! transition logic here, so the ordering invariants hold no matter which
//! path fires first.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use tankwatch_types::{LivenessStatus, Reading};

/// The stale threshold must be strictly below the offline threshold.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("stale_after must be strictly less than offline_after")]
pub struct InvalidThresholds;

/// Silence thresholds for liveness classification.
///
/// Fields are private so the stale-before-offline ordering established by
/// [`new`](Self::new) cannot be bypassed with a struct literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessThresholds {
    stale_after: Duration,
    offline_after: Duration,
}

impl Default for LivenessThresholds {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30 * 60),
            offline_after: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl LivenessThresholds {
    /// Create validated thresholds; `stale_after` must be strictly less than
    /// `offline_after`.
    pub fn new(stale_after: Duration, offline_after: Duration) -> Result<Self, InvalidThresholds> {
        if stale_after < offline_after {
            Ok(Self {
                stale_after,
                offline_after,
            })
        } else {
            Err(InvalidThresholds)
        }
    }

    /// Silence beyond this marks an online device stale.
    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Silence beyond this marks any device offline.
    pub fn offline_after(&self) -> Duration {
        self.offline_after
    }
}

/// Live state for one device. Owned exclusively by the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct LivenessRecord {
    /// When the device last reported.
    pub last_seen_at: DateTime<Utc>,
    /// The most recent decoded reading.
    pub last_reading: Option<Reading>,
    /// Current classification.
    pub status: LivenessStatus,
    /// When `status` last changed.
    pub status_changed_at: DateTime<Utc>,
}

/// One detected state transition, ready to become an event.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub device_id: String,
    pub from: LivenessStatus,
    pub to: LivenessStatus,
    pub at: DateTime<Utc>,
    /// For recoveries: when the device went down (the prior
    /// `status_changed_at`).
    pub outage_since: Option<DateTime<Utc>>,
    /// Battery level from the last reading, for cause hints.
    pub last_battery: Option<f64>,
}

impl Transition {
    /// True when this is a first-ever sighting of the device.
    pub fn is_startup(&self) -> bool {
        self.from == LivenessStatus::Unknown && self.to == LivenessStatus::Online
    }
}

/// Owned, injected store of per-device liveness records.
///
/// Deliberately not a module-level global: multiple monitors (or test
/// harnesses) can each own their own tracker in isolation.
#[derive(Debug)]
pub struct LivenessTracker {
    thresholds: LivenessThresholds,
    records: BTreeMap<String, LivenessRecord>,
}

impl LivenessTracker {
    /// Create an empty tracker with the given thresholds.
    pub fn new(thresholds: LivenessThresholds) -> Self {
        Self {
            thresholds,
            records: BTreeMap::new(),
        }
    }

    /// Message arrival for a device.
    ///
    /// Records the reading and last-seen time. Returns the resulting
    /// transition: startup for a first sighting, a recovery to online when
    /// the device was stale or offline, and `None` when it was already
    /// online.
    pub fn observe(&mut self, reading: Reading, now: DateTime<Utc>) -> Option<Transition> {
        let device_id = reading.device_id.clone();
        let battery = reading.battery;

        match self.records.get_mut(&device_id) {
            None => {
                self.records.insert(
                    device_id.clone(),
                    LivenessRecord {
                        last_seen_at: now,
                        last_reading: Some(reading),
                        status: LivenessStatus::Online,
                        status_changed_at: now,
                    },
                );
                Some(Transition {
                    device_id,
                    from: LivenessStatus::Unknown,
                    to: LivenessStatus::Online,
                    at: now,
                    outage_since: None,
                    last_battery: battery,
                })
            }
            Some(record) => {
                let prior = record.status;
                record.last_seen_at = now;
                record.last_reading = Some(reading);

                match prior {
                    LivenessStatus::Online => None,
                    LivenessStatus::Stale | LivenessStatus::Offline => {
                        let outage_since = record.status_changed_at;
                        record.status = LivenessStatus::Online;
                        record.status_changed_at = now;
                        Some(Transition {
                            device_id,
                            from: prior,
                            to: LivenessStatus::Online,
                            at: now,
                            outage_since: Some(outage_since),
                            last_battery: battery,
                        })
                    }
                    // A restored record that never classified; treat like a
                    // first sighting.
                    LivenessStatus::Unknown => {
                        record.status = LivenessStatus::Online;
                        record.status_changed_at = now;
                        Some(Transition {
                            device_id,
                            from: LivenessStatus::Unknown,
                            to: LivenessStatus::Online,
                            at: now,
                            outage_since: None,
                            last_battery: battery,
                        })
                    }
                }
            }
        }
    }

    /// Periodic sweep over every device with a known last-seen time.
    ///
    /// The offline check runs first: a device silent past both thresholds
    /// goes straight to offline, never re-entering stale on the way down.
    /// Devices already stale or offline do not re-trigger their own state.
    /// Evaluation order is map key order, so a pass is deterministic.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<Transition> {
        let mut transitions = Vec::new();

        for (device_id, record) in &mut self.records {
            if record.status == LivenessStatus::Unknown {
                continue;
            }

            let silence = (now - record.last_seen_at).to_std().unwrap_or_default();
            let battery = record.last_reading.as_ref().and_then(|r| r.battery);

            if silence > self.thresholds.offline_after
                && record.status != LivenessStatus::Offline
            {
                transitions.push(Transition {
                    device_id: device_id.clone(),
                    from: record.status,
                    to: LivenessStatus::Offline,
                    at: now,
                    outage_since: None,
                    last_battery: battery,
                });
                record.status = LivenessStatus::Offline;
                record.status_changed_at = now;
            } else if silence > self.thresholds.stale_after
                && record.status == LivenessStatus::Online
            {
                transitions.push(Transition {
                    device_id: device_id.clone(),
                    from: record.status,
                    to: LivenessStatus::Stale,
                    at: now,
                    outage_since: None,
                    last_battery: battery,
                });
                record.status = LivenessStatus::Stale;
                record.status_changed_at = now;
            }
        }

        transitions
    }

    /// Current classification; `Unknown` for devices never seen.
    pub fn status(&self, device_id: &str) -> LivenessStatus {
        self.records
            .get(device_id)
            .map(|r| r.status)
            .unwrap_or_default()
    }

    /// The live record for a device, if it has one.
    pub fn record(&self, device_id: &str) -> Option<&LivenessRecord> {
        self.records.get(device_id)
    }

    /// Seed a record from persisted state (startup recovery).
    pub fn restore(&mut self, device_id: impl Into<String>, record: LivenessRecord) {
        self.records.insert(device_id.into(), record);
    }

    /// Number of tracked devices.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no device has ever been tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new(LivenessThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn reading(device: &str, at: DateTime<Utc>) -> Reading {
        Reading::new(device, at, 20.0, "in")
    }

    fn minutes(m: i64) -> chrono::Duration {
        chrono::Duration::minutes(m)
    }

    #[test]
    fn thresholds_must_be_ordered() {
        assert!(LivenessThresholds::new(
            Duration::from_secs(60),
            Duration::from_secs(120)
        )
        .is_ok());
        assert_eq!(
            LivenessThresholds::new(Duration::from_secs(120), Duration::from_secs(120)),
            Err(InvalidThresholds)
        );
        assert_eq!(
            LivenessThresholds::new(Duration::from_secs(180), Duration::from_secs(120)),
            Err(InvalidThresholds)
        );
    }

    #[test]
    fn accessors_return_the_validated_values() {
        let thresholds =
            LivenessThresholds::new(Duration::from_secs(60), Duration::from_secs(120)).unwrap();
        assert_eq!(thresholds.stale_after(), Duration::from_secs(60));
        assert_eq!(thresholds.offline_after(), Duration::from_secs(120));

        let defaults = LivenessThresholds::default();
        assert!(defaults.stale_after() < defaults.offline_after());
    }

    #[test]
    fn first_sighting_is_a_startup_transition() {
        let mut tracker = LivenessTracker::default();
        let transition = tracker.observe(reading("tank-01", t0()), t0()).unwrap();

        assert!(transition.is_startup());
        assert_eq!(transition.from, LivenessStatus::Unknown);
        assert_eq!(transition.to, LivenessStatus::Online);
        assert!(transition.outage_since.is_none());
        assert_eq!(tracker.status("tank-01"), LivenessStatus::Online);
    }

    #[test]
    fn repeat_message_while_online_is_silent() {
        let mut tracker = LivenessTracker::default();
        tracker.observe(reading("tank-01", t0()), t0());

        let later = t0() + minutes(5);
        assert!(tracker.observe(reading("tank-01", later), later).is_none());
        assert_eq!(
            tracker.record("tank-01").unwrap().last_seen_at,
            later,
            "last seen still advances"
        );
    }

    #[test]
    fn sweep_marks_stale_after_threshold() {
        let mut tracker = LivenessTracker::default();
        tracker.observe(reading("tank-01", t0()), t0());

        // 31 minutes of silence with a 30 minute stale threshold.
        let transitions = tracker.sweep(t0() + minutes(31));
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].from, LivenessStatus::Online);
        assert_eq!(transitions[0].to, LivenessStatus::Stale);
        assert_eq!(tracker.status("tank-01"), LivenessStatus::Stale);
    }

    #[test]
    fn stale_does_not_retrigger_every_sweep() {
        let mut tracker = LivenessTracker::default();
        tracker.observe(reading("tank-01", t0()), t0());

        assert_eq!(tracker.sweep(t0() + minutes(31)).len(), 1);
        assert!(tracker.sweep(t0() + minutes(41)).is_empty());
        assert!(tracker.sweep(t0() + minutes(51)).is_empty());
    }

    #[test]
    fn three_hours_silent_goes_straight_to_offline() {
        // A device past both thresholds must skip stale entirely: the
        // offline check runs first.
        let mut tracker = LivenessTracker::default();
        tracker.observe(reading("tank-01", t0()), t0());

        let transitions = tracker.sweep(t0() + minutes(180));
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to, LivenessStatus::Offline);
        assert_eq!(tracker.status("tank-01"), LivenessStatus::Offline);
    }

    #[test]
    fn stale_device_crossing_offline_threshold_transitions_once() {
        let mut tracker = LivenessTracker::default();
        tracker.observe(reading("tank-01", t0()), t0());

        tracker.sweep(t0() + minutes(31));
        assert_eq!(tracker.status("tank-01"), LivenessStatus::Stale);

        let transitions = tracker.sweep(t0() + minutes(121));
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].from, LivenessStatus::Stale);
        assert_eq!(transitions[0].to, LivenessStatus::Offline);

        // Re-detecting offline while already offline is a no-op.
        assert!(tracker.sweep(t0() + minutes(240)).is_empty());
    }

    #[test]
    fn one_sweep_pass_produces_at_most_one_transition_per_device() {
        let mut tracker = LivenessTracker::default();
        tracker.observe(reading("tank-01", t0()), t0());

        let transitions = tracker.sweep(t0() + minutes(500));
        let for_device: Vec<_> = transitions
            .iter()
            .filter(|t| t.device_id == "tank-01")
            .collect();
        assert_eq!(for_device.len(), 1);
    }

    #[test]
    fn recovery_carries_the_outage_start() {
        let mut tracker = LivenessTracker::default();
        tracker.observe(reading("tank-01", t0()), t0());

        let offline_at = t0() + minutes(180);
        tracker.sweep(offline_at);

        let back = t0() + minutes(185);
        let transition = tracker.observe(reading("tank-01", back), back).unwrap();
        assert_eq!(transition.from, LivenessStatus::Offline);
        assert_eq!(transition.to, LivenessStatus::Online);
        assert_eq!(transition.outage_since, Some(offline_at));
        assert!(!transition.is_startup());
    }

    #[test]
    fn recovery_from_stale_also_transitions() {
        let mut tracker = LivenessTracker::default();
        tracker.observe(reading("tank-01", t0()), t0());

        let stale_at = t0() + minutes(31);
        tracker.sweep(stale_at);

        let back = t0() + minutes(40);
        let transition = tracker.observe(reading("tank-01", back), back).unwrap();
        assert_eq!(transition.from, LivenessStatus::Stale);
        assert_eq!(transition.outage_since, Some(stale_at));
    }

    #[test]
    fn offline_transition_carries_last_battery() {
        let mut tracker = LivenessTracker::default();
        let mut r = reading("tank-01", t0());
        r.battery = Some(21.0);
        tracker.observe(r, t0());

        let transitions = tracker.sweep(t0() + minutes(180));
        assert_eq!(transitions[0].last_battery, Some(21.0));
    }

    #[test]
    fn devices_are_independent() {
        let mut tracker = LivenessTracker::default();
        tracker.observe(reading("tank-01", t0()), t0());

        let later = t0() + minutes(10);
        tracker.observe(reading("tank-02", later), later);

        // tank-01 is 45 minutes silent, tank-02 is 35; both stale, neither
        // anywhere near offline.
        let transitions = tracker.sweep(t0() + minutes(45));
        assert_eq!(transitions.len(), 2);
        assert!(transitions.iter().all(|t| t.to == LivenessStatus::Stale));
    }

    #[test]
    fn never_seen_devices_stay_unknown_and_are_not_swept() {
        let mut tracker = LivenessTracker::default();
        assert_eq!(tracker.status("ghost"), LivenessStatus::Unknown);
        assert!(tracker.sweep(t0()).is_empty());
        assert!(tracker.is_empty());
    }

    #[test]
    fn restored_record_resumes_with_persisted_status() {
        let mut tracker = LivenessTracker::default();
        tracker.restore(
            "tank-09",
            LivenessRecord {
                last_seen_at: t0(),
                last_reading: None,
                status: LivenessStatus::Offline,
                status_changed_at: t0(),
            },
        );

        assert_eq!(tracker.status("tank-09"), LivenessStatus::Offline);

        // Still silent: no re-trigger.
        assert!(tracker.sweep(t0() + minutes(300)).is_empty());

        // A message recovers it.
        let back = t0() + minutes(301);
        let transition = tracker.observe(reading("tank-09", back), back).unwrap();
        assert_eq!(transition.from, LivenessStatus::Offline);
        assert_eq!(transition.to, LivenessStatus::Online);
    }

    #[test]
    fn clock_skew_is_treated_as_zero_silence() {
        let mut tracker = LivenessTracker::default();
        tracker.observe(reading("tank-01", t0()), t0());

        // Sweep with a clock behind the last-seen time must not classify.
        assert!(tracker.sweep(t0() - minutes(10)).is_empty());
        assert_eq!(tracker.status("tank-01"), LivenessStatus::Online);
    }
}
