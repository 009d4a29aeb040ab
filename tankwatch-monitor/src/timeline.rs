//! Hour-bucketed rolling status history.
//!
//! Every recorded status lands in the UTC hour bucket containing its
//! timestamp; the last write within an hour wins. Buckets older than the
//! retention window are pruned on every write, independently per device.

use std::collections::BTreeMap;

use chrono::{DateTime, DurationRound, SecondsFormat, TimeZone, Utc};
use tracing::warn;

use tankwatch_types::{LivenessStatus, TimelineSnapshot};

/// Default retention window, in hours.
pub const DEFAULT_RETENTION_HOURS: i64 = 7 * 24;

/// Uptime figures for one device over its retained window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UptimeStats {
    /// Buckets with any recorded status.
    pub total_buckets: usize,
    /// Buckets whose final status was online.
    pub online_buckets: usize,
    /// `online_buckets / total_buckets`, as a percentage rounded to one
    /// decimal place.
    pub uptime_percent: f64,
}

/// Rolling per-device status history, keyed by hour floor.
#[derive(Debug)]
pub struct Timeline {
    retention: chrono::Duration,
    devices: BTreeMap<String, BTreeMap<DateTime<Utc>, LivenessStatus>>,
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_HOURS)
    }
}

impl Timeline {
    /// Create an empty timeline retaining `retention_hours` of buckets.
    pub fn new(retention_hours: i64) -> Self {
        Self {
            retention: chrono::Duration::hours(retention_hours.max(1)),
            devices: BTreeMap::new(),
        }
    }

    /// Record a status observation for a device.
    ///
    /// The observation lands in the hour bucket containing `at`,
    /// overwriting any earlier status in the same hour, and expired buckets
    /// for this device are pruned.
    pub fn record(&mut self, device_id: &str, status: LivenessStatus, at: DateTime<Utc>) {
        let bucket = hour_floor(at);
        let history = self.devices.entry(device_id.to_string()).or_default();
        history.insert(bucket, status);

        // The cutoff is anchored on the unaligned update time; anchoring on
        // the hour floor would let a bucket linger up to 59 minutes past the
        // window.
        let cutoff = at - self.retention;
        // split_off keeps everything at or after the cutoff.
        *history = history.split_off(&cutoff);
    }

    /// The retained bucket history for a device, oldest first.
    pub fn history(&self, device_id: &str) -> Option<&BTreeMap<DateTime<Utc>, LivenessStatus>> {
        self.devices.get(device_id)
    }

    /// Uptime over the retained window; `None` for devices with no buckets.
    pub fn uptime_stats(&self, device_id: &str) -> Option<UptimeStats> {
        let history = self.devices.get(device_id)?;
        if history.is_empty() {
            return None;
        }

        let total_buckets = history.len();
        let online_buckets = history
            .values()
            .filter(|status| status.is_online())
            .count();
        let uptime_percent =
            (online_buckets as f64 / total_buckets as f64 * 1000.0).round() / 10.0;

        Some(UptimeStats {
            total_buckets,
            online_buckets,
            uptime_percent,
        })
    }

    /// Device ids with at least one retained bucket.
    pub fn device_ids(&self) -> Vec<&str> {
        self.devices.keys().map(String::as_str).collect()
    }

    /// Number of devices with history.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True when no device has any history.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Copy the timeline into its persisted form. Bucket keys serialize as
    /// ISO-8601 hours in UTC.
    pub fn snapshot(&self) -> TimelineSnapshot {
        let devices = self
            .devices
            .iter()
            .map(|(device_id, history)| {
                let buckets = history
                    .iter()
                    .map(|(bucket, status)| {
                        (bucket.to_rfc3339_opts(SecondsFormat::Secs, true), *status)
                    })
                    .collect();
                (device_id.clone(), buckets)
            })
            .collect();

        TimelineSnapshot {
            version: Default::default(),
            devices,
        }
    }

    /// Rebuild a timeline from a persisted snapshot.
    ///
    /// Malformed bucket keys are skipped with a warning rather than failing
    /// the whole restore.
    pub fn restore(snapshot: TimelineSnapshot, retention_hours: i64) -> Self {
        let mut timeline = Self::new(retention_hours);

        for (device_id, buckets) in snapshot.devices {
            let mut history = BTreeMap::new();
            for (key, status) in buckets {
                match DateTime::parse_from_rfc3339(&key) {
                    Ok(parsed) => {
                        history.insert(Utc.from_utc_datetime(&parsed.naive_utc()), status);
                    }
                    Err(e) => {
                        warn!(device_id = %device_id, bucket = %key, error = %e,
                              "skipping unparseable timeline bucket");
                    }
                }
            }
            if !history.is_empty() {
                timeline.devices.insert(device_id, history);
            }
        }

        timeline
    }
}

/// Floor a timestamp to the start of its UTC hour.
fn hour_floor(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(chrono::Duration::hours(1)).unwrap_or(at)
}
