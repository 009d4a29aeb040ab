//! Text projections over the snapshot files.
//!
//! Pure formatting: every function takes decoded snapshot data and returns a
//! string, so the projections are testable without a filesystem or a running
//! monitor.

use chrono::{DateTime, Utc};

use tankwatch_types::{Event, EventKind, EventLogSnapshot, ReadingsSnapshot, TimelineSnapshot};

/// Device status table from the readings snapshot.
pub fn render_status(snapshot: &ReadingsSnapshot, now: DateTime<Utc>) -> String {
    let mut out = format!(
        "{:<20} {:<8} {:>8} {:>8}  {:<14} {}\n",
        "DEVICE", "STATUS", "DEPTH", "BATTERY", "LAST SEEN", "SINCE"
    );

    for (device_id, record) in &snapshot.devices {
        let battery = record
            .reading
            .battery
            .map(|b| format!("{b:.0}%"))
            .unwrap_or_else(|| "-".to_string());

        out.push_str(&format!(
            "{:<20} {:<8} {:>7.1}{} {:>8}  {:<14} {}\n",
            device_id,
            record.status.label(),
            record.reading.depth,
            record.reading.depth_unit,
            battery,
            humanize_since(record.reading.received_at, now),
            record.status_changed_at.format("%Y-%m-%d %H:%M:%SZ"),
        ));
    }

    if snapshot.devices.is_empty() {
        out.push_str("(no devices have reported yet)\n");
    }
    out
}

/// Event listing, oldest first.
pub fn render_events(events: &[&Event]) -> String {
    let mut out = String::new();

    for event in events {
        let device = event.device_id.as_deref().unwrap_or("-");
        let mut line = format!(
            "{}  {:<8} {:<20}",
            event.timestamp.format("%Y-%m-%d %H:%M:%SZ"),
            event.kind.label(),
            device,
        );

        if let Some(ms) = event.details.offline_duration_ms {
            line.push_str(&format!(" down {}", humanize_ms(ms)));
        }
        if let Some(battery) = event.details.last_battery {
            line.push_str(&format!(" battery {battery:.0}%"));
        }
        if let Some(cause) = &event.details.cause {
            line.push_str(&format!(" ({cause})"));
        }
        if let Some(message) = &event.details.message {
            line.push_str(&format!(" {message}"));
        }

        out.push_str(&line);
        out.push('\n');
    }

    if events.is_empty() {
        out.push_str("(no matching events)\n");
    }
    out
}

/// Apply the CLI's event filters to a persisted snapshot.
pub fn filter_events<'a>(
    snapshot: &'a EventLogSnapshot,
    device: Option<&str>,
    kind: Option<EventKind>,
    transitions_only: bool,
    limit: Option<usize>,
) -> Vec<&'a Event> {
    let matches: Vec<&Event> = snapshot
        .events
        .iter()
        .filter(|e| device.is_none() || e.device_id.as_deref() == device)
        .filter(|e| kind.map_or(true, |k| e.kind == k))
        .filter(|e| !transitions_only || e.kind.is_transition())
        .collect();

    let skip = match limit {
        Some(limit) if matches.len() > limit => matches.len() - limit,
        _ => 0,
    };
    matches.into_iter().skip(skip).collect()
}

/// Per-device historical summary table from the event log snapshot.
///
/// Unlike the status table this includes devices with no current reading;
/// a device that produced events but never a decodable reading shows "-"
/// in the reading columns.
pub fn render_summary(snapshot: &EventLogSnapshot, now: DateTime<Utc>) -> String {
    let mut out = format!(
        "{:<20} {:<8} {:<14} {:>8} {:>8} {:>8}\n",
        "DEVICE", "STATUS", "LAST SEEN", "OFFLINE", "STALE", "BATTERY"
    );

    for (device_id, summary) in &snapshot.sensors {
        let (last_seen, battery) = match &summary.last_reading {
            Some(reading) => (
                humanize_since(reading.received_at, now),
                reading
                    .battery
                    .map(|b| format!("{b:.0}%"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            None => ("never".to_string(), "-".to_string()),
        };

        out.push_str(&format!(
            "{:<20} {:<8} {:<14} {:>8} {:>8} {:>8}\n",
            device_id,
            summary.current_status.label(),
            last_seen,
            summary.total_offline_events,
            summary.total_stale_events,
            battery,
        ));
    }

    if snapshot.sensors.is_empty() {
        out.push_str("(no devices have been seen yet)\n");
    }
    out
}

/// Uptime table from the timeline snapshot.
pub fn render_uptime(snapshot: &TimelineSnapshot) -> String {
    let mut out = format!(
        "{:<20} {:>8} {:>8} {:>8}\n",
        "DEVICE", "HOURS", "ONLINE", "UPTIME"
    );

    for (device_id, buckets) in &snapshot.devices {
        if buckets.is_empty() {
            continue;
        }
        let total = buckets.len();
        let online = buckets.values().filter(|s| s.is_online()).count();
        let percent = (online as f64 / total as f64 * 1000.0).round() / 10.0;

        out.push_str(&format!(
            "{device_id:<20} {total:>8} {online:>8} {percent:>7.1}%\n"
        ));
    }

    if snapshot.devices.is_empty() {
        out.push_str("(no uptime history yet)\n");
    }
    out
}

/// "3m ago", "2h ago", "5d ago". Future timestamps render as "now".
fn humanize_since(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();
    if secs < 0 {
        return "now".to_string();
    }
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

/// "45s", "9m", "2h 15m".
fn humanize_ms(ms: u64) -> String {
    let secs = ms / 1000;
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        if minutes == 0 {
            format!("{hours}h")
        } else {
            format!("{hours}h {minutes}m")
        }
    }
}
