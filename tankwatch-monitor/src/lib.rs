//! # tankwatch-monitor
//!
//! The liveness engine. This crate turns the broker crate's stream of raw
//! messages into durable, queryable connectivity state:
//!
//! - [`LivenessTracker`]: per-device state machine classifying devices as
//!   online, stale, or offline from message recency
//! - [`EventLog`]: bounded, append-only transition history with per-device
//!   rolling summaries and outage-duration accounting
//! - [`Timeline`]: hour-bucketed rolling status history used for uptime
//!   percentages
//! - [`StateStore`]: the narrow persistence seam; [`JsonFileStore`] writes
//!   atomic JSON snapshot files
//! - [`Monitor`]: the orchestrator wiring all of the above to the transport
//!   session and the periodic sweep
//!
//! Message handling and sweep evaluation serialize through a single lock, so
//! a sweep can never race a concurrent message for the same device and no
//! reader ever observes a partial snapshot.

mod events;
mod liveness;
mod monitor;
mod store;
mod timeline;

pub use events::{EventFilter, EventLog, MAX_EVENTS};
pub use liveness::{
    InvalidThresholds, LivenessRecord, LivenessThresholds, LivenessTracker, Transition,
};
pub use monitor::{Monitor, MonitorBuilder, MonitorHandle};
pub use store::{JsonFileStore, MemoryStore, PersistenceError, StateStore};
pub use timeline::{Timeline, UptimeStats, DEFAULT_RETENTION_HOURS};

// Re-export the schema types for convenience.
pub use tankwatch_types::{
    DeviceRecord, Event, EventDetails, EventKind, EventLogSnapshot, LivenessStatus, Reading,
    ReadingsSnapshot, SensorSummary, TimelineSnapshot,
};
