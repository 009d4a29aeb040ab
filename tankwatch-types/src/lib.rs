//! # tankwatch-types
//!
//! Core types for sensor liveness monitoring. This crate defines the schema
//! shared by the monitor daemon, the operator CLI, and anything else that
//! consumes the persisted snapshot files.
//!
//! ## Design Goals
//!
//! - **Narrow contract**: the snapshot types here are the entire interface
//!   between the monitor and its consumers - file-based handoff, no RPC
//! - **Optional serialization**: enable the `serde` feature to read or write
//!   the JSON snapshot files
//! - **Versioned schema**: snapshots embed a schema version so consumers can
//!   detect format changes
//!
//! ## Example
//!
//! ```rust
//! use tankwatch_types::{LivenessStatus, SensorSummary};
//! use chrono::Utc;
//!
//! let summary = SensorSummary::new(Utc::now());
//! assert_eq!(summary.current_status, LivenessStatus::Unknown);
//! assert_eq!(summary.total_offline_events, 0);
//! ```
//!
//! ## Schema Version
//!
//! The current schema version is **1**. It is included in serialized
//! snapshots to allow consumers to handle format evolution gracefully.

mod event;
mod reading;
mod snapshot;
mod status;
mod summary;
mod version;

pub use event::*;
pub use reading::*;
pub use snapshot::*;
pub use status::*;
pub use summary::*;
pub use version::*;

/// Current schema version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const SCHEMA_VERSION: u32 = 1;
