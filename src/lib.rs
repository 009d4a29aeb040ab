//! # tankwatch
//!
//! Liveness monitor for remote water-level sensors. The daemon keeps a
//! persistent broker session, classifies devices as online, stale, or
//! offline from message recency, and publishes its state as atomic JSON
//! snapshots; the read-only subcommands project those snapshots for
//! operators.
//!
//! The work happens in the member crates:
//! - `tankwatch-types`: the shared schema (readings, events, snapshots)
//! - `tankwatch-broker`: credentials, the MQTT session, telemetry decoding
//! - `tankwatch-monitor`: the liveness engine and snapshot persistence
//!
//! This crate is the application shell: configuration, wiring, and the CLI
//! projections.

pub mod config;
pub mod snapshots;
pub mod views;

pub use config::AppConfig;
pub use snapshots::SnapshotReader;
