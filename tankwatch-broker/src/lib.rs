//! # tankwatch-broker
//!
//! Adapters for the external collaborators of the liveness monitor: the
//! authentication endpoint, the telemetry broker, and the raw message format
//! sensors publish.
//!
//! Three pieces live here:
//!
//! - [`CredentialProvider`]: exchanges static client credentials for
//!   short-lived bearer tokens, with expiry-aware caching
//! - [`TransportSession`]: owns the persistent MQTT connection - subscribe,
//!   fixed-delay reconnect, periodic forced re-authentication
//! - [`TelemetryDecoder`]: parses an inbound publish into a normalized
//!   [`Reading`](tankwatch_types::Reading)
//!
//! None of these know anything about liveness state; they feed the monitor
//! crate through a channel of [`RawMessage`]s and plain `Result`s.

mod auth;
mod decode;
mod error;
mod session;

pub use auth::{CredentialProvider, CredentialProviderBuilder};
pub use decode::TelemetryDecoder;
pub use error::{AuthError, DecodeError, TransportError};
pub use session::{RawMessage, SessionConfig, TransportSession};
