//! Error taxonomy for the broker adapters.
//!
//! Each variant family maps to a distinct recovery path in the monitor:
//! auth failures abort the current connect attempt but are retried on the
//! next one, transport failures trigger the reconnect loop, and decode
//! failures drop the offending message without touching liveness state.

use thiserror::Error;

/// Credential exchange failed.
///
/// Fatal for the current connection attempt, retryable on the next scheduled
/// one. Never escalated to process termination.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint answered with a non-success status.
    #[error("token endpoint returned status {0}")]
    Status(reqwest::StatusCode),

    /// The exchange request itself failed (DNS, TLS, connection).
    #[error("token exchange failed: {0}")]
    Exchange(String),

    /// The response parsed but carried no usable token.
    #[error("token response missing access_token")]
    MissingToken,

    /// The exchange did not complete within the request timeout.
    #[error("token exchange timed out")]
    Timeout,
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AuthError::Timeout
        } else {
            AuthError::Exchange(err.to_string())
        }
    }
}

/// Broker connection or subscription failure.
///
/// Logged and absorbed by the reconnect loop; deliberately never surfaced as
/// a system event so transient network noise cannot flood the event log.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connecting to or polling the broker failed.
    #[error("broker connection failed: {0}")]
    Connection(String),

    /// Issuing the subscription after connect failed.
    #[error("subscribe failed for '{filter}': {reason}")]
    Subscribe { filter: String, reason: String },

    /// Could not obtain a credential for the connect attempt.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<rumqttc::ConnectionError> for TransportError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        TransportError::Connection(err.to_string())
    }
}

/// Malformed or unrecognized message payload.
///
/// The message is dropped and a diagnostic recorded; a malformed message is
/// never treated as a liveness signal.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The topic did not match the expected report pattern.
    #[error("topic '{0}' does not match the report pattern")]
    Topic(String),

    /// The payload was not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    Json(String),

    /// The payload parsed but carried no depth measurement.
    #[error("payload has no depth measurement")]
    MissingDepth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_name_the_topic() {
        let err = DecodeError::Topic("weird/topic".into());
        assert!(err.to_string().contains("weird/topic"));
    }

    #[test]
    fn subscribe_error_names_the_filter() {
        let err = TransportError::Subscribe {
            filter: "acme/+/report".into(),
            reason: "not authorized".into(),
        };
        let text = err.to_string();
        assert!(text.contains("acme/+/report"));
        assert!(text.contains("not authorized"));
    }

    #[test]
    fn auth_error_nests_into_transport() {
        let err = TransportError::from(AuthError::MissingToken);
        assert!(matches!(err, TransportError::Auth(AuthError::MissingToken)));
    }
}
