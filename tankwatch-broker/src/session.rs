//! The persistent broker session.
//!
//! Owns the MQTT connection for the monitor's lifetime: connect with a fresh
//! credential, subscribe to the installation's report topics, forward
//! publishes to the orchestrator, and reconnect forever on a fixed delay.
//! Two timers run regardless of connection health: a forced
//! disconnect-and-reconnect cycle so the broker periodically sees a fresh
//! credential, and a heartbeat that logs a diagnostic snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{CredentialProvider, TransportError};

/// Configuration for the broker session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Username presented alongside the bearer token.
    pub username: String,
    /// Installation namespace; scopes the subscription filter.
    pub namespace: String,
    /// MQTT keep-alive.
    pub keep_alive: Duration,
    /// Fixed delay between reconnect attempts. No backoff, by contract.
    pub reconnect_delay: Duration,
    /// How often a healthy connection is torn down to force re-authentication.
    pub reauth_interval: Duration,
    /// How often the diagnostic heartbeat is logged.
    pub heartbeat_interval: Duration,
    /// Capacity of the channel carrying raw messages to the orchestrator.
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "tankwatch-monitor".to_string(),
            username: "oauth".to_string(),
            namespace: "tanks".to_string(),
            keep_alive: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(10),
            reauth_interval: Duration::from_secs(90 * 60),
            heartbeat_interval: Duration::from_secs(30 * 60),
            channel_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// The subscription filter: reports from any device under this
    /// installation.
    pub fn topic_filter(&self) -> String {
        format!("{}/+/report", self.namespace)
    }
}

/// One raw inbound publish, before decoding.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Handle to the running session task.
///
/// Dropping the handle does not stop the session; call [`stop`](Self::stop).
pub struct TransportSession {
    join: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl TransportSession {
    /// Spawn the session task. Returns the handle and the receiving end of
    /// the raw message channel.
    pub fn spawn(
        config: SessionConfig,
        credentials: Arc<CredentialProvider>,
    ) -> (Self, mpsc::Receiver<RawMessage>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let shutdown = CancellationToken::new();
        let task_shutdown = shutdown.clone();

        let join = tokio::spawn(async move {
            run_session(config, credentials, tx, task_shutdown).await;
        });

        (Self { join, shutdown }, rx)
    }

    /// Disconnect and stop the session task.
    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.join.await;
    }
}

/// Why one connection cycle ended.
enum CycleEnd {
    Shutdown,
    ForcedReauth,
    TransportError,
}

async fn run_session(
    config: SessionConfig,
    credentials: Arc<CredentialProvider>,
    tx: mpsc::Sender<RawMessage>,
    shutdown: CancellationToken,
) {
    let started = Instant::now();
    let mut messages_total: u64 = 0;
    let mut last_message: Option<Instant> = None;

    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; consume it so the first real
    // heartbeat lands one interval in.
    heartbeat.tick().await;

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        // The credential is refreshed unconditionally before every connect,
        // bypassing the cache.
        let token = match credentials.fresh_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "credential refresh failed; retrying after fixed delay");
                if sleep_or_cancel(config.reconnect_delay, &shutdown).await {
                    break;
                }
                continue;
            }
        };

        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_credentials(config.username.clone(), token);

        let (client, mut eventloop) = AsyncClient::new(options, 50);
        let filter = config.topic_filter();
        let mut connected = false;

        info!(host = %config.host, port = config.port, "connecting to telemetry broker");

        let reauth = tokio::time::sleep(config.reauth_interval);
        tokio::pin!(reauth);

        let cycle_end = loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = client.disconnect().await;
                    break CycleEnd::Shutdown;
                }

                _ = &mut reauth => {
                    info!("forcing reconnect for credential rotation");
                    let _ = client.disconnect().await;
                    break CycleEnd::ForcedReauth;
                }

                _ = heartbeat.tick() => {
                    let silent_secs = last_message.map(|t| t.elapsed().as_secs());
                    info!(
                        connected,
                        messages_total,
                        silent_secs,
                        uptime_secs = started.elapsed().as_secs(),
                        "transport heartbeat"
                    );
                }

                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        connected = true;
                        // Subscriptions do not survive a disconnect; re-issue
                        // after every successful connect.
                        if let Err(e) = client.subscribe(filter.clone(), QoS::AtLeastOnce).await {
                            let err = TransportError::Subscribe {
                                filter: filter.clone(),
                                reason: e.to_string(),
                            };
                            warn!(error = %err, "reconnecting");
                            break CycleEnd::TransportError;
                        }
                        info!(filter = %filter, "subscribed to device reports");
                    }
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        messages_total += 1;
                        last_message = Some(Instant::now());
                        let message = RawMessage {
                            topic: publish.topic,
                            payload: publish.payload.to_vec(),
                        };
                        if tx.send(message).await.is_err() {
                            // Orchestrator gone; nothing left to feed.
                            info!("message receiver dropped, stopping session");
                            let _ = client.disconnect().await;
                            break CycleEnd::Shutdown;
                        }
                    }
                    Ok(other) => {
                        debug!(event = ?other, "broker event");
                    }
                    Err(e) => {
                        let err = TransportError::from(e);
                        warn!(error = %err, "transport error; reconnecting after fixed delay");
                        break CycleEnd::TransportError;
                    }
                }
            }
        };

        match cycle_end {
            CycleEnd::Shutdown => break,
            // A forced re-auth interrupts a healthy connection; reconnect
            // immediately with the fresh credential.
            CycleEnd::ForcedReauth => continue,
            CycleEnd::TransportError => {
                if sleep_or_cancel(config.reconnect_delay, &shutdown).await {
                    break;
                }
            }
        }
    }

    info!("transport session stopped");
}

/// Sleep for `delay`, returning true if shutdown was requested first.
async fn sleep_or_cancel(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.cancelled() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_contract() {
        let config = SessionConfig::default();
        assert_eq!(config.reconnect_delay, Duration::from_secs(10));
        assert_eq!(config.reauth_interval, Duration::from_secs(5400));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1800));
    }

    #[test]
    fn topic_filter_scopes_the_namespace() {
        let config = SessionConfig {
            namespace: "acme-water".to_string(),
            ..Default::default()
        };
        assert_eq!(config.topic_filter(), "acme-water/+/report");
    }

    #[tokio::test]
    async fn sleep_or_cancel_honors_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(sleep_or_cancel(Duration::from_secs(60), &token).await);
    }

    #[tokio::test]
    async fn stop_terminates_the_session_task() {
        let credentials = Arc::new(
            CredentialProvider::builder()
                .token_url("http://127.0.0.1:1/token")
                .timeout(Duration::from_millis(100))
                .build(),
        );
        let (session, _rx) = TransportSession::spawn(SessionConfig::default(), credentials);
        session.stop().await;
    }
}
