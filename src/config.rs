//! Application configuration.
//!
//! Settings layer in order: built-in defaults, an optional TOML file, then
//! `TANKWATCH_`-prefixed environment variables (double underscore separates
//! nesting, e.g. `TANKWATCH_AUTH__CLIENT_SECRET`). Secrets normally arrive
//! via the environment; the file covers everything else.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use tankwatch_broker::SessionConfig;
use tankwatch_monitor::LivenessThresholds;

/// Broker connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub namespace: String,
    pub keep_alive_secs: u64,
    pub reconnect_delay_secs: u64,
    pub reauth_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
}

/// Token endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub safety_margin_secs: u64,
    pub timeout_secs: u64,
}

/// Liveness engine settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    pub stale_after_secs: u64,
    pub offline_after_secs: u64,
    pub sweep_interval_secs: u64,
    pub retention_hours: i64,
    pub max_events: usize,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub auth: AuthConfig,
    pub monitor: MonitorConfig,
    /// Directory holding the snapshot files.
    pub state_dir: PathBuf,
}

impl AppConfig {
    /// Load configuration, layering the optional file at `path` over the
    /// defaults and the environment over both.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("broker.host", "localhost")?
            .set_default("broker.port", 1883_i64)?
            .set_default("broker.client_id", "tankwatch-monitor")?
            .set_default("broker.username", "oauth")?
            .set_default("broker.namespace", "tanks")?
            .set_default("broker.keep_alive_secs", 30_i64)?
            .set_default("broker.reconnect_delay_secs", 10_i64)?
            .set_default("broker.reauth_interval_secs", 90 * 60_i64)?
            .set_default("broker.heartbeat_interval_secs", 30 * 60_i64)?
            .set_default("auth.token_url", "http://localhost:8080/oauth/token")?
            .set_default("auth.client_id", "")?
            .set_default("auth.client_secret", "")?
            .set_default("auth.safety_margin_secs", 300_i64)?
            .set_default("auth.timeout_secs", 10_i64)?
            .set_default("monitor.stale_after_secs", 30 * 60_i64)?
            .set_default("monitor.offline_after_secs", 2 * 60 * 60_i64)?
            .set_default("monitor.sweep_interval_secs", 10 * 60_i64)?
            .set_default("monitor.retention_hours", 7 * 24_i64)?
            .set_default("monitor.max_events", 500_i64)?
            .set_default("state_dir", "./state")?;

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).required(false),
            );
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("TANKWATCH")
                    .separator("__"),
            )
            .build()
            .context("assembling configuration")?;

        let app: AppConfig = settings
            .try_deserialize()
            .context("deserializing configuration")?;
        app.validate()?;
        Ok(app)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.thresholds()?;
        anyhow::ensure!(
            self.monitor.sweep_interval_secs > 0,
            "monitor.sweep_interval_secs must be positive"
        );
        anyhow::ensure!(
            self.monitor.retention_hours > 0,
            "monitor.retention_hours must be positive"
        );
        Ok(())
    }

    /// Validated liveness thresholds.
    pub fn thresholds(&self) -> anyhow::Result<LivenessThresholds> {
        LivenessThresholds::new(
            Duration::from_secs(self.monitor.stale_after_secs),
            Duration::from_secs(self.monitor.offline_after_secs),
        )
        .context("monitor thresholds")
    }

    /// The broker session configuration derived from these settings.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            host: self.broker.host.clone(),
            port: self.broker.port,
            client_id: self.broker.client_id.clone(),
            username: self.broker.username.clone(),
            namespace: self.broker.namespace.clone(),
            keep_alive: Duration::from_secs(self.broker.keep_alive_secs),
            reconnect_delay: Duration::from_secs(self.broker.reconnect_delay_secs),
            reauth_interval: Duration::from_secs(self.broker.reauth_interval_secs),
            heartbeat_interval: Duration::from_secs(self.broker.heartbeat_interval_secs),
            ..SessionConfig::default()
        }
    }
}
