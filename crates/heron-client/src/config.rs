// Client-side connection configuration: broker address, certificate source,
// timeouts, ping behaviour, plus environment / YAML overrides.
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use serde::Deserialize;

use crate::certs::CertSource;
use crate::{Error, Result};

pub(crate) const DEFAULT_CONN_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(1);
pub(crate) const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(2);

// Wire order is submission order at the send channel; the queue stays at
// one slot so callers feel the writer's backpressure directly.
pub(crate) const SEND_QUEUE_DEPTH: usize = 1;

/// Sink for liveness round-trip times, called once per answered ping.
pub type PingObserver = Arc<dyn Fn(Duration) + Send + Sync + 'static>;

/// Everything needed to establish a connection to a pub/sub broker.
#[derive(Clone)]
pub struct ConnInfo {
    /// Network address of the broker, `host:port`.
    pub svr_address: String,
    /// Name the broker's certificate is validated against; defaults to the
    /// host part of `svr_address`.
    pub server_name: Option<String>,
    /// Where the TLS identity and CA pool come from.
    pub certs: Arc<dyn CertSource>,
    /// How long the dialler waits for TCP + TLS establishment.
    pub conn_timeout: Duration,
    /// How long Connect waits for the broker to answer the Start message.
    pub start_timeout: Duration,
    /// How long to wait between pings; irrelevant without an observer.
    pub ping_interval: Duration,
    /// Receives ping round-trip times. `None` suppresses pinging entirely.
    pub ping_observer: Option<PingObserver>,
}

impl ConnInfo {
    pub fn new(svr_address: impl Into<String>, certs: Arc<dyn CertSource>) -> Self {
        Self {
            svr_address: svr_address.into(),
            server_name: None,
            certs,
            conn_timeout: DEFAULT_CONN_TIMEOUT,
            start_timeout: DEFAULT_START_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            ping_observer: None,
        }
    }

    /// Turns on pinging: the observer is called with the round-trip time of
    /// every answered ping.
    pub fn with_ping_observer(mut self, observer: PingObserver) -> Self {
        self.ping_observer = Some(observer);
        self
    }

    /// Applies overrides, lowest priority first: a YAML file (the given
    /// path, or `$HERON_CLIENT_CONFIG`), then individual environment
    /// variables (`HERON_SERVER_NAME`, `HERON_CONN_TIMEOUT_MS`,
    /// `HERON_START_TIMEOUT_MS`, `HERON_PING_INTERVAL_MS`).
    pub fn apply_overrides(&mut self, config_path: Option<&str>) -> Result<()> {
        let override_path = config_path
            .map(|value| value.to_string())
            .or_else(|| std::env::var("HERON_CLIENT_CONFIG").ok());
        if let Some(path) = override_path.as_deref() {
            let contents = std::fs::read_to_string(path).map_err(|err| Error::Config {
                path: path.to_string(),
                reason: err.to_string(),
            })?;
            let override_cfg: ConnInfoOverride =
                serde_yaml::from_str(&contents).map_err(|err| Error::Config {
                    path: path.to_string(),
                    reason: err.to_string(),
                })?;
            override_cfg.apply(self);
        }

        if let Ok(value) = std::env::var("HERON_SERVER_NAME") {
            self.server_name = Some(value);
        }
        if let Some(value) = read_ms_env("HERON_CONN_TIMEOUT_MS") {
            self.conn_timeout = value;
        }
        if let Some(value) = read_ms_env("HERON_START_TIMEOUT_MS") {
            self.start_timeout = value;
        }
        if let Some(value) = read_ms_env("HERON_PING_INTERVAL_MS") {
            self.ping_interval = value;
        }

        Ok(())
    }

    // Pinging happens only with both an observer and a positive interval.
    pub(crate) fn is_pingable(&self) -> bool {
        self.ping_observer.is_some() && self.ping_interval > Duration::ZERO
    }

    // The name the broker's certificate must be valid for.
    pub(crate) fn tls_server_name(&self) -> Result<ServerName<'static>> {
        let name = match &self.server_name {
            Some(name) => name.clone(),
            None => host_of(&self.svr_address).to_string(),
        };

        ServerName::try_from(name.clone()).map_err(|_| Error::BadServerName { name })
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
struct ConnInfoOverride {
    server_name: Option<String>,
    conn_timeout_ms: Option<u64>,
    start_timeout_ms: Option<u64>,
    ping_interval_ms: Option<u64>,
}

impl ConnInfoOverride {
    fn apply(&self, info: &mut ConnInfo) {
        if let Some(value) = &self.server_name {
            info.server_name = Some(value.clone());
        }
        if let Some(value) = self.conn_timeout_ms {
            info.conn_timeout = Duration::from_millis(value);
        }
        if let Some(value) = self.start_timeout_ms {
            info.start_timeout = Duration::from_millis(value);
        }
        if let Some(value) = self.ping_interval_ms {
            info.ping_interval = Duration::from_millis(value);
        }
    }
}

fn read_ms_env(name: &str) -> Option<Duration> {
    let raw = std::env::var(name).ok()?;
    raw.parse::<u64>().ok().map(Duration::from_millis)
}

// Host part of a `host:port` address; IPv6 brackets are stripped.
fn host_of(addr: &str) -> &str {
    let host = match addr.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => addr,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}
