// file: src/config.rs
// description: configuration model and task-scoped endpoint derivation

use crate::{cli::Args, error::TaskwireError};
use anyhow::Result;
use std::time::Duration;
use url::Url;

pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: EndpointConfig,
    pub reconnect: ReconnectConfig,
    pub heartbeat: HeartbeatConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Base HTTP(S) URL of the orchestration backend. Must end with a
    /// trailing slash for sub-path joins to behave as expected.
    pub base_url: Url,
}

#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Fixed pause between reconnect attempts. Deliberately not
    /// exponential; see the crate docs for the rationale.
    pub delay: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl EndpointConfig {
    /// Task-scoped WebSocket endpoint for the bidirectional channel.
    /// The http→ws scheme substitution happens here, on the client side.
    pub fn bidirectional_url(&self, task_id: &str) -> Result<Url, TaskwireError> {
        let joined = self.base_url.join(&format!("ws/{task_id}"))?;
        let scheme = match joined.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        rewrite_scheme(&joined, scheme)
    }

    /// Task-scoped SSE endpoint for the push-only channel, on the same host.
    pub fn push_url(&self, task_id: &str) -> Result<Url, TaskwireError> {
        let joined = self.base_url.join(&format!("events/{task_id}"))?;
        let scheme = match joined.scheme() {
            "https" | "wss" => "https",
            _ => "http",
        };
        rewrite_scheme(&joined, scheme)
    }
}

fn rewrite_scheme(url: &Url, scheme: &str) -> Result<Url, TaskwireError> {
    if url.scheme() == scheme {
        return Ok(url.clone());
    }
    let rest = url
        .as_str()
        .split_once(':')
        .map(|(_, rest)| rest)
        .unwrap_or_default();
    Ok(Url::parse(&format!("{scheme}:{rest}"))?)
}

impl Config {
    /// Library entry point: defaults for everything but the endpoint.
    pub fn new(base_url: Url) -> Self {
        Config {
            endpoint: EndpointConfig { base_url },
            reconnect: ReconnectConfig {
                delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
                max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            },
            heartbeat: HeartbeatConfig {
                interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            },
            metrics: MetricsConfig {
                enabled: false,
                port: 9091,
            },
        }
    }

    pub fn from_args(args: &Args) -> Result<Self> {
        let base_url = Url::parse(&args.url)?;

        Ok(Config {
            endpoint: EndpointConfig { base_url },
            reconnect: ReconnectConfig {
                delay: Duration::from_millis(args.reconnect_delay_ms),
                max_attempts: args.max_reconnects,
            },
            heartbeat: HeartbeatConfig {
                interval: Duration::from_secs(args.heartbeat_interval),
            },
            metrics: MetricsConfig {
                enabled: args.metrics,
                port: args.metrics_port,
            },
        })
    }
}
