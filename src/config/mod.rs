pub mod reconnect;

use anyhow::{anyhow, Result};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::config::reconnect::{
    ReconnectPolicy, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_MAX_DELAY_MS, DEFAULT_MIN_DELAY_MS,
};

pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_NOTIFY_PORT: u16 = 5000;
pub const DEFAULT_NOTIFY_PATH: &str = "/ws";
pub const DEFAULT_GRACE_MS: u64 = 1500;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    pub endpoint: Url,
    pub reconnect: ReconnectPolicy,
    pub disconnect_grace: Duration,
    pub status_poll_interval: Duration,
    pub notification_capacity: usize,
}

impl RealtimeConfig {
    /// Config pointing at `endpoint` with every other setting at its default.
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            reconnect: ReconnectPolicy::default(),
            disconnect_grace: Duration::from_millis(DEFAULT_GRACE_MS),
            status_poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            notification_capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn from_env() -> Result<Self> {
        let origin = env_or("APP_ORIGIN", DEFAULT_ORIGIN);
        let origin = Url::parse(&origin).map_err(|err| anyhow!("invalid APP_ORIGIN: {}", err))?;
        let port: u16 = env_or_parse("NOTIFY_PORT", &DEFAULT_NOTIFY_PORT.to_string())?;
        let path = env_or("NOTIFY_PATH", DEFAULT_NOTIFY_PATH);

        let min_delay: u64 = env_or_parse("RECONNECT_DELAY_MS", &DEFAULT_MIN_DELAY_MS.to_string())?;
        let max_delay: u64 =
            env_or_parse("RECONNECT_DELAY_MAX_MS", &DEFAULT_MAX_DELAY_MS.to_string())?;
        if max_delay < min_delay {
            return Err(anyhow!(
                "invalid RECONNECT_DELAY_MAX_MS: must be at least RECONNECT_DELAY_MS"
            ));
        }

        let capacity: usize =
            env_or_parse("NOTIFICATION_CAPACITY", &DEFAULT_CAPACITY.to_string())?;
        if capacity == 0 {
            return Err(anyhow!("invalid NOTIFICATION_CAPACITY: must be positive"));
        }

        Ok(Self {
            endpoint: endpoint_for_origin(&origin, port, &path)?,
            reconnect: ReconnectPolicy {
                min_delay: Duration::from_millis(min_delay),
                max_delay: Duration::from_millis(max_delay),
                connect_timeout: Duration::from_millis(env_or_parse(
                    "CONNECT_TIMEOUT_MS",
                    &DEFAULT_CONNECT_TIMEOUT_MS.to_string(),
                )?),
                ..ReconnectPolicy::default()
            },
            disconnect_grace: Duration::from_millis(env_or_parse(
                "DISCONNECT_GRACE_MS",
                &DEFAULT_GRACE_MS.to_string(),
            )?),
            status_poll_interval: Duration::from_millis(env_or_parse(
                "STATUS_POLL_INTERVAL_MS",
                &DEFAULT_POLL_INTERVAL_MS.to_string(),
            )?),
            notification_capacity: capacity,
        })
    }
}

/// Derives the notification server endpoint from the page origin: same host,
/// WebSocket scheme, fixed port.
pub fn endpoint_for_origin(origin: &Url, port: u16, path: &str) -> Result<Url> {
    let scheme = match origin.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(anyhow!("unsupported origin scheme: {}", other)),
    };
    if origin.host_str().is_none() {
        return Err(anyhow!("origin has no host: {}", origin));
    }

    let mut endpoint = origin.clone();
    endpoint
        .set_scheme(scheme)
        .map_err(|_| anyhow!("cannot use {} scheme for {}", scheme, origin))?;
    endpoint
        .set_port(Some(port))
        .map_err(|_| anyhow!("cannot set port on {}", origin))?;
    endpoint.set_path(path);
    endpoint.set_query(None);
    endpoint.set_fragment(None);
    Ok(endpoint)
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}
