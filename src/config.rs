//! Settings file loading and validation.
//!
//! The file is deserialized into [`Settings`] with `confy`, then checked and
//! normalized into an immutable [`ProxyConfig`]. Every duration is parsed here,
//! so nothing downstream can fail on configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_MAX_BODY_SIZE: usize = 4 * 1024 * 1024;
/// Longest accepted timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {0} does not exist")]
    Missing(PathBuf),
    #[error("failed to load config: {0}")]
    Load(#[from] confy::ConfyError),
    #[error("{0} port is not within valid range 1 < port < 65535")]
    InvalidPort(&'static str),
    #[error("invalid {field} timeout {value:?}: {source}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        source: humantime::DurationError,
    },
    #[error("{0} timeout must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("{field} timeout {value:?} exceeds the maximum of 7 days")]
    DurationTooLong { field: &'static str, value: String },
    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub proxy: ProxySettings,
    pub monitoring: MonitoringSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub server: String,
    pub port: u16,
    pub buffer_sizes: BufferSizes,
    pub limits: Limits,
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSizes {
    pub read: i64,
    pub write: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_body_size: i64,
    pub max_conns_per_ip: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub read: String,
    pub write: String,
    pub connect: String,
    /// Lifetime of a CONNECT tunnel. Falls back to `write` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    pub port: u16,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            server: "0.0.0.0".to_string(),
            port: 18080,
            buffer_sizes: BufferSizes::default(),
            limits: Limits::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read: "30s".to_string(),
            write: "30s".to_string(),
            connect: "10s".to_string(),
            tunnel: None,
        }
    }
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self { port: 18081 }
    }
}

/// Validated, immutable configuration handed to the proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub monitoring_addr: SocketAddr,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub max_body_size: usize,
    /// Zero means unlimited.
    pub max_conns_per_ip: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub connect_timeout: Duration,
    pub tunnel_timeout: Duration,
}

impl ProxyConfig {
    /// Loads and validates the settings file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let settings: Settings = confy::load_path(path)?;
        Self::from_settings(settings)
    }

    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        let proxy = &settings.proxy;

        if !valid_port(proxy.port) {
            return Err(ConfigError::InvalidPort("proxy"));
        }
        if !valid_port(settings.monitoring.port) {
            return Err(ConfigError::InvalidPort("monitoring"));
        }

        let read_timeout = parse_timeout("read", &proxy.timeouts.read)?;
        let write_timeout = parse_timeout("write", &proxy.timeouts.write)?;
        let connect_timeout = parse_timeout("connect", &proxy.timeouts.connect)?;
        let tunnel_timeout = match &proxy.timeouts.tunnel {
            Some(value) => parse_timeout("tunnel", value)?,
            None => write_timeout,
        };

        Ok(Self {
            listen_addr: socket_addr(&proxy.server, proxy.port)?,
            monitoring_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), settings.monitoring.port),
            read_buffer_size: positive_or(proxy.buffer_sizes.read, DEFAULT_BUFFER_SIZE),
            write_buffer_size: positive_or(proxy.buffer_sizes.write, DEFAULT_BUFFER_SIZE),
            max_body_size: positive_or(proxy.limits.max_body_size, DEFAULT_MAX_BODY_SIZE),
            max_conns_per_ip: positive_or(proxy.limits.max_conns_per_ip, 0),
            read_timeout,
            write_timeout,
            connect_timeout,
            tunnel_timeout,
        })
    }
}

fn valid_port(port: u16) -> bool {
    port > 1 && port < 65535
}

fn parse_timeout(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let duration = humantime::parse_duration(value.trim()).map_err(|source| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
        source,
    })?;
    if duration.is_zero() {
        return Err(ConfigError::ZeroDuration(field));
    }
    if duration > MAX_TIMEOUT {
        return Err(ConfigError::DurationTooLong {
            field,
            value: value.to_string(),
        });
    }
    Ok(duration)
}

fn positive_or(value: i64, default: usize) -> usize {
    if value <= 0 {
        default
    } else {
        usize::try_from(value).unwrap_or(usize::MAX)
    }
}

fn socket_addr(server: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let host = if server.is_empty() { "0.0.0.0" } else { server };
    let host = match host {
        "localhost" => "127.0.0.1",
        other => other,
    };
    let literal = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    };
    literal.parse().map_err(|_| ConfigError::InvalidAddress(server.to_string()))
}
