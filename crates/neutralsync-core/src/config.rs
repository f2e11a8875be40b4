//! Configuration providers and session options
//!
//! The executor needs two ports before it can synchronize with a scheduler:
//!
//! | Key         | Meaning                                          |
//! |-------------|--------------------------------------------------|
//! | `port.emu`  | Port the executor listens on for `rti.*` calls   |
//! | `port.host` | Port the scheduler listens on for `scheduler.*`  |
//!
//! Both come from a [`ConfigProvider`] passed to the handshake. An unset or
//! empty key disables synchronization for the run; it is not an error.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// Key of the emulator-side (executor) listen port
pub const EMULATOR_PORT_KEY: &str = "port.emu";

/// Key of the host-side (scheduler) port
pub const HOST_PORT_KEY: &str = "port.host";

/// Address under which an emulated device reaches its host's loopback
pub const EMULATOR_HOST_GATEWAY: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 2, 2));

/// Default prefix for [`EnvConfig`]
pub const DEFAULT_ENV_PREFIX: &str = "NEUTRALSYNC";

/// How long the handshake waits for `start()`: 10 polls of 250ms
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_millis(10 * 250);

/// Default bound on the `ready()` round trip
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on opening a connection to the peer
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors reading the port configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The key is unset or empty
    #[error("{0} is not set")]
    Missing(&'static str),

    /// The key is set to something that is not a port
    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        /// The offending key
        key: &'static str,
        /// The raw value
        value: String,
        /// Parse failure
        reason: String,
    },
}

/// Source of configuration values, e.g. system properties or environment.
pub trait ConfigProvider: Send + Sync {
    /// Value for `key`, or `None` if unset
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigProvider for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Reads keys from environment variables.
///
/// `port.emu` with prefix `NEUTRALSYNC` is read from `NEUTRALSYNC_PORT_EMU`.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    prefix: String,
}

impl EnvConfig {
    /// Provider using [`DEFAULT_ENV_PREFIX`]
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Provider using a custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable a key is read from
    pub fn var_name(&self, key: &str) -> String {
        let key: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        if self.prefix.is_empty() {
            key
        } else {
            format!("{}_{}", self.prefix, key)
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigProvider for EnvConfig {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(self.var_name(key)).ok()
    }
}

/// `key=value` property list, as written by `getprop` or a `build.prop` file.
///
/// Blank lines and lines starting with `#` or `!` are ignored. `getprop`'s
/// `[key]: [value]` output format is accepted too.
#[derive(Debug, Clone, Default)]
pub struct PropertiesConfig {
    values: HashMap<String, String>,
}

impl PropertiesConfig {
    /// Parse a property list
    pub fn parse(text: &str) -> Self {
        let mut values = HashMap::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let pair = if let Some(rest) = line.strip_prefix('[') {
                // [port.emu]: [5000]
                rest.split_once("]:").map(|(k, v)| {
                    let v = v.trim();
                    let v = v.strip_prefix('[').unwrap_or(v);
                    (k, v.strip_suffix(']').unwrap_or(v))
                })
            } else {
                line.split_once('=')
            };

            if let Some((key, value)) = pair {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        Self { values }
    }

    /// Read and parse a property file
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    /// Set a value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl ConfigProvider for PropertiesConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// The two ports synchronization needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPorts {
    /// Port the executor's control server listens on
    pub emulator: u16,
    /// Port the scheduler listens on
    pub host: u16,
}

impl SyncPorts {
    /// Read both ports from a provider
    pub fn from_config(config: &dyn ConfigProvider) -> Result<Self, ConfigError> {
        Ok(Self {
            emulator: read_port(config, EMULATOR_PORT_KEY)?,
            host: read_port(config, HOST_PORT_KEY)?,
        })
    }
}

fn read_port(config: &dyn ConfigProvider, key: &'static str) -> Result<u16, ConfigError> {
    let raw = config.get(key).unwrap_or_default();
    let value = raw.trim();
    if value.is_empty() {
        return Err(ConfigError::Missing(key));
    }
    value.parse::<u16>().map_err(|e| ConfigError::Invalid {
        key,
        value: raw.clone(),
        reason: e.to_string(),
    })
}

/// Addresses and time bounds for one synchronization session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Address the scheduler is reached at
    pub host_addr: IpAddr,
    /// Address the control server binds to
    pub listen_addr: IpAddr,
    /// How long the handshake waits for `start()` after `ready()`
    pub start_timeout: Duration,
    /// Bound on the `ready()` round trip
    pub ready_timeout: Duration,
    /// Bound on opening each outbound connection
    pub connect_timeout: Duration,
}

impl SessionOptions {
    /// Reach the scheduler at `addr` instead of the emulator gateway
    pub fn with_host_addr(mut self, addr: IpAddr) -> Self {
        self.host_addr = addr;
        self
    }

    /// Bind the control server to `addr`
    pub fn with_listen_addr(mut self, addr: IpAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Change the start-signal wait bound
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Change the `ready()` bound
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Change the connect bound
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Host and listen address both on loopback, for tests and local runs
    pub fn loopback() -> Self {
        Self::default()
            .with_host_addr(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_listen_addr(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            host_addr: EMULATOR_HOST_GATEWAY,
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            start_timeout: DEFAULT_START_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}
