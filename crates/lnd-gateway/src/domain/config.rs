//! Gateway configuration with validation.
//!
//! The node address is selected by environment: `test`/`qa` use the testnet
//! port, `prod` the mainnet port, anything else regtest.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const MAIN_NET_PORT: u16 = 8332;
pub const TEST_NET_PORT: u16 = 18332;
pub const REG_TEST_PORT: u16 = 18443;

/// Credential of the stock node setup (`ra:1234`).
pub const DEFAULT_AUTHORIZATION: &str = "Basic cmE6MTIzNA==";

/// Property keys understood by [`GatewayConfig::from_properties`].
pub mod keys {
    pub const ENV: &str = "ra.env";
    pub const DIRECTORY: &str = "ra.lnd.directory";
    pub const HOST: &str = "ra.lnd.host";
    pub const PORT: &str = "ra.lnd.port";
    pub const AUTHORIZATION: &str = "ra.lnd.authorization";
    pub const MAX_IN_FLIGHT: &str = "ra.lnd.maxInFlight";
    pub const TIMEOUT: &str = "ra.lnd.timeout";
}

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Target node
    pub node: NodeConfig,
    /// Pending-call table limits
    pub limits: LimitsConfig,
    /// Deadlines and sweep cadence
    pub timeouts: TimeoutConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_in_flight == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_in_flight cannot be 0".into(),
            ));
        }

        if self.limits.inbound_buffer == 0 {
            return Err(ConfigError::InvalidLimit(
                "inbound_buffer cannot be 0".into(),
            ));
        }

        if self.timeouts.default.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "default timeout cannot be 0".into(),
            ));
        }

        if self.timeouts.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "sweep interval cannot be 0".into(),
            ));
        }

        if self.node.authorization.trim().is_empty() {
            return Err(ConfigError::Invalid("authorization cannot be empty".into()));
        }

        self.node.rpc_url().map(|_| ())
    }

    /// Build configuration from `ra.*` properties. Missing keys keep their defaults.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(env) = props.get(keys::ENV) {
            config.node.environment = env.parse()?;
        }
        if let Some(dir) = props.get(keys::DIRECTORY) {
            config.node.directory = PathBuf::from(dir);
        }
        if let Some(host) = props.get(keys::HOST) {
            config.node.host = host.clone();
        }
        if let Some(port) = props.get(keys::PORT) {
            let port = port
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid(format!("invalid port: {port}")))?;
            config.node.port_override = Some(port);
        }
        if let Some(auth) = props.get(keys::AUTHORIZATION) {
            config.node.authorization = auth.clone();
        }
        if let Some(max) = props.get(keys::MAX_IN_FLIGHT) {
            config.limits.max_in_flight = max
                .parse()
                .map_err(|_| ConfigError::InvalidLimit(format!("invalid max in flight: {max}")))?;
        }
        if let Some(timeout) = props.get(keys::TIMEOUT) {
            config.timeouts.default = humantime_serde::parse_duration(timeout)
                .map_err(|e| ConfigError::InvalidTimeout(format!("{timeout}: {e}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from environment variables.
    ///
    /// - `RA_ENV`: environment (test, qa, prod; anything else is regtest)
    /// - `RA_LND_DIRECTORY`: node configuration directory
    /// - `RA_LND_HOST` / `RA_LND_PORT`: node address override
    /// - `RA_LND_AUTHORIZATION`: `Authorization` header value
    /// - `RA_LND_MAX_IN_FLIGHT`: pending-call ceiling
    /// - `RA_LND_TIMEOUT`: default deadline (`30s`, `500ms`, `2m`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mapping = [
            ("RA_ENV", keys::ENV),
            ("RA_LND_DIRECTORY", keys::DIRECTORY),
            ("RA_LND_HOST", keys::HOST),
            ("RA_LND_PORT", keys::PORT),
            ("RA_LND_AUTHORIZATION", keys::AUTHORIZATION),
            ("RA_LND_MAX_IN_FLIGHT", keys::MAX_IN_FLIGHT),
            ("RA_LND_TIMEOUT", keys::TIMEOUT),
        ];
        let props: HashMap<String, String> = mapping
            .iter()
            .filter_map(|(var, key)| {
                std::env::var(var)
                    .ok()
                    .map(|value| (key.to_string(), value))
            })
            .collect();
        Self::from_properties(&props)
    }
}

/// Network the target node runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Main,
    Test,
    #[default]
    RegTest,
}

impl Environment {
    /// Default RPC port for this network
    pub fn default_port(&self) -> u16 {
        match self {
            Environment::Main => MAIN_NET_PORT,
            Environment::Test => TEST_NET_PORT,
            Environment::RegTest => REG_TEST_PORT,
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    /// `test`/`qa` → testnet, `prod` → mainnet, anything else → regtest.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "test" | "qa" => Environment::Test,
            "prod" => Environment::Main,
            _ => Environment::RegTest,
        })
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Main => "main",
            Environment::Test => "test",
            Environment::RegTest => "regtest",
        };
        f.write_str(name)
    }
}

/// Target node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub environment: Environment,
    /// Host of the node's RPC listener
    pub host: String,
    /// Explicit port; the environment's default port otherwise
    pub port_override: Option<u16>,
    /// Node configuration directory
    pub directory: PathBuf,
    /// `Authorization` header sent with every call
    pub authorization: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            host: "localhost".to_string(),
            port_override: None,
            directory: default_node_directory(),
            authorization: DEFAULT_AUTHORIZATION.to_string(),
        }
    }
}

impl NodeConfig {
    pub fn port(&self) -> u16 {
        self.port_override
            .unwrap_or_else(|| self.environment.default_port())
    }

    /// Base URL request paths are resolved against.
    pub fn rpc_url(&self) -> Result<Url, ConfigError> {
        let raw = format!("http://{}:{}/", self.host, self.port());
        Url::parse(&raw).map_err(|e| ConfigError::Invalid(format!("node address {raw}: {e}")))
    }
}

fn default_node_directory() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join("snap/lightning/common/.lightning/")
}

/// Pending-call table limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum entries across the client and internal tables
    pub max_in_flight: usize,
    /// Capacity of the inbound response queue
    pub inbound_buffer: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 1024,
            inbound_buffer: 256,
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for calls dispatched without an explicit one
    #[serde(with = "humantime_serde")]
    pub default: Duration,
    /// How often overdue entries are swept
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .ok()
                .and_then(|m| m.checked_mul(60))
                .map(Duration::from_secs)
                .ok_or("invalid minutes")
        } else {
            // Try parsing as plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
