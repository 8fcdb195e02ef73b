//! Configuration management for cdp-sock

use crate::{Error, Result};
use phf::phf_map;
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "CDP_SOCK";

/// Timeout class of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    Default,
    Screenshot,
    Navigation,
    Execution,
}

/// Methods that are known to take longer than the default class
static SLOW_METHODS: phf::Map<&'static str, TimeoutClass> = phf_map! {
    "Page.captureScreenshot" => TimeoutClass::Screenshot,
    "Page.captureSnapshot" => TimeoutClass::Screenshot,
    "Page.printToPDF" => TimeoutClass::Screenshot,
    "Page.navigate" => TimeoutClass::Navigation,
    "Page.reload" => TimeoutClass::Navigation,
    "Page.navigateToHistoryEntry" => TimeoutClass::Navigation,
    "Runtime.evaluate" => TimeoutClass::Execution,
    "Runtime.callFunctionOn" => TimeoutClass::Execution,
    "Runtime.awaitPromise" => TimeoutClass::Execution,
};

/// Per-class command timeouts
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default timeout for most commands (seconds)
    pub default_timeout_secs: u64,
    /// Timeout for screenshot commands (seconds)
    pub screenshot_timeout_secs: u64,
    /// Timeout for page navigation commands (seconds)
    pub navigation_timeout_secs: u64,
    /// Timeout for JavaScript execution (seconds)
    pub execution_timeout_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            screenshot_timeout_secs: 90,
            navigation_timeout_secs: 60,
            execution_timeout_secs: 30,
        }
    }
}

impl TimeoutConfig {
    /// Timeout class for a method name
    pub fn class_of(method: &str) -> TimeoutClass {
        SLOW_METHODS
            .get(method)
            .copied()
            .unwrap_or(TimeoutClass::Default)
    }

    /// Get timeout duration for a specific command method
    pub fn timeout_for(&self, method: &str) -> Duration {
        let secs = match Self::class_of(method) {
            TimeoutClass::Default => self.default_timeout_secs,
            TimeoutClass::Screenshot => self.screenshot_timeout_secs,
            TimeoutClass::Navigation => self.navigation_timeout_secs,
            TimeoutClass::Execution => self.execution_timeout_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Debugging endpoint: a `/devtools/` WebSocket URL, or a browser
    /// `host:port` base URL that is resolved through `/json/version`
    pub endpoint: String,

    /// Handshake timeout in seconds
    pub connect_timeout_secs: u64,

    /// Fail `connect()` on an already open socket instead of ignoring it
    pub strict_connect: bool,

    /// Buffered events per stream subscription
    pub event_buffer: usize,

    /// Buffered handler failure reports
    pub failure_buffer: usize,

    /// Command timeouts
    pub timeouts: TimeoutConfig,

    /// Log level used by the probe binary when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:9222".to_string(),
            connect_timeout_secs: 10,
            strict_connect: false,
            event_buffer: 100,
            failure_buffer: 64,
            timeouts: TimeoutConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(format!("{}_{}", ENV_PREFIX, name)).ok()
}

fn parse_env<T: std::str::FromStr>(name: &str, slot: &mut T) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw
            .parse()
            .map_err(|_| Error::configuration(format!("Invalid {}_{}", ENV_PREFIX, name)))?;
    }
    Ok(())
}

impl Config {
    /// Configuration for a specific endpoint, defaults elsewhere
    pub fn with_endpoint<S: Into<String>>(endpoint: S) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Handshake timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Some(endpoint) = env_var("ENDPOINT") {
            config.endpoint = endpoint;
        }
        parse_env("CONNECT_TIMEOUT_SECS", &mut config.connect_timeout_secs)?;
        parse_env("STRICT_CONNECT", &mut config.strict_connect)?;
        parse_env("EVENT_BUFFER", &mut config.event_buffer)?;
        parse_env("FAILURE_BUFFER", &mut config.failure_buffer)?;
        parse_env("DEFAULT_TIMEOUT_SECS", &mut config.timeouts.default_timeout_secs)?;
        parse_env("SCREENSHOT_TIMEOUT_SECS", &mut config.timeouts.screenshot_timeout_secs)?;
        parse_env("NAVIGATION_TIMEOUT_SECS", &mut config.timeouts.navigation_timeout_secs)?;
        parse_env("EXECUTION_TIMEOUT_SECS", &mut config.timeouts.execution_timeout_secs)?;
        if let Some(log_level) = env_var("LOG_LEVEL") {
            config.log_level = log_level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file (optional) overlaid with `CDP_SOCK_*` environment variables.
    ///
    /// Nested keys use a double underscore, e.g. `CDP_SOCK_TIMEOUTS__DEFAULT_TIMEOUT_SECS`.
    pub fn load(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::new(path, ::config::FileFormat::Toml).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::configuration(format!("Failed to load config: {}", e)))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the socket cannot work with
    pub fn validate(&self) -> Result<()> {
        let scheme_ok = ["ws://", "wss://", "http://", "https://"]
            .iter()
            .any(|scheme| self.endpoint.starts_with(scheme));
        if !scheme_ok {
            return Err(Error::configuration(format!(
                "Unsupported endpoint scheme: {}",
                self.endpoint
            )));
        }

        if self.connect_timeout_secs == 0 {
            return Err(Error::configuration("connect_timeout_secs must be positive"));
        }

        let t = &self.timeouts;
        if [
            t.default_timeout_secs,
            t.screenshot_timeout_secs,
            t.navigation_timeout_secs,
            t.execution_timeout_secs,
        ]
        .contains(&0)
        {
            return Err(Error::configuration("command timeouts must be positive"));
        }

        if self.event_buffer == 0 || self.failure_buffer == 0 {
            return Err(Error::configuration("buffer sizes must be positive"));
        }

        Ok(())
    }
}
