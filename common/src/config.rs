// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use std::ops::RangeInclusive;
use std::time::Duration;

pub const DEFAULT_BROKER_HOST: &str = "localhost";
pub const DEFAULT_BROKER_PORT: u16 = 1883;
pub const DEFAULT_DEVICE_ID: &str = "esp32-sim-1";

pub const DEFAULT_WINDOW: usize = 300;
pub const WINDOW_RANGE: RangeInclusive<usize> = 50..=2000;

pub const DEFAULT_REFRESH_SECS: u64 = 2;
pub const REFRESH_RANGE: RangeInclusive<u64> = 1..=10;

pub const DEFAULT_RETENTION: usize = 1000;

/// Rejected configuration values.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("broker host must not be empty")]
    EmptyHost,

    #[error("invalid broker port {0:?}")]
    InvalidPort(String),

    #[error("invalid device id {0:?}: it must be non-empty and free of '/', '+' and '#'")]
    InvalidDeviceId(String),

    #[error("{name} must be a whole number, got {value:?}")]
    NotANumber { name: &'static str, value: String },

    #[error("display window {0} is outside {min}..={max}", min = WINDOW_RANGE.start(), max = WINDOW_RANGE.end())]
    WindowOutOfRange(usize),

    #[error("refresh interval {0}s is outside {min}..={max}", min = REFRESH_RANGE.start(), max = REFRESH_RANGE.end())]
    RefreshOutOfRange(u64),

    #[error("history capacity must be at least 1")]
    ZeroRetention,
}

/// Where to find the broker and which device to follow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub device_id: String,
}

impl ConnectionParams {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        device_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let host = host.into().trim().to_string();
        let device_id = device_id.into().trim().to_string();

        if host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if device_id.is_empty() || device_id.contains(['/', '+', '#']) {
            return Err(ConfigError::InvalidDeviceId(device_id));
        }

        Ok(Self {
            host,
            port,
            device_id,
        })
    }

    /// Same as [`ConnectionParams::new`] with the port given as text, e.g. from a form field.
    pub fn parse(host: &str, port: &str, device_id: &str) -> Result<Self, ConfigError> {
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;
        Self::new(host, port, device_id)
    }

    /// The topic the device publishes its telemetry to.
    pub fn topic(&self) -> String {
        format!("iot/air/{}/telemetry", self.device_id)
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.into(),
            port: DEFAULT_BROKER_PORT,
            device_id: DEFAULT_DEVICE_ID.into(),
        }
    }
}

/// How much history to show and how often to redraw it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplaySettings {
    window: usize,
    refresh_secs: u64,
}

impl DisplaySettings {
    pub fn new(window: usize, refresh_secs: u64) -> Result<Self, ConfigError> {
        if !WINDOW_RANGE.contains(&window) {
            return Err(ConfigError::WindowOutOfRange(window));
        }
        if !REFRESH_RANGE.contains(&refresh_secs) {
            return Err(ConfigError::RefreshOutOfRange(refresh_secs));
        }
        Ok(Self {
            window,
            refresh_secs,
        })
    }

    /// Number of most recent samples shown.
    pub fn window(&self) -> usize {
        self.window
    }

    pub fn refresh_secs(&self) -> u64 {
        self.refresh_secs
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            refresh_secs: DEFAULT_REFRESH_SECS,
        }
    }
}

/// Startup configuration of the dashboard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DashboardConfig {
    pub connection: ConnectionParams,
    pub display: DisplaySettings,
    /// Maximum number of samples retained, independent of the display window.
    pub retention: usize,
}

impl DashboardConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Recognized variables are `MQTT_BROKER_HOST`, `MQTT_BROKER_PORT`, `DEVICE_ID`,
    /// `HISTORY_SIZE`, `REFRESH_SEC` and `HISTORY_CAPACITY`. Unset variables take their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("MQTT_BROKER_HOST").unwrap_or_else(|| DEFAULT_BROKER_HOST.into());
        let port = lookup("MQTT_BROKER_PORT").unwrap_or_else(|| DEFAULT_BROKER_PORT.to_string());
        let device_id = lookup("DEVICE_ID").unwrap_or_else(|| DEFAULT_DEVICE_ID.into());
        let connection = ConnectionParams::parse(&host, &port, &device_id)?;

        let window = number(&lookup, "HISTORY_SIZE", DEFAULT_WINDOW)?;
        let refresh_secs = number(&lookup, "REFRESH_SEC", DEFAULT_REFRESH_SECS)?;
        let display = DisplaySettings::new(window, refresh_secs)?;

        let retention = number(&lookup, "HISTORY_CAPACITY", DEFAULT_RETENTION)?;
        if retention == 0 {
            return Err(ConfigError::ZeroRetention);
        }

        Ok(Self {
            connection,
            display,
            retention,
        })
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionParams::default(),
            display: DisplaySettings::default(),
            retention: DEFAULT_RETENTION,
        }
    }
}

fn number<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::NotANumber { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
fn lookup_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |key: &str| {
        pairs
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.to_string())
    }
}

#[test]
fn test_config_defaults() {
    let config = DashboardConfig::from_lookup(|_| None).unwrap();

    assert_eq!(config, DashboardConfig::default());
    assert_eq!(config.connection.topic(), "iot/air/esp32-sim-1/telemetry");
    assert_eq!(config.display.window(), 300);
    assert_eq!(config.display.refresh_interval(), Duration::from_secs(2));
    assert_eq!(config.retention, 1000);
}

#[test]
fn test_config_from_lookup() {
    let config = DashboardConfig::from_lookup(lookup_from(&[
        ("MQTT_BROKER_HOST", "broker.lan"),
        ("MQTT_BROKER_PORT", "8883"),
        ("DEVICE_ID", "kitchen-01"),
        ("HISTORY_SIZE", "2000"),
        ("REFRESH_SEC", "10"),
        ("HISTORY_CAPACITY", "5000"),
    ]))
    .unwrap();

    assert_eq!(config.connection.host, "broker.lan");
    assert_eq!(config.connection.port, 8883);
    assert_eq!(config.connection.topic(), "iot/air/kitchen-01/telemetry");
    assert_eq!(config.display.window(), 2000);
    assert_eq!(config.display.refresh_secs(), 10);
    assert_eq!(config.retention, 5000);
}

#[test]
fn test_config_rejects_bad_values() {
    let err = |pairs: &'static [(&'static str, &'static str)]| {
        DashboardConfig::from_lookup(lookup_from(pairs)).unwrap_err()
    };

    assert_eq!(
        err(&[("MQTT_BROKER_PORT", "70000")]),
        ConfigError::InvalidPort("70000".into())
    );
    assert_eq!(
        err(&[("DEVICE_ID", "+")]),
        ConfigError::InvalidDeviceId("+".into())
    );
    assert_eq!(err(&[("MQTT_BROKER_HOST", "  ")]), ConfigError::EmptyHost);
    assert_eq!(err(&[("HISTORY_SIZE", "49")]), ConfigError::WindowOutOfRange(49));
    assert_eq!(err(&[("REFRESH_SEC", "0")]), ConfigError::RefreshOutOfRange(0));
    assert_eq!(err(&[("HISTORY_CAPACITY", "0")]), ConfigError::ZeroRetention);
    assert_eq!(
        err(&[("REFRESH_SEC", "fast")]),
        ConfigError::NotANumber {
            name: "REFRESH_SEC",
            value: "fast".into()
        }
    );
}

#[test]
fn test_connection_params_parse() {
    let params = ConnectionParams::parse(" broker ", " 1884 ", " dev-2 ").unwrap();

    assert_eq!(params, ConnectionParams::new("broker", 1884, "dev-2").unwrap());
    assert_eq!(
        ConnectionParams::parse("broker", "abc", "dev").unwrap_err(),
        ConfigError::InvalidPort("abc".into())
    );
}
