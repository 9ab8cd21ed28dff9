//! Node settings
//!
//! The settings record handed over by the settings store: radio identity
//! and profile, the role this node plays and its timers. Loaded from JSON.
//!
//! ```json
//! {
//!   "role": "sensor",
//!   "server_address": 1,
//!   "keepalive_interval": "1m",
//!   "radio": { "device_address": 3, "message_signature": 21219 }
//! }
//! ```

use sensorlink_radio::{RadioConfig, BROADCAST_ADDRESS, MAX_DEVICE_ADDRESS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{NodeError, Result};

/// Default keep-alive period
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Default radio poll period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Part this node plays on the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Battery node reporting to a server node
    #[default]
    Sensor,
    /// Mains node collecting reports and forwarding them to a host network
    Bridge,
}

/// Complete node settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Radio identity and profile
    pub radio: RadioConfig,

    /// Sensor or bridge
    #[serde(default)]
    pub role: NodeRole,

    /// Address reports are sent to (sensor role)
    #[serde(default)]
    pub server_address: u8,

    /// Keep-alive period
    #[serde(default = "default_keepalive_interval", with = "humantime_serde")]
    pub keepalive_interval: Duration,

    /// Radio poll period
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

fn default_keepalive_interval() -> Duration {
    DEFAULT_KEEPALIVE_INTERVAL
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

impl NodeSettings {
    /// Settings for a sensor node reporting to `server_address`
    pub fn sensor(radio: RadioConfig, server_address: u8) -> Self {
        Self {
            radio,
            role: NodeRole::Sensor,
            server_address,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Settings for a bridge node
    pub fn bridge(radio: RadioConfig) -> Self {
        Self {
            radio,
            role: NodeRole::Bridge,
            server_address: BROADCAST_ADDRESS,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| NodeError::SettingsIo {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        self.radio.validate()?;

        if self.role == NodeRole::Sensor {
            if self.server_address == BROADCAST_ADDRESS || self.server_address > MAX_DEVICE_ADDRESS
            {
                return Err(NodeError::InvalidSettings(format!(
                    "server_address {} must be in 1..={}",
                    self.server_address, MAX_DEVICE_ADDRESS
                )));
            }
            if self.server_address == self.radio.device_address {
                return Err(NodeError::InvalidSettings(
                    "server_address must differ from device_address".to_string(),
                ));
            }
        }

        if self.keepalive_interval.is_zero() || self.poll_interval.is_zero() {
            return Err(NodeError::InvalidSettings(
                "intervals must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
