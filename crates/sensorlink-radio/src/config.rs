//! Radio configuration
//!
//! [`RadioConfig`] is the settings record handed over by the settings store.
//! Selector fields keep their raw values so that unknown modulation or band
//! selectors can fall back to the default profile instead of failing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RadioError, Result};
use crate::frame::{BROADCAST_ADDRESS, MAX_DEVICE_ADDRESS};
use crate::profiles::{IsmBand, Modulation, OutputPower, RadioProfile};

/// Default number of retransmissions for unicast sends
pub const DEFAULT_MAX_RETRIES: u8 = 3;

/// Upper bound on configured retransmissions
pub const MAX_RETRY_LIMIT: u8 = 10;

/// Default ACK wait after each unicast transmission
pub const DEFAULT_ACK_WINDOW: Duration = Duration::from_millis(300);

/// Default bound on MARCSTATE reads while waiting for a state change
pub const DEFAULT_STATE_POLL_LIMIT: u32 = 10_000;

/// Radio settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Own address (1..=126)
    pub device_address: u8,

    /// Network signature carried in every frame
    pub message_signature: u16,

    /// Retransmissions after the first unicast attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,

    /// Output power level (1..=8, -30 dBm to +10 dBm)
    #[serde(default = "default_output_power")]
    pub output_power: u8,

    /// Modulation selector (1..=6)
    #[serde(default = "default_modulation")]
    pub modulation: u8,

    /// ISM band selector (1..=4)
    #[serde(default = "default_ism_band")]
    pub ism_band: u8,

    /// Channel number written to CHANNR
    #[serde(default = "default_channel")]
    pub channel: u8,

    /// ACK wait per unicast attempt
    #[serde(default = "default_ack_window", with = "humantime_serde")]
    pub ack_window: Duration,

    /// MARCSTATE reads before a state wait gives up
    #[serde(default = "default_state_poll_limit")]
    pub state_poll_limit: u32,
}

fn default_max_retries() -> u8 {
    DEFAULT_MAX_RETRIES
}

fn default_output_power() -> u8 {
    OutputPower::Zero.level()
}

fn default_modulation() -> u8 {
    Modulation::default().selector()
}

fn default_ism_band() -> u8 {
    IsmBand::default().selector()
}

fn default_channel() -> u8 {
    1
}

fn default_ack_window() -> Duration {
    DEFAULT_ACK_WINDOW
}

fn default_state_poll_limit() -> u32 {
    DEFAULT_STATE_POLL_LIMIT
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            device_address: 1,
            message_signature: 0,
            max_retries: default_max_retries(),
            output_power: default_output_power(),
            modulation: default_modulation(),
            ism_band: default_ism_band(),
            channel: default_channel(),
            ack_window: default_ack_window(),
            state_poll_limit: default_state_poll_limit(),
        }
    }
}

impl RadioConfig {
    /// Validate the identity fields
    pub fn identity(&self) -> Result<DeviceIdentity> {
        DeviceIdentity::new(
            self.device_address,
            self.message_signature,
            self.max_retries,
            self.output_power,
        )
    }

    /// Register image for the configured modulation and band
    pub fn profile(&self) -> RadioProfile {
        RadioProfile::from_selectors(self.modulation, self.ism_band)
    }

    /// Validate everything the engine needs at init
    pub fn validate(&self) -> Result<()> {
        self.identity()?;
        if self.state_poll_limit == 0 {
            return Err(RadioError::InvalidConfig(
                "state_poll_limit must be at least 1".to_string(),
            ));
        }
        if self.ack_window.is_zero() {
            return Err(RadioError::InvalidConfig("ack_window must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Validated node identity, fixed at init
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    address: u8,
    signature: u16,
    max_retries: u8,
    output_power: OutputPower,
}

impl DeviceIdentity {
    /// Validate raw identity settings
    pub fn new(address: u8, signature: u16, max_retries: u8, output_power: u8) -> Result<Self> {
        if address == BROADCAST_ADDRESS || address > MAX_DEVICE_ADDRESS {
            return Err(RadioError::InvalidAddress(address));
        }
        let output_power = OutputPower::try_from(output_power)?;
        Ok(Self {
            address,
            signature,
            max_retries,
            output_power,
        })
    }

    /// Own address
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Network signature
    pub fn signature(&self) -> u16 {
        self.signature
    }

    /// Retransmissions used by [`RadioEngine::post`](crate::RadioEngine::post)
    pub fn max_retries(&self) -> u8 {
        self.max_retries
    }

    /// Output power
    pub fn output_power(&self) -> OutputPower {
        self.output_power
    }
}

/// Builder for radio configuration
#[derive(Debug, Default)]
pub struct RadioConfigBuilder {
    config: RadioConfig,
}

impl RadioConfigBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set own address
    pub fn device_address(mut self, address: u8) -> Self {
        self.config.device_address = address;
        self
    }

    /// Set the network signature
    pub fn message_signature(mut self, signature: u16) -> Self {
        self.config.message_signature = signature;
        self
    }

    /// Set retransmissions (clamped to [`MAX_RETRY_LIMIT`])
    pub fn max_retries(mut self, retries: u8) -> Self {
        self.config.max_retries = retries.min(MAX_RETRY_LIMIT);
        self
    }

    /// Set output power
    pub fn output_power(mut self, power: OutputPower) -> Self {
        self.config.output_power = power.level();
        self
    }

    /// Set modulation
    pub fn modulation(mut self, modulation: Modulation) -> Self {
        self.config.modulation = modulation.selector();
        self
    }

    /// Set ISM band
    pub fn ism_band(mut self, band: IsmBand) -> Self {
        self.config.ism_band = band.selector();
        self
    }

    /// Set channel number
    pub fn channel(mut self, channel: u8) -> Self {
        self.config.channel = channel;
        self
    }

    /// Set the ACK window
    pub fn ack_window(mut self, window: Duration) -> Self {
        self.config.ack_window = window;
        self
    }

    /// Set the MARCSTATE poll bound
    pub fn state_poll_limit(mut self, limit: u32) -> Self {
        self.config.state_poll_limit = limit;
        self
    }

    /// Build the configuration
    pub fn build(self) -> RadioConfig {
        self.config
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RadioConfig::default();
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.ack_window, Duration::from_millis(300));
        assert_eq!(config.profile(), RadioProfile::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RadioConfigBuilder::new()
            .device_address(3)
            .message_signature(0x52E3)
            .output_power(OutputPower::Plus10)
            .modulation(Modulation::Gfsk38k4)
            .ism_band(IsmBand::Mhz433)
            .build();

        let identity = config.identity().unwrap();
        assert_eq!(identity.address(), 3);
        assert_eq!(identity.signature(), 0x52E3);
        assert_eq!(identity.output_power(), OutputPower::Plus10);
        assert_eq!(config.profile().band, IsmBand::Mhz433);
    }

    #[test]
    fn test_max_retries_clamping() {
        let config = RadioConfigBuilder::new()
            .max_retries(50) // Should be clamped to MAX_RETRY_LIMIT
            .build();
        assert_eq!(config.max_retries, MAX_RETRY_LIMIT);
    }

    #[test]
    fn test_identity_rejects_bad_address() {
        for address in [0u8, 127, 255] {
            let config = RadioConfigBuilder::new().device_address(address).build();
            assert_eq!(config.identity(), Err(RadioError::InvalidAddress(address)));
        }
    }

    #[test]
    fn test_identity_rejects_bad_power() {
        let mut config = RadioConfig::default();
        config.output_power = 0;
        assert_eq!(config.identity(), Err(RadioError::InvalidPowerLevel(0)));
        config.output_power = 9;
        assert_eq!(config.identity(), Err(RadioError::InvalidPowerLevel(9)));
    }

    #[test]
    fn test_unknown_selectors_fall_back() {
        let mut config = RadioConfig::default();
        config.modulation = 0;
        config.ism_band = 42;
        assert_eq!(config.profile(), RadioProfile::default());
    }

    #[test]
    fn test_json_with_defaults() {
        let json = r#"{ "device_address": 2, "message_signature": 4660, "ack_window": "150ms" }"#;
        let config: RadioConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.device_address, 2);
        assert_eq!(config.message_signature, 0x1234);
        assert_eq!(config.ack_window, Duration::from_millis(150));
        assert_eq!(config.channel, 1);

        let text = serde_json::to_string(&config).unwrap();
        assert!(text.contains("150ms"));
    }

    #[test]
    fn test_validate_rejects_zero_poll_limit() {
        let config = RadioConfigBuilder::new().state_poll_limit(0).build();
        assert!(matches!(
            config.validate(),
            Err(RadioError::InvalidConfig(_))
        ));
    }
}
