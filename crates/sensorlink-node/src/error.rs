//! Error types for node operations
//!
//! Wraps radio transport errors and adds the settings, telemetry and
//! service failures of the node layer.

use sensorlink_radio::RadioError;
use thiserror::Error;

/// Main error type for node operations
#[derive(Error, Debug)]
pub enum NodeError {
    // ===== Radio Errors =====
    /// Radio transport failure
    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    /// Radio could not be brought back after a fatal error
    #[error("Radio recovery failed: {0}")]
    RecoveryFailed(RadioError),

    // ===== Settings Errors =====
    /// Settings failed validation
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Settings document is not valid JSON
    #[error("Failed to parse settings: {0}")]
    SettingsParse(#[from] serde_json::Error),

    /// Settings file could not be read
    #[error("Failed to read settings from {path}: {reason}")]
    SettingsIo {
        /// File path
        path: String,
        /// Failure reason
        reason: String,
    },

    // ===== Telemetry Errors =====
    /// Sensor payload shorter than the fixed layout
    #[error("Telemetry payload too short: {size} bytes, expected {expected}")]
    TelemetryTooShort {
        /// Actual payload size
        size: usize,
        /// Required payload size
        expected: usize,
    },

    // ===== Service Errors =====
    /// Service command channel closed
    #[error("Radio service channel closed")]
    ChannelClosed,
}

impl NodeError {
    /// Check if the radio service can no longer make progress
    pub fn is_fatal(&self) -> bool {
        match self {
            NodeError::Radio(err) => err.is_fatal(),
            NodeError::RecoveryFailed(_) | NodeError::ChannelClosed => true,
            _ => false,
        }
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            NodeError::Radio(err) => err.error_code(),
            NodeError::RecoveryFailed(_) => "RECOVERY_FAILED",
            NodeError::InvalidSettings(_) => "INVALID_SETTINGS",
            NodeError::SettingsParse(_) => "SETTINGS_PARSE",
            NodeError::SettingsIo { .. } => "SETTINGS_IO",
            NodeError::TelemetryTooShort { .. } => "TELEMETRY_TOO_SHORT",
            NodeError::ChannelClosed => "CHANNEL_CLOSED",
        }
    }
}

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;
