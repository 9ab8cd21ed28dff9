//! Error types for radio transport operations
//!
//! Delivery failures and queue backpressure are not errors at this layer:
//! they surface as `Ok(false)` from the engine. The variants below cover
//! configuration mistakes, malformed frames and hardware faults.

use thiserror::Error;

use crate::registers::MarcState;

/// Main error type for radio transport operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Device address outside 1..=126
    #[error("Invalid device address {0}: must be in 1..=126")]
    InvalidAddress(u8),

    /// Output power level outside 1..=8
    #[error("Invalid output power level {0}: must be in 1..=8")]
    InvalidPowerLevel(u8),

    // ===== Frame Errors =====
    /// Message data exceeds the 32 byte frame limit
    #[error("Message too large: {size} bytes exceeds frame maximum of {max} bytes")]
    MessageTooLarge {
        /// Actual data size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Burst ended before the frame announced by its length byte
    #[error("Frame truncated: need {needed} bytes, {available} available")]
    FrameTruncated {
        /// Bytes required by the length field
        needed: usize,
        /// Bytes left in the burst
        available: usize,
    },

    /// Payload type byte is neither ACK nor MSG
    #[error("Invalid payload type: 0x{0:02X}")]
    InvalidPayloadType(u8),

    /// Length field inconsistent with the payload type
    #[error("Invalid payload length {length} for {kind}")]
    InvalidLength {
        /// Announced payload length
        length: u8,
        /// Frame kind being decoded
        kind: &'static str,
    },

    // ===== Hardware Errors =====
    /// Transceiver never reported the expected MARC state
    #[error("Radio did not reach {expected:?} after {polls} polls (last state 0x{last_state:02X})")]
    StateTimeout {
        /// State the engine waited for
        expected: MarcState,
        /// Last raw MARCSTATE value read
        last_state: u8,
        /// Number of status reads performed
        polls: u32,
    },

    /// SPI or GPIO failure
    #[error("Bus error: {0}")]
    Bus(String),
}

impl RadioError {
    /// Check if this error requires resetting the transceiver
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RadioError::StateTimeout { .. } | RadioError::Bus(_)
        )
    }

    /// Check if this is a frame error (bad bytes on air)
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            RadioError::FrameTruncated { .. }
                | RadioError::InvalidPayloadType(_)
                | RadioError::InvalidLength { .. }
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            RadioError::InvalidConfig(_) => "INVALID_CONFIG",
            RadioError::InvalidAddress(_) => "INVALID_ADDRESS",
            RadioError::InvalidPowerLevel(_) => "INVALID_POWER_LEVEL",
            RadioError::MessageTooLarge { .. } => "MESSAGE_TOO_LARGE",
            RadioError::FrameTruncated { .. } => "FRAME_TRUNCATED",
            RadioError::InvalidPayloadType(_) => "INVALID_PAYLOAD_TYPE",
            RadioError::InvalidLength { .. } => "INVALID_LENGTH",
            RadioError::StateTimeout { .. } => "STATE_TIMEOUT",
            RadioError::Bus(_) => "BUS_ERROR",
        }
    }
}

/// Result type alias for radio operations
pub type Result<T> = std::result::Result<T, RadioError>;
