//! Application messages exchanged between sensor and bridge nodes
//!
//! The `message_type` byte of a radio [`Message`] selects the payload:
//!
//! | Type | Kind          | Data                                  |
//! |------|---------------|---------------------------------------|
//! | 0    | Sensor values | 8 bytes, see [`SensorReadings`]       |
//! | 1    | Keep-alive    | none                                  |
//!
//! Each reading travels as a whole part byte followed by a hundredths byte.
//! Temperature and dew point are signed (two's complement, both bytes carry
//! the sign); humidity and partial pressure are unsigned. Values outside the
//! representable range saturate.

use bytes::Bytes;
use sensorlink_radio::Message;
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};

/// Size of an encoded [`SensorReadings`]
pub const SENSOR_READINGS_SIZE: usize = 8;

/// Application message discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Sensor readings report
    SensorValues,
    /// Liveness report without data
    KeepAlive,
    /// Type this node does not interpret
    Unknown(u8),
}

impl From<u8> for MessageKind {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::SensorValues,
            1 => Self::KeepAlive,
            other => Self::Unknown(other),
        }
    }
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::SensorValues => 0,
            MessageKind::KeepAlive => 1,
            MessageKind::Unknown(other) => other,
        }
    }
}

/// One set of environmental readings
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorReadings {
    /// Temperature in degrees Celsius
    pub temperature: f32,
    /// Relative humidity in percent
    pub humidity: f32,
    /// Water vapour partial pressure in hPa
    pub partial_pressure: f32,
    /// Dew point in degrees Celsius
    pub dew_point: f32,
}

impl SensorReadings {
    /// Encode as quotient/hundredths pairs
    pub fn encode(&self) -> [u8; SENSOR_READINGS_SIZE] {
        let [t0, t1] = encode_signed(self.temperature);
        let [h0, h1] = encode_unsigned(self.humidity);
        let [p0, p1] = encode_unsigned(self.partial_pressure);
        let [d0, d1] = encode_signed(self.dew_point);
        [t0, t1, h0, h1, p0, p1, d0, d1]
    }

    /// Decode from quotient/hundredths pairs
    ///
    /// Extra trailing bytes are ignored.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < SENSOR_READINGS_SIZE {
            return Err(NodeError::TelemetryTooShort {
                size: data.len(),
                expected: SENSOR_READINGS_SIZE,
            });
        }

        Ok(Self {
            temperature: decode_signed(data[0], data[1]),
            humidity: decode_unsigned(data[2], data[3]),
            partial_pressure: decode_unsigned(data[4], data[5]),
            dew_point: decode_signed(data[6], data[7]),
        })
    }

    /// Wrap into a radio message
    pub fn to_message(&self) -> Message {
        Message::new(
            MessageKind::SensorValues.into(),
            Bytes::copy_from_slice(&self.encode()),
        )
    }
}

fn encode_signed(value: f32) -> [u8; 2] {
    let hundredths = (value * 100.0).round() as i32;
    let hundredths = hundredths.clamp(i8::MIN as i32 * 100, i8::MAX as i32 * 100 + 99);
    let whole = (hundredths / 100) as i8;
    let fraction = (hundredths % 100) as i8;
    [whole as u8, fraction as u8]
}

fn decode_signed(whole: u8, fraction: u8) -> f32 {
    whole as i8 as f32 + fraction as i8 as f32 / 100.0
}

fn encode_unsigned(value: f32) -> [u8; 2] {
    let hundredths = ((value * 100.0).round() as i32).clamp(0, u8::MAX as i32 * 100 + 99);
    [(hundredths / 100) as u8, (hundredths % 100) as u8]
}

fn decode_unsigned(whole: u8, fraction: u8) -> f32 {
    whole as f32 + fraction as f32 / 100.0
}

/// Decoded application message
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    /// Sensor readings report
    SensorValues(SensorReadings),
    /// Liveness report
    KeepAlive,
    /// Uninterpreted message
    Other(Message),
}

impl Telemetry {
    /// Interpret a radio message
    pub fn from_message(message: &Message) -> Result<Self> {
        Ok(match MessageKind::from(message.message_type) {
            MessageKind::SensorValues => Self::SensorValues(SensorReadings::decode(&message.data)?),
            MessageKind::KeepAlive => Self::KeepAlive,
            MessageKind::Unknown(_) => Self::Other(message.clone()),
        })
    }

    /// Build the radio message
    pub fn to_message(&self) -> Message {
        match self {
            Self::SensorValues(readings) => readings.to_message(),
            Self::KeepAlive => keep_alive(),
            Self::Other(message) => message.clone(),
        }
    }

    /// Message discriminator
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::SensorValues(_) => MessageKind::SensorValues,
            Self::KeepAlive => MessageKind::KeepAlive,
            Self::Other(message) => MessageKind::from(message.message_type),
        }
    }
}

/// Keep-alive message
pub fn keep_alive() -> Message {
    Message::empty(MessageKind::KeepAlive.into())
}
