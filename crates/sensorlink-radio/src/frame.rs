//! On-air frame codec
//!
//! # Frame Layout
//!
//! ```text
//! [length:1][recipient:1][sender:1][token:2 LE][type:1]   header
//! [msg_type:1][data_len:1][data:0..32]                     MSG body only
//! [rssi:1][lqi:1]                                          appended on RX
//! ```
//!
//! `length` counts the bytes that follow it, so an ACK carries 5 and a MSG
//! carries `7 + data_len`. The transceiver appends the two status bytes to
//! every received frame; they are not counted by `length`.
//!
//! One FIFO burst can hold several back-to-back frames. [`split_burst`]
//! walks them lazily.

use bytes::{BufMut, Bytes, BytesMut};
use std::iter::FusedIterator;

use crate::error::{RadioError, Result};

/// Reserved recipient meaning "everyone, no acknowledgment"
pub const BROADCAST_ADDRESS: u8 = 0;

/// Highest assignable device address
pub const MAX_DEVICE_ADDRESS: u8 = 126;

/// Serialized header size, length byte included
pub const HEADER_SIZE: usize = 6;

/// Message type and data length bytes
pub const MESSAGE_OVERHEAD: usize = 2;

/// Maximum message data length
pub const MAX_DATA_LENGTH: usize = 32;

/// Largest serialized header plus message
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MESSAGE_OVERHEAD + MAX_DATA_LENGTH;

/// RSSI and LQI bytes appended by the receiver
pub const TRAILER_SIZE: usize = 2;

/// Length field value of an ACK frame
const ACK_PAYLOAD_LENGTH: u8 = (HEADER_SIZE - 1) as u8;

/// RSSI offset for the 868 MHz band, in dB
const RSSI_OFFSET_DB: i16 = 74;

/// Payload type discriminator
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    /// Acknowledgment, header only
    Ack = 0x00,
    /// Application message
    Msg = 0x01,
}

impl TryFrom<u8> for PayloadType {
    type Error = RadioError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Ack),
            0x01 => Ok(Self::Msg),
            other => Err(RadioError::InvalidPayloadType(other)),
        }
    }
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Bytes following the length field
    pub payload_length: u8,
    /// Destination address
    pub recipient: u8,
    /// Source address
    pub sender: u8,
    /// Network signature
    pub token: u16,
    /// ACK or MSG
    pub payload_type: PayloadType,
}

/// Application message carried by a MSG frame
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// Application discriminator
    pub message_type: u8,
    /// Opaque data, at most [`MAX_DATA_LENGTH`] bytes on air
    pub data: Bytes,
}

impl Message {
    /// Create a message
    pub fn new(message_type: u8, data: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            data: data.into(),
        }
    }

    /// Create a message without data
    pub fn empty(message_type: u8) -> Self {
        Self::new(message_type, Bytes::new())
    }

    /// Check the data fits in a frame
    pub fn fits(&self) -> bool {
        self.data.len() <= MAX_DATA_LENGTH
    }
}

/// Frame body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    /// Acknowledgment
    Ack,
    /// Application message
    Msg(Message),
}

/// A frame ready for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Destination address
    pub recipient: u8,
    /// Source address
    pub sender: u8,
    /// Network signature
    pub token: u16,
    /// ACK or message
    pub body: FrameBody,
}

impl Frame {
    /// Build a MSG frame
    pub fn message(recipient: u8, sender: u8, token: u16, message: Message) -> Self {
        Self {
            recipient,
            sender,
            token,
            body: FrameBody::Msg(message),
        }
    }

    /// Build an ACK frame
    pub fn ack(recipient: u8, sender: u8, token: u16) -> Self {
        Self {
            recipient,
            sender,
            token,
            body: FrameBody::Ack,
        }
    }

    /// Payload type of this frame
    pub fn payload_type(&self) -> PayloadType {
        match self.body {
            FrameBody::Ack => PayloadType::Ack,
            FrameBody::Msg(_) => PayloadType::Msg,
        }
    }

    /// Serialized size, length byte included
    pub fn encoded_len(&self) -> usize {
        match &self.body {
            FrameBody::Ack => HEADER_SIZE,
            FrameBody::Msg(message) => HEADER_SIZE + MESSAGE_OVERHEAD + message.data.len(),
        }
    }

    /// Header as it appears on air
    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            payload_length: (self.encoded_len() - 1) as u8,
            recipient: self.recipient,
            sender: self.sender,
            token: self.token,
            payload_type: self.payload_type(),
        }
    }

    fn check_size(&self) -> Result<()> {
        if let FrameBody::Msg(message) = &self.body {
            if !message.fits() {
                return Err(RadioError::MessageTooLarge {
                    size: message.data.len(),
                    max: MAX_DATA_LENGTH,
                });
            }
        }
        Ok(())
    }

    /// Serialize into `buf`, returning the number of bytes written
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize> {
        self.check_size()?;
        let len = self.encoded_len();
        if buf.len() < len {
            return Err(RadioError::FrameTruncated {
                needed: len,
                available: buf.len(),
            });
        }

        let header = self.header();
        buf[0] = header.payload_length;
        buf[1] = header.recipient;
        buf[2] = header.sender;
        buf[3..5].copy_from_slice(&header.token.to_le_bytes());
        buf[5] = header.payload_type as u8;

        if let FrameBody::Msg(message) = &self.body {
            buf[6] = message.message_type;
            buf[7] = message.data.len() as u8;
            buf[8..len].copy_from_slice(&message.data);
        }

        Ok(len)
    }

    /// Serialize into a new buffer
    pub fn encode(&self) -> Result<Bytes> {
        self.check_size()?;
        let header = self.header();
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(header.payload_length);
        buf.put_u8(header.recipient);
        buf.put_u8(header.sender);
        buf.put_u16_le(header.token);
        buf.put_u8(header.payload_type as u8);

        if let FrameBody::Msg(message) = &self.body {
            buf.put_u8(message.message_type);
            buf.put_u8(message.data.len() as u8);
            buf.put_slice(&message.data);
        }

        Ok(buf.freeze())
    }
}

/// Signal quality appended by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkQuality {
    /// Received signal strength in dBm
    pub rssi_dbm: i16,
    /// Link quality indicator (0..=127, lower is better)
    pub lqi: u8,
    /// Hardware CRC check result
    pub crc_ok: bool,
}

impl LinkQuality {
    /// Convert the raw trailer bytes
    pub fn from_raw(rssi: u8, lqi: u8) -> Self {
        let rssi = rssi as i16;
        let rssi_dbm = if rssi >= 128 {
            (rssi - 256) / 2 - RSSI_OFFSET_DB
        } else {
            rssi / 2 - RSSI_OFFSET_DB
        };

        Self {
            rssi_dbm,
            lqi: lqi & 0x7F,
            crc_ok: lqi & 0x80 != 0,
        }
    }
}

/// One frame sliced out of a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Frame header
    pub header: FrameHeader,
    /// Message body, `None` for ACK frames
    pub message: Option<Message>,
    /// Trailer, when present in the buffer
    pub link: Option<LinkQuality>,
    /// Bytes this frame occupies in a burst, trailer included
    pub consumed: usize,
}

impl DecodedFrame {
    /// Convert back into a transmittable frame
    pub fn into_frame(self) -> Frame {
        let body = match self.message {
            Some(message) => FrameBody::Msg(message),
            None => FrameBody::Ack,
        };
        Frame {
            recipient: self.header.recipient,
            sender: self.header.sender,
            token: self.header.token,
            body,
        }
    }
}

/// Decode one frame starting at `offset`
pub fn decode_one(buffer: &[u8], offset: usize) -> Result<DecodedFrame> {
    let available = buffer.len().saturating_sub(offset);
    if available < HEADER_SIZE {
        return Err(RadioError::FrameTruncated {
            needed: HEADER_SIZE,
            available,
        });
    }

    let bytes = &buffer[offset..];
    let payload_length = bytes[0];
    let frame_len = payload_length as usize + 1;
    if available < frame_len {
        return Err(RadioError::FrameTruncated {
            needed: frame_len,
            available,
        });
    }

    let payload_type = PayloadType::try_from(bytes[5])?;
    let header = FrameHeader {
        payload_length,
        recipient: bytes[1],
        sender: bytes[2],
        token: u16::from_le_bytes([bytes[3], bytes[4]]),
        payload_type,
    };

    let message = match payload_type {
        PayloadType::Ack => {
            if payload_length != ACK_PAYLOAD_LENGTH {
                return Err(RadioError::InvalidLength {
                    length: payload_length,
                    kind: "ACK",
                });
            }
            None
        }
        PayloadType::Msg => {
            if frame_len < HEADER_SIZE + MESSAGE_OVERHEAD {
                return Err(RadioError::InvalidLength {
                    length: payload_length,
                    kind: "MSG",
                });
            }
            let data_len = bytes[7] as usize;
            if data_len > MAX_DATA_LENGTH || frame_len != HEADER_SIZE + MESSAGE_OVERHEAD + data_len
            {
                return Err(RadioError::InvalidLength {
                    length: payload_length,
                    kind: "MSG",
                });
            }
            Some(Message::new(
                bytes[6],
                Bytes::copy_from_slice(&bytes[8..frame_len]),
            ))
        }
    };

    let link = bytes
        .get(frame_len..frame_len + TRAILER_SIZE)
        .map(|trailer| LinkQuality::from_raw(trailer[0], trailer[1]));

    Ok(DecodedFrame {
        header,
        message,
        link,
        consumed: frame_len + TRAILER_SIZE,
    })
}

/// Lazily slice the frames out of one FIFO burst
///
/// Only the first `total_length` bytes of `buffer` are considered.
pub fn split_burst(buffer: &[u8], total_length: usize) -> BurstFrames<'_> {
    let end = total_length.min(buffer.len());
    BurstFrames {
        buffer: &buffer[..end],
        offset: 0,
        done: false,
    }
}

/// Iterator over the frames of a burst
///
/// Stops once the burst is exhausted or after the first malformed frame.
#[derive(Debug)]
pub struct BurstFrames<'a> {
    buffer: &'a [u8],
    offset: usize,
    done: bool,
}

impl Iterator for BurstFrames<'_> {
    type Item = Result<DecodedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.buffer.len() {
            return None;
        }

        match decode_one(self.buffer, self.offset) {
            Ok(frame) => {
                self.offset += frame.consumed;
                Some(Ok(frame))
            }
            Err(err) => {
                // A bad length byte leaves no way to find the next frame
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for BurstFrames<'_> {}
