//! Sub-GHz packet radio transport for battery sensor nodes
//!
//! This crate drives a CC1101-class transceiver and turns its unreliable,
//! shared, half-duplex channel into an addressed, validated, acknowledged
//! messaging primitive with a bounded receive queue.
//!
//! # Architecture
//!
//! Components, leaf to root:
//!
//! 1. **Register Driver** - [`RegisterBus`] single and burst register access
//!    and command strobes, implemented over `embedded-hal` SPI
//! 2. **Profiles** - static register images per modulation and ISM band
//! 3. **Frame Codec** - on-air header and message layout, burst splitting
//! 4. **Delivery Engine** - transmit, ACK window, bounded retries
//! 5. **Inbound Queue** - fixed ring of pages between reception and the
//!    application
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sensorlink_radio::{Message, RadioConfigBuilder, RadioEngine, SpiRegisterBus};
//!
//! let config = RadioConfigBuilder::new()
//!     .device_address(3)
//!     .message_signature(0x52E3)
//!     .build();
//!
//! let bus = SpiRegisterBus::new(spi_device, gdo2_pin);
//! let mut radio = RadioEngine::from_config(bus, delay, &config)?;
//!
//! // Unicast with up to 3 retransmissions
//! let delivered = radio.post_message(1, &Message::new(0, readings), 3)?;
//!
//! // Service the radio periodically
//! if radio.poll()? {
//!     while let Some((sender, message)) = radio.get_message() {
//!         println!("{} sent type {}", sender, message.message_type);
//!     }
//! }
//! ```
//!
//! # Frame Format
//!
//! - Byte 0: length of the rest of the frame
//! - Byte 1: recipient address (0 = broadcast)
//! - Byte 2: sender address
//! - Bytes 3-4: network signature (little-endian u16)
//! - Byte 5: payload type (0x00 ACK, 0x01 MSG)
//! - MSG only: message type, data length, up to **32 bytes** of data

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Hardware access
pub mod driver;
pub mod registers;

// Configuration
pub mod config;
pub mod error;
pub mod profiles;

// Transport
pub mod engine;
pub mod frame;
pub mod queue;

// Testing utilities
pub mod test_utils;

pub use config::{DeviceIdentity, RadioConfig, RadioConfigBuilder, MAX_RETRY_LIMIT};
pub use driver::{RegisterBus, SpiRegisterBus};
pub use engine::{decode_page, EngineState, EngineStats, RadioEngine};
pub use error::{RadioError, Result};
pub use frame::{
    decode_one, split_burst, DecodedFrame, Frame, FrameBody, FrameHeader, LinkQuality, Message,
    PayloadType, BROADCAST_ADDRESS, MAX_DATA_LENGTH, MAX_DEVICE_ADDRESS,
};
pub use profiles::{IsmBand, Modulation, OutputPower, RadioProfile};
pub use queue::{InboundQueue, QueueStats, PAGE_SIZE, QUEUE_CAPACITY};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
