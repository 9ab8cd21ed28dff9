//! Sensor and bridge node runtime for the sensorlink radio transport
//!
//! This crate sits on top of [`sensorlink_radio`] and provides what a node
//! needs around the transport:
//!
//! - **Settings** - JSON-loadable node settings with validation
//! - **Telemetry** - sensor readings and keep-alive message types
//! - **Radio Service** - an async task owning the engine, publishing
//!   received messages and sending keep-alives on a timer
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sensorlink_node::{NodeSettings, RadioService, SensorReadings};
//! use sensorlink_radio::SpiRegisterBus;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = NodeSettings::from_file("/etc/sensorlink.json")?;
//!     let bus = SpiRegisterBus::new(spi_device, gdo2_pin);
//!
//!     let (service, handle) = RadioService::start(bus, delay, settings)?;
//!     tokio::spawn(service.run());
//!
//!     let delivered = handle.send_readings(&SensorReadings {
//!         temperature: 21.4,
//!         humidity: 48.0,
//!         partial_pressure: 12.2,
//!         dew_point: 10.1,
//!     }).await?;
//!     println!("delivered: {}", delivered);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod service;
pub mod settings;
pub mod telemetry;

pub use error::{NodeError, Result};
pub use service::{InboundMessage, RadioHandle, RadioService, ServiceCommand, ServiceStats};
pub use settings::{NodeRole, NodeSettings, DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_POLL_INTERVAL};
pub use telemetry::{keep_alive, MessageKind, SensorReadings, Telemetry, SENSOR_READINGS_SIZE};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
