//! Register/strobe driver for the transceiver
//!
//! [`RegisterBus`] is the seam between the transport engine and the radio
//! hardware. It knows register addresses and SPI header bits but nothing
//! about frames. [`SpiRegisterBus`] implements it over `embedded-hal` 1.0
//! traits, where the `SpiDevice` owns chip-select framing for every
//! transaction.

use embedded_hal::digital::InputPin;
use embedded_hal::spi::{Operation, SpiDevice};
use tracing::trace;

use crate::error::{RadioError, Result};
use crate::registers::{read_header, Strobe};

/// Trait for transceiver register access
///
/// Every method is one bus transaction. Implementations pass bytes through
/// without interpreting them.
pub trait RegisterBus {
    /// Read a single configuration or status register
    fn read_register(&mut self, address: u8) -> Result<u8>;

    /// Write a single configuration register
    fn write_register(&mut self, address: u8, value: u8) -> Result<()>;

    /// Burst read `buffer.len()` bytes after sending `command`
    fn read_burst(&mut self, command: u8, buffer: &mut [u8]) -> Result<()>;

    /// Burst write `data` after sending `command`
    fn write_burst(&mut self, command: u8, data: &[u8]) -> Result<()>;

    /// Issue a command strobe
    fn strobe(&mut self, strobe: Strobe) -> Result<()>;

    /// Level of the GDO2 line (asserted when a packet is waiting)
    fn packet_ready(&mut self) -> Result<bool>;
}

impl<T: RegisterBus + ?Sized> RegisterBus for &mut T {
    fn read_register(&mut self, address: u8) -> Result<u8> {
        (**self).read_register(address)
    }

    fn write_register(&mut self, address: u8, value: u8) -> Result<()> {
        (**self).write_register(address, value)
    }

    fn read_burst(&mut self, command: u8, buffer: &mut [u8]) -> Result<()> {
        (**self).read_burst(command, buffer)
    }

    fn write_burst(&mut self, command: u8, data: &[u8]) -> Result<()> {
        (**self).write_burst(command, data)
    }

    fn strobe(&mut self, strobe: Strobe) -> Result<()> {
        (**self).strobe(strobe)
    }

    fn packet_ready(&mut self) -> Result<bool> {
        (**self).packet_ready()
    }
}

/// SPI implementation of [`RegisterBus`]
pub struct SpiRegisterBus<SPI, GDO> {
    spi: SPI,
    gdo2: GDO,
}

impl<SPI, GDO> SpiRegisterBus<SPI, GDO>
where
    SPI: SpiDevice,
    GDO: InputPin,
{
    /// Create a bus from an SPI device and the GDO2 input line
    pub fn new(spi: SPI, gdo2: GDO) -> Self {
        Self { spi, gdo2 }
    }

    /// Release the underlying peripherals
    pub fn release(self) -> (SPI, GDO) {
        (self.spi, self.gdo2)
    }
}

fn spi_error<E: embedded_hal::spi::Error>(err: E) -> RadioError {
    RadioError::Bus(format!("spi: {:?}", err.kind()))
}

fn pin_error<E: embedded_hal::digital::Error>(err: E) -> RadioError {
    RadioError::Bus(format!("gdo2: {:?}", err.kind()))
}

impl<SPI, GDO> RegisterBus for SpiRegisterBus<SPI, GDO>
where
    SPI: SpiDevice,
    GDO: InputPin,
{
    fn read_register(&mut self, address: u8) -> Result<u8> {
        let mut frame = [read_header(address), 0x00];
        self.spi.transfer_in_place(&mut frame).map_err(spi_error)?;
        trace!("read register 0x{:02X} -> 0x{:02X}", address, frame[1]);
        Ok(frame[1])
    }

    fn write_register(&mut self, address: u8, value: u8) -> Result<()> {
        trace!("write register 0x{:02X} <- 0x{:02X}", address, value);
        self.spi.write(&[address, value]).map_err(spi_error)
    }

    fn read_burst(&mut self, command: u8, buffer: &mut [u8]) -> Result<()> {
        self.spi
            .transaction(&mut [Operation::Write(&[command]), Operation::Read(buffer)])
            .map_err(spi_error)
    }

    fn write_burst(&mut self, command: u8, data: &[u8]) -> Result<()> {
        self.spi
            .transaction(&mut [Operation::Write(&[command]), Operation::Write(data)])
            .map_err(spi_error)
    }

    fn strobe(&mut self, strobe: Strobe) -> Result<()> {
        trace!(?strobe, "strobe");
        self.spi.write(&[strobe.command()]).map_err(spi_error)
    }

    fn packet_ready(&mut self) -> Result<bool> {
        self.gdo2.is_high().map_err(pin_error)
    }
}
