//! CC1101 register map, command strobes and SPI header bits
//!
//! Addresses follow the CC1101 datasheet. Configuration registers live at
//! `0x00..=0x2E`; status registers share `0x30..=0x3D` with the strobes and
//! are told apart by the burst bit of the SPI header.

/// Number of configuration registers loaded by a profile
pub const CONFIG_REGISTER_COUNT: usize = 0x2F;

/// Hardware FIFO depth
pub const FIFO_SIZE: usize = 64;

/// Scratch buffer size for FIFO bursts (FIFO plus header slack)
pub const FIFO_BUFFER_SIZE: usize = 0x42;

/// PA table length
pub const PATABLE_SIZE: usize = 8;

/// Single register read header bit
pub const READ_SINGLE: u8 = 0x80;

/// Burst access header bit
pub const BURST: u8 = 0x40;

/// Burst write of the configuration block starting at IOCFG2
pub const WRITE_CONFIG_BURST: u8 = 0x40;

/// Burst write of the PA table
pub const WRITE_PATABLE_BURST: u8 = 0x7E;

/// Burst write into the TX FIFO
pub const TXFIFO_BURST: u8 = 0x7F;

/// Burst read from the RX FIFO
pub const RXFIFO_BURST: u8 = 0xFF;

/// RXBYTES overflow flag
pub const RXBYTES_OVERFLOW: u8 = 0x80;

/// RXBYTES byte count mask
pub const RXBYTES_COUNT_MASK: u8 = 0x7F;

/// MARCSTATE value mask
pub const MARCSTATE_MASK: u8 = 0x1F;

/// Configuration registers written individually by the engine
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigRegister {
    /// Device address
    Addr = 0x09,
    /// Channel number
    Channr = 0x0A,
    /// Frequency control word, high byte
    Freq2 = 0x0D,
    /// Frequency control word, middle byte
    Freq1 = 0x0E,
    /// Frequency control word, low byte
    Freq0 = 0x0F,
    /// Front end TX configuration (PA table index)
    Frend0 = 0x22,
}

impl ConfigRegister {
    /// Register address
    pub const fn address(self) -> u8 {
        self as u8
    }
}

/// Read-only status registers
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusRegister {
    /// Part number
    PartNum = 0x30,
    /// Chip version
    Version = 0x31,
    /// Link quality estimate
    Lqi = 0x33,
    /// Received signal strength
    Rssi = 0x34,
    /// Main radio control state machine state
    MarcState = 0x35,
    /// Underflow flag and TX FIFO byte count
    TxBytes = 0x3A,
    /// Overflow flag and RX FIFO byte count
    RxBytes = 0x3B,
}

impl StatusRegister {
    /// Register address
    pub const fn address(self) -> u8 {
        self as u8
    }
}

/// Command strobes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strobe {
    /// Reset chip
    Sres = 0x30,
    /// Enable and calibrate frequency synthesizer
    Sfstxon = 0x31,
    /// Turn off crystal oscillator
    Sxoff = 0x32,
    /// Calibrate frequency synthesizer and turn it off
    Scal = 0x33,
    /// Enable RX
    Srx = 0x34,
    /// Enable TX
    Stx = 0x35,
    /// Exit RX/TX
    Sidle = 0x36,
    /// Start automatic RX polling (wake on radio)
    Swor = 0x38,
    /// Power down when CSn goes high
    Spwd = 0x39,
    /// Flush the RX FIFO
    Sfrx = 0x3A,
    /// Flush the TX FIFO
    Sftx = 0x3B,
    /// Reset real time clock
    Sworrst = 0x3C,
    /// No operation
    Snop = 0x3D,
}

impl Strobe {
    /// Command byte
    pub const fn command(self) -> u8 {
        self as u8
    }
}

/// Main radio control state machine states (MARCSTATE)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarcState {
    /// Sleep
    Sleep = 0x00,
    /// Idle
    Idle = 0x01,
    /// Crystal oscillator off
    Xoff = 0x02,
    /// Receiving
    Rx = 0x0D,
    /// RX FIFO overflowed
    RxFifoOverflow = 0x11,
    /// Transmitting
    Tx = 0x13,
    /// TX FIFO underflowed
    TxFifoUnderflow = 0x16,
}

impl MarcState {
    /// Raw state value
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Check a raw MARCSTATE read against this state
    pub fn matches(self, raw: u8) -> bool {
        raw & MARCSTATE_MASK == self.value()
    }
}

/// SPI header byte for a single register read
///
/// Status registers need the burst bit to be distinguishable from strobes.
pub fn read_header(address: u8) -> u8 {
    if address >= StatusRegister::PartNum.address() {
        address | READ_SINGLE | BURST
    } else {
        address | READ_SINGLE
    }
}
