//! Static radio configuration profiles
//!
//! Register blocks are indexed by modulation, frequency words and PA tables
//! by ISM band. Raw selectors coming from the settings store that match no
//! known profile resolve to GFSK 100 kb/s on 868.3 MHz.

use crate::error::{RadioError, Result};
use crate::registers::{ConfigRegister, CONFIG_REGISTER_COUNT, PATABLE_SIZE};

/// Baud rate and modulation presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modulation {
    /// GFSK, 1.2 kb/s
    Gfsk1k2,
    /// GFSK, 38.4 kb/s
    Gfsk38k4,
    /// GFSK, 100 kb/s
    #[default]
    Gfsk100k,
    /// MSK, 250 kb/s
    Msk250k,
    /// MSK, 500 kb/s
    Msk500k,
    /// OOK, 4.8 kb/s
    Ook4k8,
}

impl Modulation {
    /// Resolve a raw selector (1..=6), falling back to GFSK 100 kb/s
    pub fn from_selector(selector: u8) -> Self {
        match selector {
            1 => Self::Gfsk1k2,
            2 => Self::Gfsk38k4,
            3 => Self::Gfsk100k,
            4 => Self::Msk250k,
            5 => Self::Msk500k,
            6 => Self::Ook4k8,
            _ => Self::default(),
        }
    }

    /// Raw selector value
    pub fn selector(self) -> u8 {
        match self {
            Self::Gfsk1k2 => 1,
            Self::Gfsk38k4 => 2,
            Self::Gfsk100k => 3,
            Self::Msk250k => 4,
            Self::Msk500k => 5,
            Self::Ook4k8 => 6,
        }
    }

    fn registers(self) -> &'static [u8; CONFIG_REGISTER_COUNT] {
        match self {
            Self::Gfsk1k2 => &GFSK_1_2_KB,
            Self::Gfsk38k4 => &GFSK_38_4_KB,
            Self::Gfsk100k => &GFSK_100_KB,
            Self::Msk250k => &MSK_250_KB,
            Self::Msk500k => &MSK_500_KB,
            Self::Ook4k8 => &OOK_4_8_KB,
        }
    }
}

/// ISM frequency bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsmBand {
    /// 315 MHz
    Mhz315,
    /// 433.92 MHz
    Mhz433,
    /// 868.3 MHz
    #[default]
    Mhz868,
    /// 915 MHz
    Mhz915,
}

impl IsmBand {
    /// Resolve a raw selector (1..=4), falling back to 868 MHz
    pub fn from_selector(selector: u8) -> Self {
        match selector {
            1 => Self::Mhz315,
            2 => Self::Mhz433,
            3 => Self::Mhz868,
            4 => Self::Mhz915,
            _ => Self::default(),
        }
    }

    /// Raw selector value
    pub fn selector(self) -> u8 {
        match self {
            Self::Mhz315 => 1,
            Self::Mhz433 => 2,
            Self::Mhz868 => 3,
            Self::Mhz915 => 4,
        }
    }

    /// FREQ2, FREQ1, FREQ0 for a 26 MHz crystal
    pub fn frequency_word(self) -> [u8; 3] {
        match self {
            Self::Mhz315 => [0x0C, 0x1D, 0x89],
            Self::Mhz433 => [0x10, 0xB0, 0x71],
            Self::Mhz868 => [0x21, 0x65, 0x6A],
            Self::Mhz915 => [0x23, 0x31, 0x3B],
        }
    }

    /// PA table, one entry per [`OutputPower`] level
    pub fn pa_table(self) -> [u8; PATABLE_SIZE] {
        match self {
            Self::Mhz315 => [0x17, 0x1D, 0x26, 0x69, 0x51, 0x86, 0xCC, 0xC3],
            Self::Mhz433 => [0x6C, 0x1C, 0x06, 0x3A, 0x51, 0x85, 0xC8, 0xC0],
            Self::Mhz868 => [0x03, 0x17, 0x1D, 0x26, 0x50, 0x86, 0xCD, 0xC0],
            Self::Mhz915 => [0x0B, 0x1B, 0x6D, 0x67, 0x50, 0x85, 0xC9, 0xC1],
        }
    }
}

/// Output power levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OutputPower {
    /// -30 dBm
    Minus30,
    /// -20 dBm
    Minus20,
    /// -15 dBm
    Minus15,
    /// -10 dBm
    Minus10,
    /// 0 dBm
    Zero,
    /// +5 dBm
    Plus5,
    /// +7 dBm
    Plus7,
    /// +10 dBm
    Plus10,
}

impl OutputPower {
    /// Output power in dBm
    pub fn dbm(self) -> i8 {
        match self {
            Self::Minus30 => -30,
            Self::Minus20 => -20,
            Self::Minus15 => -15,
            Self::Minus10 => -10,
            Self::Zero => 0,
            Self::Plus5 => 5,
            Self::Plus7 => 7,
            Self::Plus10 => 10,
        }
    }

    /// PA table index written to FREND0
    pub fn pa_index(self) -> u8 {
        self as u8
    }

    /// Raw settings level (1..=8)
    pub fn level(self) -> u8 {
        self as u8 + 1
    }
}

impl TryFrom<u8> for OutputPower {
    type Error = RadioError;

    fn try_from(level: u8) -> Result<Self> {
        Ok(match level {
            1 => Self::Minus30,
            2 => Self::Minus20,
            3 => Self::Minus15,
            4 => Self::Minus10,
            5 => Self::Zero,
            6 => Self::Plus5,
            7 => Self::Plus7,
            8 => Self::Plus10,
            _ => return Err(RadioError::InvalidPowerLevel(level)),
        })
    }
}

/// Register image for one modulation/band combination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioProfile {
    /// Modulation preset
    pub modulation: Modulation,
    /// Frequency band
    pub band: IsmBand,
    /// Full configuration block, frequency word applied
    pub config: [u8; CONFIG_REGISTER_COUNT],
    /// PA table for the band
    pub pa_table: [u8; PATABLE_SIZE],
}

impl RadioProfile {
    /// Build the register image for a modulation and band
    pub fn new(modulation: Modulation, band: IsmBand) -> Self {
        let mut config = *modulation.registers();
        let [freq2, freq1, freq0] = band.frequency_word();
        config[ConfigRegister::Freq2.address() as usize] = freq2;
        config[ConfigRegister::Freq1.address() as usize] = freq1;
        config[ConfigRegister::Freq0.address() as usize] = freq0;

        Self {
            modulation,
            band,
            config,
            pa_table: band.pa_table(),
        }
    }

    /// Build from raw settings selectors
    pub fn from_selectors(modulation: u8, band: u8) -> Self {
        Self::new(Modulation::from_selector(modulation), IsmBand::from_selector(band))
    }
}

impl Default for RadioProfile {
    fn default() -> Self {
        Self::new(Modulation::default(), IsmBand::default())
    }
}

const GFSK_1_2_KB: [u8; CONFIG_REGISTER_COUNT] = [
    0x07, 0x2E, 0x80, 0x07, 0x57, 0x43, 0x3E, 0x0E, 0x45, 0xFF, 0x00, 0x08, 0x00, 0x21, 0x65, 0x6A,
    0xF5, 0x83, 0x13, 0xA0, 0xF8, 0x15, 0x07, 0x0C, 0x18, 0x16, 0x6C, 0x03, 0x40, 0x91, 0x02, 0x26,
    0x09, 0x56, 0x17, 0xA9, 0x0A, 0x00, 0x11, 0x41, 0x00, 0x59, 0x7F, 0x3F, 0x81, 0x3F, 0x0B,
];

const GFSK_38_4_KB: [u8; CONFIG_REGISTER_COUNT] = [
    0x07, 0x2E, 0x80, 0x07, 0x57, 0x43, 0x3E, 0x0E, 0x45, 0xFF, 0x00, 0x06, 0x00, 0x21, 0x65, 0x6A,
    0xCA, 0x83, 0x13, 0xA0, 0xF8, 0x34, 0x07, 0x0C, 0x18, 0x16, 0x6C, 0x43, 0x40, 0x91, 0x02, 0x26,
    0x09, 0x56, 0x17, 0xA9, 0x0A, 0x00, 0x11, 0x41, 0x00, 0x59, 0x7F, 0x3F, 0x81, 0x3F, 0x0B,
];

const GFSK_100_KB: [u8; CONFIG_REGISTER_COUNT] = [
    0x07, 0x2E, 0x80, 0x07, 0x57, 0x43, 0x3E, 0x0F, 0x45, 0xFF, 0x00, 0x08, 0x00, 0x21, 0x65, 0x6A,
    0x5B, 0xF8, 0x13, 0xA0, 0xF8, 0x47, 0x07, 0x0C, 0x18, 0x1D, 0x1C, 0xC7, 0x00, 0xB2, 0x02, 0x26,
    0x09, 0xB6, 0x17, 0xEA, 0x0A, 0x00, 0x11, 0x41, 0x00, 0x59, 0x7F, 0x3F, 0x81, 0x3F, 0x0B,
];

const MSK_250_KB: [u8; CONFIG_REGISTER_COUNT] = [
    0x07, 0x2E, 0x80, 0x07, 0x57, 0x43, 0x3E, 0x0E, 0x45, 0xFF, 0x00, 0x0B, 0x00, 0x21, 0x65, 0x6A,
    0x2D, 0x3B, 0x73, 0xA0, 0xF8, 0x00, 0x07, 0x0C, 0x18, 0x1D, 0x1C, 0xC7, 0x00, 0xB2, 0x02, 0x26,
    0x09, 0xB6, 0x17, 0xEA, 0x0A, 0x00, 0x11, 0x41, 0x00, 0x59, 0x7F, 0x3F, 0x81, 0x3F, 0x0B,
];

const MSK_500_KB: [u8; CONFIG_REGISTER_COUNT] = [
    0x07, 0x2E, 0x80, 0x07, 0x57, 0x43, 0x3E, 0x0E, 0x45, 0xFF, 0x00, 0x0C, 0x00, 0x21, 0x65, 0x6A,
    0x0E, 0x3B, 0x73, 0xA0, 0xF8, 0x00, 0x07, 0x0C, 0x18, 0x1D, 0x1C, 0xC7, 0x40, 0xB2, 0x02, 0x26,
    0x09, 0xB6, 0x17, 0xEA, 0x0A, 0x00, 0x19, 0x41, 0x00, 0x59, 0x7F, 0x3F, 0x81, 0x3F, 0x0B,
];

const OOK_4_8_KB: [u8; CONFIG_REGISTER_COUNT] = [
    0x06, 0x2E, 0x06, 0x47, 0x57, 0x43, 0xFF, 0x04, 0x05, 0x00, 0x00, 0x06, 0x00, 0x21, 0x65, 0x6A,
    0x87, 0x83, 0x3B, 0x22, 0xF8, 0x15, 0x07, 0x30, 0x18, 0x14, 0x6C, 0x07, 0x00, 0x92, 0x87, 0x6B,
    0xFB, 0x56, 0x17, 0xE9, 0x2A, 0x00, 0x1F, 0x41, 0x00, 0x59, 0x7F, 0x3F, 0x81, 0x35, 0x09,
];
