//! Simulated hardware for exercising the engine without a transceiver
//!
//! [`SimulatedRadio`] models the parts of the CC1101 the engine touches:
//! the configuration register file, the PA table, both FIFOs, the MARC state
//! machine and the GDO2 ready line. It is a shared handle, so a test keeps
//! one clone for inspection after handing another to the engine.
//!
//! Peers can be registered to acknowledge unicast frames automatically,
//! optionally after ignoring a number of attempts. Faults are injected with
//! [`SimulatedRadio::force_overflow`] and [`SimulatedRadio::stick_in`].
//!
//! # Example
//!
//! ```rust,ignore
//! use sensorlink_radio::test_utils::{SimulatedDelay, SimulatedRadio};
//!
//! let radio = SimulatedRadio::new();
//! radio.auto_ack(2);
//! let mut engine = RadioEngine::from_config(radio.clone(), SimulatedDelay::new(), &config)?;
//! assert!(engine.post_message(2, &Message::empty(1), 3)?);
//! assert_eq!(radio.transmitted().len(), 1);
//! ```

use bytes::Bytes;
use embedded_hal::delay::DelayNs;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use crate::driver::RegisterBus;
use crate::error::{RadioError, Result};
use crate::frame::{decode_one, Frame, FrameBody, HEADER_SIZE};
use crate::registers::{
    MarcState, StatusRegister, Strobe, CONFIG_REGISTER_COUNT, FIFO_SIZE, PATABLE_SIZE,
    RXBYTES_OVERFLOW, RXFIFO_BURST, TXFIFO_BURST, WRITE_CONFIG_BURST, WRITE_PATABLE_BURST,
};

/// Value reported by the VERSION register
pub const SIMULATED_VERSION: u8 = 0x14;

/// Value reported by the PARTNUM register
pub const SIMULATED_PART_NUMBER: u8 = 0x00;

/// Raw RSSI byte appended to injected frames
pub const SIMULATED_RSSI: u8 = 0x40;

/// Raw LQI byte appended to injected frames (CRC ok)
pub const SIMULATED_LQI: u8 = 0x85;

#[derive(Debug)]
struct RadioModel {
    registers: [u8; CONFIG_REGISTER_COUNT],
    pa_table: [u8; PATABLE_SIZE],
    marc_state: MarcState,
    stuck_state: Option<u8>,
    /// MARCSTATE reads left before a stuck state clears itself
    stuck_reads: Option<u32>,
    rx_fifo: VecDeque<u8>,
    tx_fifo: Vec<u8>,
    overflow: bool,
    transmitted: Vec<Bytes>,
    strobes: Vec<Strobe>,
    /// Peer address to number of frames it still ignores before acking
    peers: HashMap<u8, u32>,
    bus_fault: Option<String>,
}

impl RadioModel {
    fn new() -> Self {
        Self {
            registers: [0; CONFIG_REGISTER_COUNT],
            pa_table: [0; PATABLE_SIZE],
            marc_state: MarcState::Idle,
            stuck_state: None,
            stuck_reads: None,
            rx_fifo: VecDeque::new(),
            tx_fifo: Vec::new(),
            overflow: false,
            transmitted: Vec::new(),
            strobes: Vec::new(),
            peers: HashMap::new(),
            bus_fault: None,
        }
    }

    fn check_fault(&self) -> Result<()> {
        match &self.bus_fault {
            Some(reason) => Err(RadioError::Bus(reason.clone())),
            None => Ok(()),
        }
    }

    fn raw_state(&self) -> u8 {
        self.stuck_state.unwrap_or(self.marc_state.value())
    }

    fn read_marc_state(&mut self) -> u8 {
        match self.stuck_reads {
            Some(0) => {
                self.stuck_state = None;
                self.stuck_reads = None;
            }
            Some(remaining) => self.stuck_reads = Some(remaining - 1),
            None => {}
        }
        self.raw_state()
    }

    fn receive(&mut self, bytes: &[u8]) {
        if self.rx_fifo.len() + bytes.len() > FIFO_SIZE {
            self.overflow = true;
            return;
        }
        self.rx_fifo.extend(bytes.iter().copied());
    }

    fn transmit(&mut self) {
        let frame = Bytes::from(std::mem::take(&mut self.tx_fifo));
        trace!(len = frame.len(), "Simulated transmission");
        self.transmitted.push(frame.clone());

        let Ok(decoded) = decode_one(&frame, 0) else {
            return;
        };
        if decoded.message.is_none() {
            return;
        }

        let header = decoded.header;
        if let Some(ignore) = self.peers.get_mut(&header.recipient) {
            if *ignore > 0 {
                *ignore -= 1;
                return;
            }
            let ack = Frame::ack(header.sender, header.recipient, header.token);
            if let Ok(bytes) = ack.encode() {
                let mut air = bytes.to_vec();
                air.extend_from_slice(&[SIMULATED_RSSI, SIMULATED_LQI]);
                self.receive(&air);
            }
        }
    }

    fn strobe(&mut self, strobe: Strobe) {
        self.strobes.push(strobe);
        match strobe {
            Strobe::Sres => {
                self.registers = [0; CONFIG_REGISTER_COUNT];
                self.pa_table = [0; PATABLE_SIZE];
                self.rx_fifo.clear();
                self.tx_fifo.clear();
                self.overflow = false;
                self.marc_state = MarcState::Idle;
            }
            Strobe::Sidle => self.marc_state = MarcState::Idle,
            Strobe::Srx => self.marc_state = MarcState::Rx,
            Strobe::Stx => {
                self.transmit();
                // TXOFF_MODE returns to IDLE once the FIFO is empty
                self.marc_state = MarcState::Idle;
            }
            Strobe::Sfrx => {
                self.rx_fifo.clear();
                self.overflow = false;
            }
            Strobe::Sftx => self.tx_fifo.clear(),
            Strobe::Sxoff => self.marc_state = MarcState::Xoff,
            Strobe::Spwd | Strobe::Swor => self.marc_state = MarcState::Sleep,
            Strobe::Sfstxon | Strobe::Scal | Strobe::Sworrst | Strobe::Snop => {}
        }
    }
}

/// Register-level transceiver model
#[derive(Debug, Clone)]
pub struct SimulatedRadio {
    model: Arc<Mutex<RadioModel>>,
}

impl SimulatedRadio {
    /// Create a powered-up radio in IDLE
    pub fn new() -> Self {
        Self {
            model: Arc::new(Mutex::new(RadioModel::new())),
        }
    }

    /// Deliver a frame into the RX FIFO with a link quality trailer
    pub fn inject(&self, frame: &Frame) {
        if let Ok(bytes) = frame.encode() {
            let mut air = bytes.to_vec();
            air.extend_from_slice(&[SIMULATED_RSSI, SIMULATED_LQI]);
            self.inject_raw(&air);
        }
    }

    /// Deliver raw bytes into the RX FIFO
    pub fn inject_raw(&self, bytes: &[u8]) {
        self.model.lock().receive(bytes);
    }

    /// Acknowledge every unicast MSG sent to `peer`
    pub fn auto_ack(&self, peer: u8) {
        self.ack_after(peer, 0);
    }

    /// Acknowledge MSGs sent to `peer` after ignoring the first `ignored`
    pub fn ack_after(&self, peer: u8, ignored: u32) {
        self.model.lock().peers.insert(peer, ignored);
    }

    /// Stop `peer` from acknowledging
    pub fn remove_peer(&self, peer: u8) {
        self.model.lock().peers.remove(&peer);
    }

    /// Set the RXBYTES overflow flag and assert the ready line
    pub fn force_overflow(&self) {
        self.model.lock().overflow = true;
    }

    /// Report `raw` from MARCSTATE regardless of strobes
    pub fn stick_in(&self, raw: u8) {
        let mut model = self.model.lock();
        model.stuck_state = Some(raw);
        model.stuck_reads = None;
    }

    /// Report `raw` from MARCSTATE for the next `reads` reads only
    pub fn stick_for(&self, raw: u8, reads: u32) {
        let mut model = self.model.lock();
        model.stuck_state = Some(raw);
        model.stuck_reads = Some(reads);
    }

    /// Resume normal MARC state tracking
    pub fn unstick(&self) {
        let mut model = self.model.lock();
        model.stuck_state = None;
        model.stuck_reads = None;
    }

    /// Fail every bus transaction with `reason`
    pub fn fail_bus(&self, reason: impl Into<String>) {
        self.model.lock().bus_fault = Some(reason.into());
    }

    /// Clear a bus fault
    pub fn heal_bus(&self) {
        self.model.lock().bus_fault = None;
    }

    /// Frames sent on air, oldest first
    pub fn transmitted(&self) -> Vec<Frame> {
        self.model
            .lock()
            .transmitted
            .iter()
            .filter_map(|bytes| decode_one(bytes, 0).ok())
            .map(|decoded| decoded.into_frame())
            .collect()
    }

    /// Raw bytes of every transmission, oldest first
    pub fn transmitted_raw(&self) -> Vec<Bytes> {
        self.model.lock().transmitted.clone()
    }

    /// Number of MSG frames sent
    pub fn message_count(&self) -> usize {
        self.transmitted()
            .iter()
            .filter(|frame| matches!(frame.body, FrameBody::Msg(_)))
            .count()
    }

    /// Number of ACK frames sent
    pub fn ack_count(&self) -> usize {
        self.transmitted()
            .iter()
            .filter(|frame| frame.body == FrameBody::Ack)
            .count()
    }

    /// Strobes issued, oldest first
    pub fn strobes(&self) -> Vec<Strobe> {
        self.model.lock().strobes.clone()
    }

    /// Forget recorded strobes and transmissions
    pub fn clear_log(&self) {
        let mut model = self.model.lock();
        model.strobes.clear();
        model.transmitted.clear();
    }

    /// Current value of a configuration register
    pub fn register(&self, address: u8) -> u8 {
        self.model
            .lock()
            .registers
            .get(address as usize)
            .copied()
            .unwrap_or(0)
    }

    /// PA table contents
    pub fn pa_table(&self) -> [u8; PATABLE_SIZE] {
        self.model.lock().pa_table
    }

    /// Raw MARCSTATE value
    pub fn marc_state(&self) -> u8 {
        self.model.lock().raw_state()
    }

    /// Bytes waiting in the RX FIFO
    pub fn rx_pending(&self) -> usize {
        self.model.lock().rx_fifo.len()
    }
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for SimulatedRadio {
    fn read_register(&mut self, address: u8) -> Result<u8> {
        let mut model = self.model.lock();
        model.check_fault()?;

        let value = match address {
            a if a == StatusRegister::PartNum.address() => SIMULATED_PART_NUMBER,
            a if a == StatusRegister::Version.address() => SIMULATED_VERSION,
            a if a == StatusRegister::MarcState.address() => model.read_marc_state(),
            a if a == StatusRegister::Rssi.address() => SIMULATED_RSSI,
            a if a == StatusRegister::Lqi.address() => SIMULATED_LQI,
            a if a == StatusRegister::TxBytes.address() => model.tx_fifo.len() as u8,
            a if a == StatusRegister::RxBytes.address() => {
                let count = model.rx_fifo.len().min(0x7F) as u8;
                if model.overflow {
                    count | RXBYTES_OVERFLOW
                } else {
                    count
                }
            }
            a => model.registers.get(a as usize).copied().unwrap_or(0),
        };
        Ok(value)
    }

    fn write_register(&mut self, address: u8, value: u8) -> Result<()> {
        let mut model = self.model.lock();
        model.check_fault()?;
        if let Some(slot) = model.registers.get_mut(address as usize) {
            *slot = value;
        }
        Ok(())
    }

    fn read_burst(&mut self, command: u8, buffer: &mut [u8]) -> Result<()> {
        let mut model = self.model.lock();
        model.check_fault()?;
        if command == RXFIFO_BURST {
            for byte in buffer.iter_mut() {
                *byte = model.rx_fifo.pop_front().unwrap_or(0);
            }
        } else {
            buffer.fill(0);
        }
        Ok(())
    }

    fn write_burst(&mut self, command: u8, data: &[u8]) -> Result<()> {
        let mut model = self.model.lock();
        model.check_fault()?;
        match command {
            WRITE_CONFIG_BURST => {
                let len = data.len().min(CONFIG_REGISTER_COUNT);
                model.registers[..len].copy_from_slice(&data[..len]);
            }
            WRITE_PATABLE_BURST => {
                let len = data.len().min(PATABLE_SIZE);
                model.pa_table[..len].copy_from_slice(&data[..len]);
            }
            TXFIFO_BURST => {
                if data.len() >= HEADER_SIZE {
                    model.tx_fifo.extend_from_slice(data);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn strobe(&mut self, strobe: Strobe) -> Result<()> {
        let mut model = self.model.lock();
        model.check_fault()?;
        model.strobe(strobe);
        Ok(())
    }

    fn packet_ready(&mut self) -> Result<bool> {
        let model = self.model.lock();
        model.check_fault()?;
        Ok(model.overflow || !model.rx_fifo.is_empty())
    }
}

/// Delay provider that advances a virtual clock instead of sleeping
#[derive(Debug, Clone, Default)]
pub struct SimulatedDelay {
    elapsed_ns: Arc<Mutex<u64>>,
}

impl SimulatedDelay {
    /// Create a delay with a zeroed clock
    pub fn new() -> Self {
        Self::default()
    }

    /// Total time "slept"
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(*self.elapsed_ns.lock())
    }

    /// Zero the clock
    pub fn reset(&self) {
        *self.elapsed_ns.lock() = 0;
    }
}

impl DelayNs for SimulatedDelay {
    fn delay_ns(&mut self, ns: u32) {
        *self.elapsed_ns.lock() += ns as u64;
    }
}
