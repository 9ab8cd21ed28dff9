//! Reliable delivery engine
//!
//! [`RadioEngine`] owns the register bus and turns the half-duplex radio
//! into an addressed, acknowledged messaging primitive:
//!
//! - [`RadioEngine::poll`] drains the RX FIFO when the ready line is
//!   asserted, filters foreign traffic, acknowledges unicast messages and
//!   queues them for the application.
//! - [`RadioEngine::post_message`] transmits a message and, for unicast
//!   recipients, waits one ACK window per attempt, retransmitting up to the
//!   requested number of times.
//!
//! # State Machine
//!
//! ```text
//!            init
//!             |
//!             v
//!        Receiving <-------------------------+
//!             | post_message                  |
//!             v                               |
//!       Transmitting --broadcast------------->+
//!             | unicast                       |
//!             v                               |
//!        AwaitingAck --ACK or retries spent-->+
//! ```
//!
//! Every radio state change is confirmed by reading MARCSTATE. The number
//! of reads is bounded; a transceiver that never reaches the expected state
//! yields [`RadioError::StateTimeout`], which callers treat as fatal.

use embedded_hal::delay::DelayNs;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::config::{DeviceIdentity, RadioConfig, DEFAULT_ACK_WINDOW, DEFAULT_STATE_POLL_LIMIT};
use crate::driver::RegisterBus;
use crate::error::{RadioError, Result};
use crate::frame::{
    decode_one, split_burst, DecodedFrame, Frame, FrameBody, Message, PayloadType,
    BROADCAST_ADDRESS, MAX_DATA_LENGTH, MAX_DEVICE_ADDRESS,
};
use crate::profiles::RadioProfile;
use crate::queue::{InboundQueue, PAGE_SIZE};
use crate::registers::{
    ConfigRegister, MarcState, StatusRegister, Strobe, FIFO_BUFFER_SIZE, MARCSTATE_MASK,
    RXBYTES_COUNT_MASK, RXBYTES_OVERFLOW, RXFIFO_BURST, TXFIFO_BURST, WRITE_CONFIG_BURST,
    WRITE_PATABLE_BURST,
};

/// Settle time after strobes and state changes, in microseconds
const SETTLE_US: u32 = 100;

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Radio idle, not listening
    Idle,
    /// Listening for frames
    Receiving,
    /// Frame in flight
    Transmitting,
    /// Unicast sent, waiting for the recipient's ACK
    AwaitingAck,
}

/// Engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Frames written to the air, ACKs included
    pub transmissions: u64,
    /// ACKs sent for received unicast messages
    pub acks_sent: u64,
    /// ACKs accepted for outstanding sends
    pub acks_received: u64,
    /// Sends that ran out of retries
    pub delivery_failures: u64,
    /// Frames carrying another network's token
    pub foreign_frames: u64,
    /// Frames addressed to another node
    pub misaddressed_frames: u64,
    /// Frames that failed to decode
    pub malformed_frames: u64,
    /// RX FIFO overflows and empty reads
    pub rx_flushes: u64,
    /// Messages handed to the inbound queue
    pub frames_queued: u64,
    /// Messages refused by a full inbound queue
    pub queue_dropped: u64,
}

/// Timing and addressing parameters that are not part of the identity
#[derive(Debug, Clone, Copy)]
struct LinkParams {
    channel: u8,
    ack_window: Duration,
    state_poll_limit: u32,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            channel: 1,
            ack_window: DEFAULT_ACK_WINDOW,
            state_poll_limit: DEFAULT_STATE_POLL_LIMIT,
        }
    }
}

/// Transceiver driver with acknowledged delivery
pub struct RadioEngine<B, D> {
    bus: B,
    delay: D,
    identity: DeviceIdentity,
    profile: RadioProfile,
    params: LinkParams,
    state: EngineState,
    queue: InboundQueue,
    tx_buffer: [u8; FIFO_BUFFER_SIZE],
    rx_buffer: [u8; FIFO_BUFFER_SIZE],
    /// Recipient of the send in progress, if it expects an ACK
    pending_ack: Option<u8>,
    ack_received: bool,
    stats: EngineStats,
}

impl<B, D> RadioEngine<B, D>
where
    B: RegisterBus,
    D: DelayNs,
{
    /// Reset and configure the transceiver, leaving it in receive mode
    ///
    /// Uses channel 1, a 300 ms ACK window and the default MARCSTATE poll
    /// bound.
    pub fn init(bus: B, delay: D, identity: DeviceIdentity, profile: RadioProfile) -> Result<Self> {
        Self::start(bus, delay, identity, profile, LinkParams::default())
    }

    /// Validate `config` and initialise from it
    pub fn from_config(bus: B, delay: D, config: &RadioConfig) -> Result<Self> {
        config.validate()?;
        let params = LinkParams {
            channel: config.channel,
            ack_window: config.ack_window,
            state_poll_limit: config.state_poll_limit,
        };
        Self::start(bus, delay, config.identity()?, config.profile(), params)
    }

    fn start(
        bus: B,
        delay: D,
        identity: DeviceIdentity,
        profile: RadioProfile,
        params: LinkParams,
    ) -> Result<Self> {
        let mut engine = Self {
            bus,
            delay,
            identity,
            profile,
            params,
            state: EngineState::Idle,
            queue: InboundQueue::new(),
            tx_buffer: [0; FIFO_BUFFER_SIZE],
            rx_buffer: [0; FIFO_BUFFER_SIZE],
            pending_ack: None,
            ack_received: false,
            stats: EngineStats::default(),
        };
        engine.configure()?;

        info!(
            address = identity.address(),
            signature = identity.signature(),
            modulation = ?engine.profile.modulation,
            band = ?engine.profile.band,
            power_dbm = identity.output_power().dbm(),
            "Radio initialised"
        );
        Ok(engine)
    }

    /// Reset the transceiver and reload its configuration
    ///
    /// The inbound queue is kept. Used to recover after a fatal error.
    pub fn reinit(&mut self) -> Result<()> {
        self.pending_ack = None;
        self.ack_received = false;
        self.configure()?;
        info!(address = self.identity.address(), "Radio reinitialised");
        Ok(())
    }

    fn configure(&mut self) -> Result<()> {
        self.state = EngineState::Idle;
        self.bus.strobe(Strobe::Sres)?;
        self.delay.delay_ms(1);
        self.bus.strobe(Strobe::Sftx)?;
        self.delay.delay_us(SETTLE_US);
        self.bus.strobe(Strobe::Sfrx)?;
        self.delay.delay_us(SETTLE_US);

        self.bus.write_burst(WRITE_CONFIG_BURST, &self.profile.config)?;
        self.bus.write_burst(WRITE_PATABLE_BURST, &self.profile.pa_table)?;
        self.bus
            .write_register(ConfigRegister::Channr.address(), self.params.channel)?;
        self.bus
            .write_register(ConfigRegister::Addr.address(), self.identity.address())?;
        self.bus.write_register(
            ConfigRegister::Frend0.address(),
            self.identity.output_power().pa_index(),
        )?;

        self.set_receive_mode()
    }

    /// Chip version register
    pub fn version(&mut self) -> Result<u8> {
        self.bus.read_register(StatusRegister::Version.address())
    }

    /// Chip part number register
    pub fn part_number(&mut self) -> Result<u8> {
        self.bus.read_register(StatusRegister::PartNum.address())
    }

    /// Current engine state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Identity fixed at init
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Register profile loaded at init
    pub fn profile(&self) -> &RadioProfile {
        &self.profile
    }

    /// Handle to the inbound queue, for consumers on another task
    pub fn queue(&self) -> InboundQueue {
        self.queue.clone()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            queue_dropped: self.queue.stats().dropped,
            ..self.stats
        }
    }

    /// Release the bus and delay provider
    pub fn release(self) -> (B, D) {
        (self.bus, self.delay)
    }

    /// Service the radio
    ///
    /// Returns `true` when at least one message is waiting in the queue.
    pub fn poll(&mut self) -> Result<bool> {
        if self.bus.packet_ready()? {
            self.receive()?;
        }
        Ok(!self.queue.is_empty())
    }

    /// Take the oldest queued message and its sender
    pub fn get_message(&mut self) -> Option<(u8, Message)> {
        let mut page = [0u8; PAGE_SIZE];
        if !self.queue.pull(&mut page) {
            return None;
        }
        decode_page(&page)
    }

    /// Send `message` to `recipient` with the configured retry count
    pub fn post(&mut self, recipient: u8, message: &Message) -> Result<bool> {
        self.post_message(recipient, message, self.identity.max_retries())
    }

    /// Send `message` to `recipient`
    ///
    /// Broadcast returns after one transmission. Unicast makes at most
    /// `max_retries + 1` attempts, each followed by the ACK window and one
    /// poll cycle. Returns `Ok(false)` when no ACK arrived, or without
    /// touching the radio when the message cannot be framed. Errors are
    /// hardware faults only.
    pub fn post_message(
        &mut self,
        recipient: u8,
        message: &Message,
        max_retries: u8,
    ) -> Result<bool> {
        if !message.fits() {
            warn!(
                size = message.data.len(),
                max = MAX_DATA_LENGTH,
                "Message too large, not sent"
            );
            return Ok(false);
        }
        if recipient > MAX_DEVICE_ADDRESS {
            warn!(recipient, "Invalid recipient address, not sent");
            return Ok(false);
        }

        let frame = Frame::message(
            recipient,
            self.identity.address(),
            self.identity.signature(),
            message.clone(),
        );

        let unicast = recipient != BROADCAST_ADDRESS;
        self.pending_ack = unicast.then_some(recipient);
        self.ack_received = false;

        let outcome = self.deliver(&frame, unicast, max_retries);

        self.pending_ack = None;
        self.ack_received = false;
        if self.state == EngineState::AwaitingAck {
            self.state = EngineState::Receiving;
        }
        outcome
    }

    fn deliver(&mut self, frame: &Frame, unicast: bool, max_retries: u8) -> Result<bool> {
        for attempt in 0..=max_retries {
            self.transmit(frame)?;
            if !unicast {
                debug!(message_type = message_type(frame), "Broadcast sent");
                return Ok(true);
            }

            self.state = EngineState::AwaitingAck;
            self.wait_ack_window();
            self.poll()?;

            if self.ack_received {
                debug!(
                    recipient = frame.recipient,
                    attempts = attempt as u32 + 1,
                    "Delivery acknowledged"
                );
                return Ok(true);
            }
            debug!(recipient = frame.recipient, attempt, "No ACK");
        }

        self.stats.delivery_failures += 1;
        warn!(
            recipient = frame.recipient,
            attempts = max_retries as u32 + 1,
            "Delivery failed"
        );
        Ok(false)
    }

    fn wait_ack_window(&mut self) {
        let micros = u32::try_from(self.params.ack_window.as_micros()).unwrap_or(u32::MAX);
        self.delay.delay_us(micros);
    }

    fn receive(&mut self) -> Result<()> {
        let rx_bytes = self.bus.read_register(StatusRegister::RxBytes.address())?;
        let count = (rx_bytes & RXBYTES_COUNT_MASK) as usize;

        if rx_bytes & RXBYTES_OVERFLOW != 0 || count == 0 {
            self.stats.rx_flushes += 1;
            warn!(rx_bytes, "RX FIFO overflow or empty, flushing");
            self.flush_rx()?;
            return Ok(());
        }

        let count = count.min(FIFO_BUFFER_SIZE);
        self.rx_buffer.fill(0);
        self.bus.read_burst(RXFIFO_BURST, &mut self.rx_buffer[..count])?;
        trace!(count, "Read RX FIFO");

        let frames: Vec<Result<DecodedFrame>> = split_burst(&self.rx_buffer, count).collect();
        for decoded in frames {
            match decoded {
                Ok(frame) => self.handle_frame(frame)?,
                Err(err) => {
                    self.stats.malformed_frames += 1;
                    warn!(error = %err, code = err.error_code(), "Discarding rest of burst");
                }
            }
        }

        if self.state != EngineState::AwaitingAck {
            self.state = EngineState::Receiving;
        }
        Ok(())
    }

    fn handle_frame(&mut self, frame: DecodedFrame) -> Result<()> {
        let header = frame.header;
        let own_address = self.identity.address();

        if header.token != self.identity.signature() {
            self.stats.foreign_frames += 1;
            debug!(
                sender = header.sender,
                token = header.token,
                "Discarding foreign frame"
            );
            return Ok(());
        }

        if let Some(link) = frame.link {
            debug!(
                sender = header.sender,
                recipient = header.recipient,
                kind = ?header.payload_type,
                rssi_dbm = link.rssi_dbm,
                lqi = link.lqi,
                crc_ok = link.crc_ok,
                "Frame received"
            );
        }

        if header.recipient != BROADCAST_ADDRESS && header.recipient != own_address {
            self.stats.misaddressed_frames += 1;
            trace!(recipient = header.recipient, "Frame for another node");
            return Ok(());
        }

        if header.payload_type == PayloadType::Ack {
            if header.recipient == own_address && self.pending_ack == Some(header.sender) {
                self.ack_received = true;
                self.stats.acks_received += 1;
            } else {
                trace!(sender = header.sender, "Ignoring unexpected ACK");
            }
            return Ok(());
        }

        if header.recipient != BROADCAST_ADDRESS {
            self.send_ack(header.sender)?;
        }

        let frame = frame.into_frame();
        let mut page = [0u8; PAGE_SIZE];
        let len = frame.encode_into(&mut page)?;
        if self.queue.push(&page[..len]) {
            self.stats.frames_queued += 1;
        } else {
            warn!(sender = frame.sender, "Inbound queue full, dropping message");
        }
        Ok(())
    }

    fn send_ack(&mut self, recipient: u8) -> Result<()> {
        let ack = Frame::ack(recipient, self.identity.address(), self.identity.signature());
        self.transmit(&ack)?;
        self.stats.acks_sent += 1;
        debug!(recipient, "ACK sent");
        Ok(())
    }

    fn transmit(&mut self, frame: &Frame) -> Result<()> {
        let previous = self.state;
        let len = frame.encode_into(&mut self.tx_buffer)?;
        self.bus.write_burst(TXFIFO_BURST, &self.tx_buffer[..len])?;

        self.state = EngineState::Transmitting;
        self.set_transmit_mode()?;
        self.set_receive_mode()?;
        self.stats.transmissions += 1;

        // An ACK sent while waiting for our own ACK must not end the wait
        if previous == EngineState::AwaitingAck {
            self.state = EngineState::AwaitingAck;
        }
        Ok(())
    }

    fn flush_rx(&mut self) -> Result<()> {
        self.sidle()?;
        self.bus.strobe(Strobe::Sfrx)?;
        self.delay.delay_us(SETTLE_US);
        let awaiting = self.state == EngineState::AwaitingAck;
        self.set_receive_mode()?;
        if awaiting {
            self.state = EngineState::AwaitingAck;
        }
        Ok(())
    }

    fn sidle(&mut self) -> Result<()> {
        self.bus.strobe(Strobe::Sidle)?;
        self.wait_for(MarcState::Idle)?;
        self.delay.delay_us(SETTLE_US);
        Ok(())
    }

    fn set_transmit_mode(&mut self) -> Result<()> {
        self.sidle()?;
        self.bus.strobe(Strobe::Stx)?;
        // TX ends back in IDLE once the FIFO is sent
        self.wait_for(MarcState::Idle)?;
        self.delay.delay_us(SETTLE_US);
        Ok(())
    }

    fn set_receive_mode(&mut self) -> Result<()> {
        self.sidle()?;
        self.bus.strobe(Strobe::Srx)?;
        self.wait_for(MarcState::Rx)?;
        self.delay.delay_us(SETTLE_US);
        self.state = EngineState::Receiving;
        Ok(())
    }

    fn wait_for(&mut self, expected: MarcState) -> Result<()> {
        let limit = self.params.state_poll_limit;
        let mut last_state = 0xFF;
        for _ in 0..limit {
            let raw = self.bus.read_register(StatusRegister::MarcState.address())?;
            last_state = raw & MARCSTATE_MASK;
            if expected.matches(raw) {
                return Ok(());
            }
            trace!(state = last_state, ?expected, "Waiting for MARC state");
        }

        error!(?expected, last_state, polls = limit, "Radio state timeout");
        Err(RadioError::StateTimeout {
            expected,
            last_state,
            polls: limit,
        })
    }
}

fn message_type(frame: &Frame) -> Option<u8> {
    match &frame.body {
        FrameBody::Msg(message) => Some(message.message_type),
        FrameBody::Ack => None,
    }
}

/// Decode a queue page into its sender and message
///
/// Returns `None` for pages that do not hold a message frame.
pub fn decode_page(page: &[u8; PAGE_SIZE]) -> Option<(u8, Message)> {
    match decode_one(page, 0) {
        Ok(decoded) => {
            let sender = decoded.header.sender;
            decoded.message.map(|message| (sender, message))
        }
        Err(err) => {
            warn!(error = %err, "Corrupt queue page");
            None
        }
    }
}
