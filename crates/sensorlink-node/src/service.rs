//! RadioService - async front end to the delivery engine
//!
//! The engine is synchronous: `poll` and `post_message` run to completion,
//! the ACK window included. This service owns it inside one task and feeds
//! it from three sources:
//!
//! - a poll tick that drains received messages onto a broadcast channel
//! - a keep-alive tick, sent to the server (sensor role) or reported locally
//!   (bridge role)
//! - commands from [`RadioHandle`]s
//!
//! # Architecture
//!
//! ```text
//! RadioHandle --mpsc--> select! loop --broadcast--> subscribers
//!                         |  poll tick
//!                         |  keep-alive tick
//!                         v
//!                    RadioEngine <--> RegisterBus
//! ```
//!
//! A send blocks the service task for up to `(max_retries + 1)` ACK
//! windows, and the engine's delay provider really sleeps on hardware.
//! Give [`RadioService::run`] a runtime of its own (see its docs) so other
//! tasks are not starved while it waits for an ACK.
//!
//! # Example
//!
//! ```rust,ignore
//! let (service, handle) = RadioService::start(bus, delay, settings)?;
//! let mut inbound = handle.subscribe();
//! tokio::spawn(service.run());
//!
//! handle.send_readings(&readings).await?;
//! while let Ok(msg) = inbound.recv().await {
//!     println!("{} sent {:?}", msg.sender, msg.telemetry());
//! }
//! ```

use embedded_hal::delay::DelayNs;
use sensorlink_radio::{EngineStats, Message, RadioEngine, RadioError, RegisterBus};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::error::{NodeError, Result};
use crate::settings::{NodeRole, NodeSettings};
use crate::telemetry::{keep_alive, SensorReadings, Telemetry};

/// Capacity of the inbound broadcast channel
const INBOUND_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the command channel
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// A message received over the radio (or a local keep-alive on a bridge)
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Sender address
    pub sender: u8,
    /// Message as received
    pub message: Message,
}

impl InboundMessage {
    /// Interpret the message payload
    pub fn telemetry(&self) -> Result<Telemetry> {
        Telemetry::from_message(&self.message)
    }
}

/// Commands that can be sent to the service
#[derive(Debug)]
pub enum ServiceCommand {
    /// Send a message
    Post {
        /// Destination address
        recipient: u8,
        /// Message to send
        message: Message,
        /// Retransmissions after the first attempt, `None` for the configured count
        max_retries: Option<u8>,
        /// Delivery outcome
        reply: oneshot::Sender<Result<bool>>,
    },
    /// Get service statistics
    GetStats(oneshot::Sender<ServiceStats>),
    /// Shutdown the service
    Shutdown,
}

/// Service statistics
#[derive(Debug, Clone, Default)]
pub struct ServiceStats {
    /// Engine counters
    pub radio: EngineStats,
    /// Sends that were acknowledged (or broadcast)
    pub messages_sent: u64,
    /// Sends that ran out of retries or were refused
    pub send_failures: u64,
    /// Messages published to subscribers
    pub messages_received: u64,
    /// Keep-alives sent or reported
    pub keepalives: u64,
    /// Radio resets after fatal errors
    pub recoveries: u64,
}

/// Handle for controlling the RadioService
#[derive(Clone)]
pub struct RadioHandle {
    command_tx: mpsc::Sender<ServiceCommand>,
    inbound_tx: broadcast::Sender<InboundMessage>,
    server_address: u8,
}

impl RadioHandle {
    /// Send `message` to `recipient` with the configured retry count
    ///
    /// Resolves to `false` when the recipient never acknowledged.
    pub async fn post(&self, recipient: u8, message: Message) -> Result<bool> {
        self.send_post(recipient, message, None).await
    }

    /// Send `message` to `recipient` with an explicit retry count
    pub async fn post_with_retries(
        &self,
        recipient: u8,
        message: Message,
        max_retries: u8,
    ) -> Result<bool> {
        self.send_post(recipient, message, Some(max_retries)).await
    }

    async fn send_post(
        &self,
        recipient: u8,
        message: Message,
        max_retries: Option<u8>,
    ) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(ServiceCommand::Post {
                recipient,
                message,
                max_retries,
                reply,
            })
            .await
            .map_err(|_| NodeError::ChannelClosed)?;
        rx.await.map_err(|_| NodeError::ChannelClosed)?
    }

    /// Send sensor readings to the server node
    pub async fn send_readings(&self, readings: &SensorReadings) -> Result<bool> {
        self.post(self.server_address, readings.to_message()).await
    }

    /// Receive every message the service publishes from now on
    pub fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound_tx.subscribe()
    }

    /// Get service statistics
    pub async fn stats(&self) -> Result<ServiceStats> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(ServiceCommand::GetStats(tx))
            .await
            .map_err(|_| NodeError::ChannelClosed)?;
        rx.await.map_err(|_| NodeError::ChannelClosed)
    }

    /// Shutdown the service
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(ServiceCommand::Shutdown)
            .await
            .map_err(|_| NodeError::ChannelClosed)
    }
}

/// Radio service owning the delivery engine
pub struct RadioService<B, D> {
    /// Delivery engine
    engine: RadioEngine<B, D>,
    /// Node settings
    settings: NodeSettings,
    /// Command receiver
    command_rx: mpsc::Receiver<ServiceCommand>,
    /// Inbound message publisher
    inbound_tx: broadcast::Sender<InboundMessage>,
    /// Service statistics
    stats: ServiceStats,
}

impl<B, D> RadioService<B, D>
where
    B: RegisterBus,
    D: DelayNs,
{
    /// Wrap an initialised engine
    pub fn new(engine: RadioEngine<B, D>, settings: NodeSettings) -> (Self, RadioHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (inbound_tx, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);

        let handle = RadioHandle {
            command_tx,
            inbound_tx: inbound_tx.clone(),
            server_address: settings.server_address,
        };

        let service = Self {
            engine,
            settings,
            command_rx,
            inbound_tx,
            stats: ServiceStats::default(),
        };

        (service, handle)
    }

    /// Validate `settings`, initialise the radio and wrap it
    pub fn start(bus: B, delay: D, settings: NodeSettings) -> Result<(Self, RadioHandle)> {
        settings.validate()?;
        let engine = RadioEngine::from_config(bus, delay, &settings.radio)?;
        Ok(Self::new(engine, settings))
    }

    /// Run the service
    ///
    /// Returns when shut down, when every handle is dropped, or with an
    /// error when the radio cannot be recovered after a fatal fault.
    ///
    /// Engine calls are synchronous, so this future occupies its worker
    /// thread for the whole ACK window of every send. Drive it on a
    /// dedicated thread with a current-thread runtime; handles work from
    /// any other runtime.
    ///
    /// ```rust,ignore
    /// let (service, handle) = RadioService::start(bus, delay, settings)?;
    /// let radio_thread = std::thread::spawn(move || {
    ///     let runtime = tokio::runtime::Builder::new_current_thread()
    ///         .enable_time()
    ///         .build()?;
    ///     runtime.block_on(service.run())?;
    ///     Ok::<_, Box<dyn std::error::Error + Send + Sync>>(())
    /// });
    /// ```
    pub async fn run(mut self) -> Result<()> {
        info!(
            address = self.engine.identity().address(),
            role = ?self.settings.role,
            "Starting radio service"
        );

        let mut poll_tick = time::interval(self.settings.poll_interval);
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let keepalive_interval = self.settings.keepalive_interval;
        let mut keepalive_tick =
            time::interval_at(Instant::now() + keepalive_interval, keepalive_interval);
        keepalive_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll_tick.tick() => {
                    self.service_radio()?;
                }

                _ = keepalive_tick.tick() => {
                    self.keep_alive()?;
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ServiceCommand::Post { recipient, message, max_retries, reply }) => {
                            let outcome = self.post(recipient, &message, max_retries);
                            let fatal = match &outcome {
                                Err(NodeError::Radio(err)) if err.is_fatal() => Some(err.clone()),
                                _ => None,
                            };
                            let _ = reply.send(outcome);
                            if let Some(err) = fatal {
                                self.recover(err)?;
                            }
                        }
                        Some(ServiceCommand::GetStats(tx)) => {
                            let _ = tx.send(self.snapshot());
                        }
                        Some(ServiceCommand::Shutdown) => {
                            info!("Radio service shutdown requested");
                            break;
                        }
                        None => {
                            debug!("All radio handles dropped");
                            break;
                        }
                    }
                }
            }
        }

        info!(
            sent = self.stats.messages_sent,
            received = self.stats.messages_received,
            failures = self.stats.send_failures,
            "Radio service stopped"
        );
        Ok(())
    }

    fn snapshot(&self) -> ServiceStats {
        ServiceStats {
            radio: self.engine.stats(),
            ..self.stats.clone()
        }
    }

    /// Drain received messages to subscribers
    fn service_radio(&mut self) -> Result<()> {
        match self.engine.poll() {
            Ok(true) => {
                while let Some((sender, message)) = self.engine.get_message() {
                    debug!(
                        sender,
                        message_type = message.message_type,
                        len = message.data.len(),
                        "Publishing inbound message"
                    );
                    self.publish(InboundMessage { sender, message });
                }
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(err) => self.handle_radio_error(err),
        }
    }

    fn publish(&mut self, inbound: InboundMessage) {
        self.stats.messages_received += 1;
        if self.inbound_tx.send(inbound).is_err() {
            trace!("No subscribers for inbound message");
        }
    }

    fn keep_alive(&mut self) -> Result<()> {
        self.stats.keepalives += 1;
        match self.settings.role {
            NodeRole::Sensor => {
                let server = self.settings.server_address;
                match self.post(server, &keep_alive(), None) {
                    Ok(delivered) => {
                        debug!(server, delivered, "Keep-alive sent");
                        Ok(())
                    }
                    Err(NodeError::Radio(err)) => self.handle_radio_error(err),
                    Err(err) => Err(err),
                }
            }
            NodeRole::Bridge => {
                let own = self.engine.identity().address();
                debug!("Reporting local keep-alive");
                self.publish(InboundMessage {
                    sender: own,
                    message: keep_alive(),
                });
                Ok(())
            }
        }
    }

    fn post(&mut self, recipient: u8, message: &Message, max_retries: Option<u8>) -> Result<bool> {
        let delivered = match max_retries {
            Some(retries) => self.engine.post_message(recipient, message, retries)?,
            None => self.engine.post(recipient, message)?,
        };
        if delivered {
            self.stats.messages_sent += 1;
        } else {
            self.stats.send_failures += 1;
            warn!(recipient, message_type = message.message_type, "Send failed");
        }
        Ok(delivered)
    }

    fn handle_radio_error(&mut self, err: RadioError) -> Result<()> {
        if err.is_fatal() {
            self.recover(err)
        } else {
            warn!(error = %err, code = err.error_code(), "Radio error");
            Ok(())
        }
    }

    /// Reset the transceiver once; give up if that fails too
    fn recover(&mut self, err: RadioError) -> Result<()> {
        warn!(error = %err, "Fatal radio error, resetting transceiver");
        match self.engine.reinit() {
            Ok(()) => {
                self.stats.recoveries += 1;
                Ok(())
            }
            Err(reset_err) => {
                error!(error = %reset_err, "Radio reset failed");
                Err(NodeError::RecoveryFailed(reset_err))
            }
        }
    }
}
