//! Integration tests for the node runtime
//!
//! A [`RadioService`] runs on a paused tokio clock against the simulated
//! transceiver, so keep-alive timers fire without real waiting.

use sensorlink_node::{
    InboundMessage, MessageKind, NodeError, NodeSettings, RadioService, SensorReadings, Telemetry,
    DEFAULT_KEEPALIVE_INTERVAL,
};
use sensorlink_radio::registers::MarcState;
use sensorlink_radio::test_utils::{SimulatedDelay, SimulatedRadio};
use sensorlink_radio::{Frame, FrameBody, Message, RadioConfig, RadioConfigBuilder, RadioError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

const SERVER_ADDRESS: u8 = 1;
const SENSOR_ADDRESS: u8 = 3;
const SIGNATURE: u16 = 0x52E3;
const STATE_POLL_LIMIT: u32 = 50;

// ============================================================================
// Test Infrastructure
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sensorlink_node=debug,sensorlink_radio=info")
        .try_init();
}

fn radio_config(address: u8) -> RadioConfig {
    RadioConfigBuilder::new()
        .device_address(address)
        .message_signature(SIGNATURE)
        .max_retries(2)
        .state_poll_limit(STATE_POLL_LIMIT)
        .build()
}

fn readings() -> SensorReadings {
    SensorReadings {
        temperature: 21.5,
        humidity: 40.25,
        partial_pressure: 10.5,
        dew_point: 7.75,
    }
}

async fn recv_within(
    rx: &mut broadcast::Receiver<InboundMessage>,
    limit: Duration,
) -> InboundMessage {
    timeout(limit, rx.recv())
        .await
        .expect("inbound message in time")
        .expect("inbound channel open")
}

// ============================================================================
// Sensor Role
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_sensor_readings_delivered() {
    init_tracing();
    let radio = SimulatedRadio::new();
    radio.auto_ack(SERVER_ADDRESS);

    let settings = NodeSettings::sensor(radio_config(SENSOR_ADDRESS), SERVER_ADDRESS);
    let (service, handle) =
        RadioService::start(radio.clone(), SimulatedDelay::new(), settings).unwrap();
    let task = tokio::spawn(service.run());

    assert!(handle.send_readings(&readings()).await.unwrap());

    let sent: Vec<Frame> = radio
        .transmitted()
        .into_iter()
        .filter(|frame| frame.recipient == SERVER_ADDRESS)
        .collect();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].sender, SENSOR_ADDRESS);
    assert_eq!(sent[0].token, SIGNATURE);
    match &sent[0].body {
        FrameBody::Msg(message) => {
            assert_eq!(message.message_type, u8::from(MessageKind::SensorValues));
            let decoded = SensorReadings::decode(&message.data).unwrap();
            assert!((decoded.humidity - 40.25).abs() < 0.01);
        }
        FrameBody::Ack => panic!("expected a message frame"),
    }

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.messages_sent, 1);
    assert_eq!(stats.send_failures, 0);
    assert_eq!(stats.radio.acks_received, 1);

    handle.shutdown().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_post_reports_failure() {
    init_tracing();
    let radio = SimulatedRadio::new();

    let settings = NodeSettings::sensor(radio_config(SENSOR_ADDRESS), SERVER_ADDRESS);
    let (service, handle) =
        RadioService::start(radio.clone(), SimulatedDelay::new(), settings).unwrap();
    let task = tokio::spawn(service.run());

    let delivered = handle.post(9, Message::new(7, vec![1, 2, 3])).await.unwrap();
    assert!(!delivered);
    // First attempt plus two retries
    assert_eq!(radio.message_count(), 3);

    let delivered = handle
        .post_with_retries(9, Message::empty(7), 0)
        .await
        .unwrap();
    assert!(!delivered);
    assert_eq!(radio.message_count(), 4);

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.send_failures, 2);
    assert_eq!(stats.radio.delivery_failures, 2);

    handle.shutdown().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_oversized_post_not_transmitted() {
    init_tracing();
    let radio = SimulatedRadio::new();
    radio.auto_ack(SERVER_ADDRESS);

    let settings = NodeSettings::sensor(radio_config(SENSOR_ADDRESS), SERVER_ADDRESS);
    let (service, handle) =
        RadioService::start(radio.clone(), SimulatedDelay::new(), settings).unwrap();
    let task = tokio::spawn(service.run());

    let delivered = handle
        .post(SERVER_ADDRESS, Message::new(0, vec![0u8; 33]))
        .await
        .unwrap();
    assert!(!delivered);
    assert_eq!(radio.message_count(), 0);

    drop(handle);
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sensor_keepalive_sent_to_server() {
    init_tracing();
    let radio = SimulatedRadio::new();
    radio.auto_ack(SERVER_ADDRESS);

    let settings = NodeSettings::sensor(radio_config(SENSOR_ADDRESS), SERVER_ADDRESS);
    let (service, handle) =
        RadioService::start(radio.clone(), SimulatedDelay::new(), settings).unwrap();
    let task = tokio::spawn(service.run());

    // Nothing before the first period elapses
    tokio::time::sleep(DEFAULT_KEEPALIVE_INTERVAL / 2).await;
    assert_eq!(handle.stats().await.unwrap().keepalives, 0);

    tokio::time::sleep(DEFAULT_KEEPALIVE_INTERVAL).await;
    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.keepalives, 1);
    assert_eq!(stats.messages_sent, 1);

    let keepalives: Vec<Frame> = radio
        .transmitted()
        .into_iter()
        .filter(|frame| match &frame.body {
            FrameBody::Msg(message) => message.message_type == u8::from(MessageKind::KeepAlive),
            FrameBody::Ack => false,
        })
        .collect();
    assert_eq!(keepalives.len(), 1);
    assert_eq!(keepalives[0].recipient, SERVER_ADDRESS);

    handle.shutdown().await.unwrap();
    task.await.unwrap().unwrap();
}

// ============================================================================
// Bridge Role
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_bridge_publishes_and_acks_inbound() {
    init_tracing();
    let radio = SimulatedRadio::new();

    let settings = NodeSettings::bridge(radio_config(SERVER_ADDRESS));
    let (service, handle) =
        RadioService::start(radio.clone(), SimulatedDelay::new(), settings).unwrap();
    let mut inbound = handle.subscribe();
    radio.clear_log();

    radio.inject(&Frame::message(
        SERVER_ADDRESS,
        SENSOR_ADDRESS,
        SIGNATURE,
        readings().to_message(),
    ));
    let task = tokio::spawn(service.run());

    let msg = recv_within(&mut inbound, Duration::from_secs(1)).await;
    assert_eq!(msg.sender, SENSOR_ADDRESS);
    match msg.telemetry().unwrap() {
        Telemetry::SensorValues(decoded) => {
            assert!((decoded.temperature - 21.5).abs() < 0.01);
            assert!((decoded.dew_point - 7.75).abs() < 0.01);
        }
        other => panic!("unexpected telemetry {:?}", other),
    }

    let acks: Vec<Frame> = radio
        .transmitted()
        .into_iter()
        .filter(|frame| frame.body == FrameBody::Ack)
        .collect();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].recipient, SENSOR_ADDRESS);
    assert_eq!(acks[0].sender, SERVER_ADDRESS);

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.messages_received, 1);
    assert_eq!(stats.radio.acks_sent, 1);

    handle.shutdown().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_bridge_ignores_foreign_network() {
    init_tracing();
    let radio = SimulatedRadio::new();

    let settings = NodeSettings::bridge(radio_config(SERVER_ADDRESS));
    let (service, handle) =
        RadioService::start(radio.clone(), SimulatedDelay::new(), settings).unwrap();
    let mut inbound = handle.subscribe();
    radio.clear_log();

    radio.inject(&Frame::message(
        SERVER_ADDRESS,
        SENSOR_ADDRESS,
        SIGNATURE ^ 0xFFFF,
        readings().to_message(),
    ));
    let task = tokio::spawn(service.run());

    assert!(timeout(Duration::from_secs(5), inbound.recv()).await.is_err());
    assert_eq!(radio.ack_count(), 0);
    assert_eq!(handle.stats().await.unwrap().radio.foreign_frames, 1);

    handle.shutdown().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_bridge_reports_local_keepalive() {
    init_tracing();
    let radio = SimulatedRadio::new();

    let settings = NodeSettings::bridge(radio_config(SERVER_ADDRESS));
    let (service, handle) =
        RadioService::start(radio.clone(), SimulatedDelay::new(), settings).unwrap();
    let mut inbound = handle.subscribe();
    radio.clear_log();
    let task = tokio::spawn(service.run());

    let msg = recv_within(&mut inbound, DEFAULT_KEEPALIVE_INTERVAL * 2).await;
    assert_eq!(msg.sender, SERVER_ADDRESS);
    assert_eq!(msg.telemetry().unwrap(), Telemetry::KeepAlive);

    // Reported locally, never put on air
    assert_eq!(radio.message_count(), 0);
    assert_eq!(handle.stats().await.unwrap().keepalives, 1);

    handle.shutdown().await.unwrap();
    task.await.unwrap().unwrap();
}

// ============================================================================
// Lifecycle and Faults
// ============================================================================

#[tokio::test]
async fn test_start_rejects_invalid_settings() {
    init_tracing();
    let radio = SimulatedRadio::new();

    let settings = NodeSettings::sensor(radio_config(SENSOR_ADDRESS), SENSOR_ADDRESS);
    let result = RadioService::start(radio.clone(), SimulatedDelay::new(), settings);
    assert!(matches!(result, Err(NodeError::InvalidSettings(_))));

    // The transceiver was never touched
    assert!(radio.strobes().is_empty());
}

#[tokio::test]
async fn test_start_reports_bus_failure() {
    init_tracing();
    let radio = SimulatedRadio::new();
    radio.fail_bus("spi detached");

    let settings = NodeSettings::bridge(radio_config(SERVER_ADDRESS));
    let result = RadioService::start(radio, SimulatedDelay::new(), settings);
    assert!(matches!(result, Err(NodeError::Radio(RadioError::Bus(_)))));
}

#[tokio::test(start_paused = true)]
async fn test_handle_closed_after_shutdown() {
    init_tracing();
    let settings = NodeSettings::bridge(radio_config(SERVER_ADDRESS));
    let (service, handle) =
        RadioService::start(SimulatedRadio::new(), SimulatedDelay::new(), settings).unwrap();
    let task = tokio::spawn(service.run());

    handle.shutdown().await.unwrap();
    task.await.unwrap().unwrap();

    assert!(matches!(handle.stats().await, Err(NodeError::ChannelClosed)));
    assert!(matches!(
        handle.post(SENSOR_ADDRESS, Message::empty(1)).await,
        Err(NodeError::ChannelClosed)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_recovers_from_transient_state_timeout() {
    init_tracing();
    let radio = SimulatedRadio::new();
    radio.auto_ack(SERVER_ADDRESS);

    let settings = NodeSettings::sensor(radio_config(SENSOR_ADDRESS), SERVER_ADDRESS);
    let (service, handle) =
        RadioService::start(radio.clone(), SimulatedDelay::new(), settings).unwrap();
    let task = tokio::spawn(service.run());

    // Exactly one full wait sees the stuck state; the reset then succeeds
    radio.stick_for(MarcState::Tx.value(), STATE_POLL_LIMIT);
    let result = handle.send_readings(&readings()).await;
    assert!(matches!(
        result,
        Err(NodeError::Radio(RadioError::StateTimeout { .. }))
    ));

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.recoveries, 1);

    // Radio is usable again
    assert!(handle.send_readings(&readings()).await.unwrap());

    handle.shutdown().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unrecoverable_radio_stops_service() {
    init_tracing();
    let radio = SimulatedRadio::new();

    let settings = NodeSettings::sensor(radio_config(SENSOR_ADDRESS), SERVER_ADDRESS);
    let (service, handle) =
        RadioService::start(radio.clone(), SimulatedDelay::new(), settings).unwrap();
    let task = tokio::spawn(service.run());

    radio.stick_in(MarcState::Tx.value());
    let result = handle.send_readings(&readings()).await;
    assert!(matches!(
        result,
        Err(NodeError::Radio(RadioError::StateTimeout { .. }))
    ));

    let outcome = task.await.unwrap();
    assert!(matches!(
        outcome,
        Err(NodeError::RecoveryFailed(RadioError::StateTimeout { .. }))
    ));
    assert!(matches!(handle.stats().await, Err(NodeError::ChannelClosed)));
}

#[test]
fn test_service_on_dedicated_runtime_thread() {
    init_tracing();
    let radio = SimulatedRadio::new();
    radio.auto_ack(SERVER_ADDRESS);

    let settings = NodeSettings::sensor(radio_config(SENSOR_ADDRESS), SERVER_ADDRESS);
    let (service, handle) =
        RadioService::start(radio.clone(), SimulatedDelay::new(), settings).unwrap();
    let radio_thread = std::thread::spawn(move || {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
            .block_on(service.run())
    });

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        assert!(handle.send_readings(&readings()).await.unwrap());
        assert!(!handle
            .post_with_retries(9, Message::empty(7), 1)
            .await
            .unwrap());
        handle.shutdown().await.unwrap();
    });

    radio_thread.join().unwrap().unwrap();
    // One report plus two attempts at the silent node
    assert_eq!(radio.message_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_service_stops_when_handles_dropped() {
    init_tracing();
    let settings = NodeSettings::bridge(radio_config(SERVER_ADDRESS));
    let (service, handle) =
        RadioService::start(SimulatedRadio::new(), SimulatedDelay::new(), settings).unwrap();
    let task = tokio::spawn(service.run());

    let second = handle.clone();
    drop(handle);
    assert!(second.stats().await.is_ok());
    drop(second);

    task.await.unwrap().unwrap();
}
