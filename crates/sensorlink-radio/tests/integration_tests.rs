//! Integration tests for the radio transport
//!
//! These tests drive a [`RadioEngine`] against the simulated transceiver:
//! - Reception, filtering and acknowledgment of incoming frames
//! - Unicast delivery with ACK window and bounded retries
//! - Broadcast fire-and-forget
//! - Inbound queue backpressure
//! - Hardware fault escalation

use sensorlink_radio::registers::{MarcState, Strobe};
use sensorlink_radio::test_utils::{SimulatedDelay, SimulatedRadio};
use sensorlink_radio::{
    EngineState, Frame, FrameBody, Message, RadioConfig, RadioConfigBuilder, RadioEngine,
    RadioError, BROADCAST_ADDRESS, QUEUE_CAPACITY, VERSION,
};
use std::time::Duration;

const OWN_ADDRESS: u8 = 1;
const PEER_ADDRESS: u8 = 2;
const SIGNATURE: u16 = 0x52E3;

// ============================================================================
// Test Infrastructure
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sensorlink_radio=debug")
        .try_init();
}

fn config() -> RadioConfig {
    RadioConfigBuilder::new()
        .device_address(OWN_ADDRESS)
        .message_signature(SIGNATURE)
        .max_retries(2)
        .build()
}

fn start() -> (
    RadioEngine<SimulatedRadio, SimulatedDelay>,
    SimulatedRadio,
    SimulatedDelay,
) {
    init_tracing();
    let radio = SimulatedRadio::new();
    let delay = SimulatedDelay::new();
    let engine = RadioEngine::from_config(radio.clone(), delay.clone(), &config())
        .expect("engine init");
    radio.clear_log();
    delay.reset();
    (engine, radio, delay)
}

fn message_from(sender: u8, recipient: u8, token: u16, data: &[u8]) -> Frame {
    Frame::message(recipient, sender, token, Message::new(0, data.to_vec()))
}

// ============================================================================
// Reception
// ============================================================================

#[test]
fn test_message_to_self_is_acked_then_queued() {
    let (mut engine, radio, _) = start();
    radio.inject(&message_from(PEER_ADDRESS, OWN_ADDRESS, SIGNATURE, &[0x10, 0x20]));

    assert!(engine.poll().unwrap());

    let sent = radio.transmitted();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0], Frame::ack(PEER_ADDRESS, OWN_ADDRESS, SIGNATURE));

    let (sender, message) = engine.get_message().unwrap();
    assert_eq!(sender, PEER_ADDRESS);
    assert_eq!(message.data.as_ref(), &[0x10, 0x20]);
    assert!(engine.get_message().is_none());
    assert_eq!(engine.state(), EngineState::Receiving);
}

#[test]
fn test_foreign_token_never_queued_or_acked() {
    let (mut engine, radio, _) = start();
    radio.inject(&message_from(PEER_ADDRESS, OWN_ADDRESS, 0x0BAD, &[1]));
    radio.inject(&message_from(PEER_ADDRESS, BROADCAST_ADDRESS, 0x0BAD, &[2]));

    assert!(!engine.poll().unwrap());
    assert!(radio.transmitted().is_empty());
    assert!(engine.get_message().is_none());
    assert_eq!(engine.stats().foreign_frames, 2);
}

#[test]
fn test_broadcast_queued_without_ack() {
    let (mut engine, radio, _) = start();
    radio.inject(&message_from(PEER_ADDRESS, BROADCAST_ADDRESS, SIGNATURE, &[7]));

    assert!(engine.poll().unwrap());
    assert!(radio.transmitted().is_empty());
    assert_eq!(engine.get_message().unwrap().0, PEER_ADDRESS);
}

#[test]
fn test_message_for_other_node_ignored() {
    let (mut engine, radio, _) = start();
    radio.inject(&message_from(PEER_ADDRESS, 9, SIGNATURE, &[7]));

    assert!(!engine.poll().unwrap());
    assert!(radio.transmitted().is_empty());
    assert_eq!(engine.stats().misaddressed_frames, 1);
}

#[test]
fn test_ack_frames_never_queued() {
    let (mut engine, radio, _) = start();
    radio.inject(&Frame::ack(OWN_ADDRESS, PEER_ADDRESS, SIGNATURE));
    radio.inject(&Frame::ack(BROADCAST_ADDRESS, PEER_ADDRESS, SIGNATURE));

    assert!(!engine.poll().unwrap());
    assert!(engine.get_message().is_none());
    assert!(radio.transmitted().is_empty());
}

#[test]
fn test_burst_with_several_frames() {
    let (mut engine, radio, _) = start();
    radio.inject(&message_from(2, OWN_ADDRESS, SIGNATURE, &[1]));
    radio.inject(&message_from(3, BROADCAST_ADDRESS, SIGNATURE, &[2]));
    radio.inject(&message_from(4, OWN_ADDRESS, SIGNATURE, &[3]));

    assert!(engine.poll().unwrap());
    assert_eq!(radio.ack_count(), 2);

    let senders: Vec<u8> = std::iter::from_fn(|| engine.get_message())
        .map(|(sender, _)| sender)
        .collect();
    assert_eq!(senders, vec![2, 3, 4]);
}

#[test]
fn test_malformed_frame_discards_rest_of_burst() {
    let (mut engine, radio, _) = start();
    radio.inject(&message_from(2, BROADCAST_ADDRESS, SIGNATURE, &[1]));
    // Unknown payload type
    radio.inject_raw(&[5, OWN_ADDRESS, 3, 0xE3, 0x52, 0x09, 0x40, 0x85]);
    radio.inject(&message_from(4, BROADCAST_ADDRESS, SIGNATURE, &[3]));

    assert!(engine.poll().unwrap());
    assert_eq!(engine.get_message().unwrap().0, 2);
    assert!(engine.get_message().is_none());
    assert_eq!(engine.stats().malformed_frames, 1);
}

#[test]
fn test_full_queue_drops_newest() {
    let (mut engine, radio, _) = start();
    for round in 0..=QUEUE_CAPACITY {
        radio.inject(&message_from(PEER_ADDRESS, BROADCAST_ADDRESS, SIGNATURE, &[round as u8]));
        engine.poll().unwrap();
    }

    let stats = engine.stats();
    assert_eq!(stats.frames_queued, QUEUE_CAPACITY as u64);
    assert_eq!(stats.queue_dropped, 1);

    for round in 0..QUEUE_CAPACITY {
        let (_, message) = engine.get_message().unwrap();
        assert_eq!(message.data.as_ref(), &[round as u8]);
    }
    assert!(engine.get_message().is_none());
}

#[test]
fn test_ack_sent_even_when_queue_full() {
    let (mut engine, radio, _) = start();
    for round in 0..QUEUE_CAPACITY {
        radio.inject(&message_from(PEER_ADDRESS, BROADCAST_ADDRESS, SIGNATURE, &[round as u8]));
        engine.poll().unwrap();
    }
    assert_eq!(engine.stats().frames_queued, QUEUE_CAPACITY as u64);
    radio.clear_log();

    radio.inject(&message_from(PEER_ADDRESS, OWN_ADDRESS, SIGNATURE, &[0xFF]));
    assert!(engine.poll().unwrap());

    // Sender still learns the frame arrived
    assert_eq!(radio.ack_count(), 1);
    assert_eq!(radio.transmitted()[0], Frame::ack(PEER_ADDRESS, OWN_ADDRESS, SIGNATURE));

    let stats = engine.stats();
    assert_eq!(stats.acks_sent, 1);
    assert_eq!(stats.queue_dropped, 1);
    assert_eq!(stats.frames_queued, QUEUE_CAPACITY as u64);

    let (_, oldest) = engine.get_message().unwrap();
    assert_eq!(oldest.data.as_ref(), &[0]);
}

#[test]
fn test_queue_consumed_from_another_thread() {
    let (mut engine, radio, _) = start();
    let queue = engine.queue();
    radio.inject(&message_from(PEER_ADDRESS, OWN_ADDRESS, SIGNATURE, &[0xAB]));
    engine.poll().unwrap();

    let consumer = std::thread::spawn(move || {
        let mut page = [0u8; sensorlink_radio::PAGE_SIZE];
        assert!(queue.pull(&mut page));
        sensorlink_radio::decode_page(&page)
    });
    let (sender, message) = consumer.join().unwrap().unwrap();
    assert_eq!(sender, PEER_ADDRESS);
    assert_eq!(message.data.as_ref(), &[0xAB]);
    assert!(!engine.poll().unwrap());
}

// ============================================================================
// Delivery
// ============================================================================

#[test]
fn test_broadcast_sent_once_without_waiting() {
    let (mut engine, radio, delay) = start();

    assert!(engine
        .post_message(BROADCAST_ADDRESS, &Message::new(1, vec![1, 2, 3]), 5)
        .unwrap());

    let sent = radio.transmitted();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, BROADCAST_ADDRESS);
    assert_eq!(sent[0].sender, OWN_ADDRESS);
    assert_eq!(sent[0].token, SIGNATURE);
    assert!(delay.elapsed() < Duration::from_millis(10));
}

#[test]
fn test_unicast_without_ack_exhausts_retries() {
    let (mut engine, radio, delay) = start();

    assert!(!engine
        .post_message(PEER_ADDRESS, &Message::empty(1), 2)
        .unwrap());

    assert_eq!(radio.message_count(), 3);
    assert!(delay.elapsed() >= Duration::from_millis(900));
    assert_eq!(engine.stats().delivery_failures, 1);
    assert_eq!(engine.state(), EngineState::Receiving);
}

#[test]
fn test_unicast_acked_first_attempt() {
    let (mut engine, radio, _) = start();
    radio.auto_ack(PEER_ADDRESS);

    assert!(engine
        .post_message(PEER_ADDRESS, &Message::new(0, vec![0xDE, 0xAD]), 3)
        .unwrap());
    assert_eq!(radio.message_count(), 1);
    assert_eq!(engine.stats().acks_received, 1);
    assert!(engine.get_message().is_none());
}

#[test]
fn test_unicast_acked_after_retries() {
    let (mut engine, radio, _) = start();
    radio.ack_after(PEER_ADDRESS, 2);

    assert!(engine
        .post_message(PEER_ADDRESS, &Message::empty(1), 2)
        .unwrap());
    assert_eq!(radio.message_count(), 3);
}

#[test]
fn test_ack_from_wrong_peer_not_accepted() {
    let (mut engine, radio, _) = start();
    // Stray ACK from another node lands during the window
    radio.inject(&Frame::ack(OWN_ADDRESS, 3, SIGNATURE));

    assert!(!engine
        .post_message(PEER_ADDRESS, &Message::empty(1), 0)
        .unwrap());
    assert_eq!(radio.message_count(), 1);
}

#[test]
fn test_foreign_ack_not_accepted() {
    let (mut engine, radio, _) = start();
    // Right addresses, wrong network
    radio.inject(&Frame::ack(OWN_ADDRESS, PEER_ADDRESS, 0x0BAD));

    assert!(!engine
        .post_message(PEER_ADDRESS, &Message::empty(1), 0)
        .unwrap());

    let stats = engine.stats();
    assert_eq!(stats.acks_received, 0);
    assert_eq!(stats.acks_sent, 0);
    assert_eq!(stats.foreign_frames, 1);
    assert_eq!(stats.delivery_failures, 1);
    assert_eq!(radio.message_count(), 1);
    assert_eq!(radio.ack_count(), 0);
}

#[test]
fn test_post_uses_configured_retries() {
    let (mut engine, radio, _) = start();
    radio.auto_ack(PEER_ADDRESS);

    assert!(engine.post(PEER_ADDRESS, &Message::empty(1)).unwrap());
    assert_eq!(radio.message_count(), 1);

    radio.remove_peer(PEER_ADDRESS);
    radio.clear_log();
    assert!(!engine.post(PEER_ADDRESS, &Message::empty(1)).unwrap());
    // max_retries(2) from the config: first attempt plus two retries
    assert_eq!(radio.message_count(), 3);
    assert_eq!(engine.identity().max_retries(), 2);
}

#[test]
fn test_message_received_during_ack_window() {
    let (mut engine, radio, _) = start();
    radio.auto_ack(PEER_ADDRESS);
    radio.inject(&message_from(4, OWN_ADDRESS, SIGNATURE, &[9]));

    assert!(engine
        .post_message(PEER_ADDRESS, &Message::empty(1), 0)
        .unwrap());

    // Our message, then the ACK for node 4
    let sent = radio.transmitted();
    assert_eq!(sent.len(), 2);
    assert!(matches!(sent[0].body, FrameBody::Msg(_)));
    assert_eq!(sent[1], Frame::ack(4, OWN_ADDRESS, SIGNATURE));
    assert_eq!(engine.get_message().unwrap().0, 4);
}

#[test]
fn test_oversized_message_rejected_without_radio_activity() {
    let (mut engine, radio, _) = start();

    assert!(!engine
        .post_message(PEER_ADDRESS, &Message::new(0, vec![0u8; 33]), 3)
        .unwrap());
    assert!(radio.transmitted().is_empty());
    assert!(radio.strobes().is_empty());
}

#[test]
fn test_maximum_payload_delivered() {
    let (mut engine, radio, _) = start();
    radio.auto_ack(PEER_ADDRESS);
    let data: Vec<u8> = (0..32).collect();

    assert!(engine
        .post_message(PEER_ADDRESS, &Message::new(5, data.clone()), 0)
        .unwrap());
    match &radio.transmitted()[0].body {
        FrameBody::Msg(message) => assert_eq!(message.data.as_ref(), data.as_slice()),
        FrameBody::Ack => panic!("expected a message frame"),
    }
    assert_eq!(radio.transmitted_raw()[0][0], 39);
}

// ============================================================================
// Hardware Faults
// ============================================================================

#[test]
fn test_stuck_transmitter_is_fatal() {
    let (mut engine, radio, _) = start();
    radio.stick_in(MarcState::Tx.value());

    let err = engine
        .post_message(BROADCAST_ADDRESS, &Message::empty(1), 0)
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, RadioError::StateTimeout { .. }));

    radio.unstick();
    engine.reinit().unwrap();
    assert!(engine
        .post_message(BROADCAST_ADDRESS, &Message::empty(1), 0)
        .unwrap());
}

#[test]
fn test_bus_failure_propagates() {
    let (mut engine, radio, _) = start();
    radio.inject(&message_from(PEER_ADDRESS, OWN_ADDRESS, SIGNATURE, &[1]));
    radio.fail_bus("spi timeout");

    let err = engine.poll().unwrap_err();
    assert_eq!(err, RadioError::Bus("spi timeout".to_string()));
    assert!(err.is_fatal());
}

#[test]
fn test_overflow_recovery_then_reception() {
    let (mut engine, radio, _) = start();
    radio.force_overflow();
    assert!(!engine.poll().unwrap());
    assert!(radio.strobes().contains(&Strobe::Sfrx));

    radio.inject(&message_from(PEER_ADDRESS, BROADCAST_ADDRESS, SIGNATURE, &[1]));
    assert!(engine.poll().unwrap());
}

#[test]
fn test_version_constant() {
    assert!(!VERSION.is_empty());
}
