//! U2F over CTAPHID: presence polling, rollback and probes

mod common;

use common::*;

use authorizer::TransactionConfig;
use authorizer_crypto::ecdsa;
use authorizer_ctap::{Answer, PromptKind, StatusWord};
use authorizer_transport::{Cmd, Message};

use serial_test::serial;
use std::time::Duration;

const CHALLENGE: [u8; 32] = [0x11; 32];
const APPLICATION: [u8; 32] = [0x22; 32];

fn not_satisfied() -> Vec<u8> {
    CONDITIONS_NOT_SATISFIED.to_vec()
}

fn status(data: &[u8]) -> [u8; 2] {
    [data[data.len() - 2], data[data.len() - 1]]
}

#[test]
fn test_version() {
    let harness = Harness::new(Answer::Accept);
    let cid = harness.allocate_channel();

    assert_eq!(harness.u2f(cid, &[0x00, 0x03, 0x00, 0x00]), b"U2F_V2\x90\x00".to_vec());
    assert!(harness.interaction.shown().is_empty());
}

#[test]
fn test_unknown_instruction() {
    let harness = Harness::new(Answer::Accept);
    let cid = harness.allocate_channel();

    let reply = harness.u2f(cid, &[0x00, 0x44, 0x00, 0x00]);
    assert_eq!(reply, StatusWord::InsNotSupported.to_bytes().to_vec());
    assert!(!harness.manager.is_busy());
}

#[test]
fn test_probe_register_needs_no_presence() {
    let harness = Harness::new(Answer::Withhold);
    let cid = harness.allocate_channel();

    let reply = harness.u2f(cid, &register_apdu(&[0x42; 32], &[0x41; 32]));
    assert_eq!(reply[0], 0x05);
    assert_eq!(status(&reply), [0x90, 0x00]);

    assert!(harness.interaction.shown().is_empty());
    assert!(harness.safe.is_empty());
    assert!(!harness.manager.is_busy());
    assert_eq!(CountingListener::count(&harness.listener.u2f_register), 0);
}

#[test]
fn test_register_polling() {
    let harness = Harness::new(Answer::Withhold);
    let cid = harness.allocate_channel();
    let apdu = register_apdu(&CHALLENGE, &APPLICATION);

    // The client keeps asking until the user answers
    assert_eq!(harness.u2f(cid, &apdu), not_satisfied());
    assert_eq!(harness.interaction.shown(), vec![PromptKind::U2fPresence]);
    assert!(harness.manager.is_busy());
    assert_eq!(harness.u2f(cid, &apdu), not_satisfied());
    assert_eq!(harness.interaction.shown().len(), 1);

    harness.interaction.release(true);
    let reply = harness.u2f(cid, &apdu);
    assert_eq!(status(&reply), [0x90, 0x00]);
    let (public_key, key_handle) = parse_registration(&reply);
    assert_eq!(public_key.len(), 65);
    assert_eq!(harness.safe.len(), 1);
    assert_eq!(CountingListener::count(&harness.listener.u2f_register), 1);
    assert!(!harness.manager.is_busy());

    // A later identical request starts over
    assert_eq!(harness.u2f(cid, &apdu), not_satisfied());
    assert_eq!(harness.interaction.shown().len(), 2);
    assert_eq!(CountingListener::count(&harness.listener.u2f_register), 1);
    assert!(!key_handle.is_empty());
}

#[test]
fn test_denied_registration_is_rolled_back() {
    let harness = Harness::new(Answer::Deny);
    let cid = harness.allocate_channel();
    let apdu = register_apdu(&CHALLENGE, &APPLICATION);

    assert_eq!(harness.u2f(cid, &apdu), not_satisfied());
    assert_eq!(harness.safe.len(), 1);

    assert_eq!(harness.u2f(cid, &apdu), not_satisfied());
    assert!(harness.safe.is_empty());
    assert!(!harness.manager.is_busy());
    assert_eq!(CountingListener::count(&harness.listener.u2f_register), 0);
}

#[test]
fn test_other_request_abandons_presence_check() {
    let harness = Harness::new(Answer::Withhold);
    let cid = harness.allocate_channel();
    let apdu = register_apdu(&CHALLENGE, &APPLICATION);

    assert_eq!(harness.u2f(cid, &apdu), not_satisfied());
    assert_eq!(harness.safe.len(), 1);

    assert_eq!(harness.u2f(cid, &[0x00, 0x03, 0x00, 0x00]), b"U2F_V2\x90\x00".to_vec());
    assert!(harness.safe.is_empty());
    assert!(!harness.manager.is_busy());

    // Releasing the withdrawn prompt has no effect
    harness.interaction.release(true);
    assert_eq!(harness.u2f(cid, &apdu), not_satisfied());
    assert_eq!(harness.safe.len(), 1);
}

#[test]
fn test_retry_from_another_channel_is_a_new_request() {
    let harness = Harness::new(Answer::Withhold);
    let first = harness.allocate_channel();
    let second = harness.allocate_channel();
    let apdu = register_apdu(&CHALLENGE, &APPLICATION);

    assert_eq!(harness.u2f(first, &apdu), not_satisfied());
    assert_eq!(harness.u2f(second, &apdu), not_satisfied());

    // The first registration was dropped in favour of the second
    assert_eq!(harness.safe.len(), 1);
    assert_eq!(harness.interaction.shown().len(), 2);
}

#[test]
fn test_ctaphid_cancel_abandons_presence_check() {
    let harness = Harness::new(Answer::Withhold);
    let cid = harness.allocate_channel();

    assert_eq!(harness.u2f(cid, &register_apdu(&CHALLENGE, &APPLICATION)), not_satisfied());
    harness.send(Message::new(cid, Cmd::Cancel, Vec::new()));

    assert!(harness.sink.take().is_empty());
    assert!(harness.safe.is_empty());
    assert!(!harness.manager.is_busy());
}

#[test]
#[serial]
fn test_retry_timeout_abandons_presence_check() {
    let config = TransactionConfig::default().with_u2f_retry_timeout(Duration::from_millis(100));
    let harness = Harness::with_config(Answer::Withhold, config);
    let cid = harness.allocate_channel();

    assert_eq!(harness.u2f(cid, &register_apdu(&CHALLENGE, &APPLICATION)), not_satisfied());
    assert_eq!(harness.safe.len(), 1);

    assert!(eventually(|| !harness.manager.is_busy()));
    assert!(harness.safe.is_empty());
    assert!(harness.sink.take().is_empty());
}

#[test]
fn test_authenticate_after_register() {
    let harness = Harness::new(Answer::Accept);
    let cid = harness.allocate_channel();
    let register = register_apdu(&CHALLENGE, &APPLICATION);

    assert_eq!(harness.u2f(cid, &register), not_satisfied());
    let (public_key, key_handle) = parse_registration(&harness.u2f(cid, &register));

    let challenge = [0x33; 32];
    let authenticate = authenticate_apdu(&challenge, &APPLICATION, &key_handle);
    assert_eq!(harness.u2f(cid, &authenticate), not_satisfied());
    let reply = harness.u2f(cid, &authenticate);
    assert_eq!(status(&reply), [0x90, 0x00]);
    assert_eq!(reply[0] & 0x01, 0x01);

    // application | flags | counter | challenge
    let mut signed = APPLICATION.to_vec();
    signed.extend_from_slice(&reply[..5]);
    signed.extend_from_slice(&challenge);
    ecdsa::verify(&public_key, &signed, &reply[5..reply.len() - 2]).unwrap();

    assert_eq!(CountingListener::count(&harness.listener.u2f_register), 1);
    assert_eq!(CountingListener::count(&harness.listener.u2f_authenticate), 1);
}

#[test]
fn test_authenticate_without_presence() {
    let harness = Harness::new(Answer::Accept);
    let cid = harness.allocate_channel();
    let register = register_apdu(&CHALLENGE, &APPLICATION);

    harness.u2f(cid, &register);
    let (_, key_handle) = parse_registration(&harness.u2f(cid, &register));

    let mut authenticate = authenticate_apdu(&CHALLENGE, &APPLICATION, &key_handle);
    authenticate[2] = 0x08;
    let reply = harness.u2f(cid, &authenticate);
    assert_eq!(status(&reply), [0x90, 0x00]);
    assert!(!harness.manager.is_busy());

    // Check-only never signs
    authenticate[2] = 0x07;
    assert_eq!(harness.u2f(cid, &authenticate), not_satisfied());
}
