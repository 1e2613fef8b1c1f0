//! Common test utilities for authorizer integration tests
//!
//! A [`Harness`] wires a transaction manager to a scripted UI, an in-memory
//! credential safe and a recording sink.

#![allow(dead_code)]

use authorizer::{RecordingSink, TransactionConfig, TransactionManager, U2fListener, WebAuthnListener};
use authorizer_ctap::cbor::{MapBuilder, Value};
use authorizer_ctap::{
    Answer, AuthenticatorConfig, CallbackSet, MemoryCredentialSafe, ScriptedInteraction,
    TestCallbacks,
};
use authorizer_transport::ctaphid::BROADCAST_CID;
use authorizer_transport::{Cmd, Message, Packet};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(5);

pub const CONDITIONS_NOT_SATISFIED: [u8; 2] = [0x69, 0x85];

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds or [`WAIT`] elapses
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Counts completion notifications
#[derive(Debug, Default)]
pub struct CountingListener {
    pub make_credential: AtomicUsize,
    pub get_assertion: AtomicUsize,
    pub u2f_register: AtomicUsize,
    pub u2f_authenticate: AtomicUsize,
}

impl WebAuthnListener for CountingListener {
    fn on_make_credential(&self) {
        self.make_credential.fetch_add(1, Ordering::SeqCst);
    }

    fn on_get_assertion(&self) {
        self.get_assertion.fetch_add(1, Ordering::SeqCst);
    }
}

impl U2fListener for CountingListener {
    fn on_u2f_register(&self) {
        self.u2f_register.fetch_add(1, Ordering::SeqCst);
    }

    fn on_u2f_authenticate(&self) {
        self.u2f_authenticate.fetch_add(1, Ordering::SeqCst);
    }
}

impl CountingListener {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct Harness {
    pub manager: TransactionManager<TestCallbacks>,
    pub sink: RecordingSink,
    pub interaction: ScriptedInteraction,
    pub safe: MemoryCredentialSafe,
    pub listener: Arc<CountingListener>,
}

impl Harness {
    pub fn new(answer: Answer) -> Self {
        Self::with_config(answer, TransactionConfig::default())
    }

    pub fn with_config(answer: Answer, config: TransactionConfig) -> Self {
        init_logging();

        let interaction = ScriptedInteraction::new(answer);
        let safe = MemoryCredentialSafe::new();
        let sink = RecordingSink::new();
        let manager = TransactionManager::with_callbacks(
            AuthenticatorConfig::default(),
            CallbackSet::new(interaction.clone(), safe.clone()),
            Arc::new(sink.clone()),
            config,
        )
        .expect("create transaction manager");

        let listener = Arc::new(CountingListener::default());
        manager.set_webauthn_listener(listener.clone());
        manager.set_u2f_listener(listener.clone());

        Self {
            manager,
            sink,
            interaction,
            safe,
            listener,
        }
    }

    /// Feed every packet of `message` to the manager
    pub fn send(&self, message: Message) {
        for packet in message.to_packets().expect("fragment request") {
            let _ = self.manager.handle_report(packet.as_bytes());
        }
    }

    /// Allocate a channel through a broadcast INIT
    pub fn allocate_channel(&self) -> u32 {
        self.send(Message::new(BROADCAST_CID, Cmd::Init, vec![0xAB; 8]));
        let reply = self.sink.take_messages().remove(0);
        assert_eq!(reply.cmd, Cmd::Init);
        u32::from_be_bytes([reply.data[8], reply.data[9], reply.data[10], reply.data[11]])
    }

    /// Send a U2F message and return the synchronous reply
    pub fn u2f(&self, cid: u32, apdu: &[u8]) -> Vec<u8> {
        self.send(Message::new(cid, Cmd::Msg, apdu.to_vec()));
        let mut replies = self.sink.take_messages();
        assert_eq!(replies.len(), 1, "expected exactly one reply");
        let reply = replies.remove(0);
        assert_eq!(reply.cmd, Cmd::Msg);
        assert_eq!(reply.cid, cid);
        reply.data
    }

    /// Send a CTAP2 request and wait for its response
    pub fn cbor(&self, cid: u32, request: Vec<u8>) -> Vec<u8> {
        self.send(Message::new(cid, Cmd::Cbor, request));
        self.cbor_response(cid)
    }

    /// Wait for the CTAP2 response on `cid`, ignoring keepalives
    pub fn cbor_response(&self, cid: u32) -> Vec<u8> {
        assert!(self.sink.wait_for(Cmd::Cbor, WAIT), "no CTAP2 response");
        let response = self
            .sink
            .take_messages()
            .into_iter()
            .find(|m| m.cmd == Cmd::Cbor)
            .expect("CTAP2 response");
        assert_eq!(response.cid, cid);
        response.data
    }

    /// Keepalive packets recorded so far
    pub fn keepalives(&self) -> Vec<Packet> {
        self.sink
            .packets()
            .into_iter()
            .filter(|p| p.cmd() == Some(Cmd::Keepalive))
            .collect()
    }
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn text_map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| (text(k), v)).collect())
}

/// authenticatorMakeCredential for `rp_id` with an ES256 key
pub fn make_credential_request(rp_id: &str, user_name: &str) -> Vec<u8> {
    let params = MapBuilder::new()
        .insert_bytes(1, &[0x5A; 32])
        .and_then(|b| {
            b.insert(
                2,
                text_map(vec![("id", text(rp_id)), ("name", text("Example"))]),
            )
        })
        .and_then(|b| {
            b.insert(
                3,
                text_map(vec![
                    ("id", Value::Bytes(vec![1, 2, 3, 4])),
                    ("name", text(user_name)),
                    ("displayName", text("Alice")),
                ]),
            )
        })
        .and_then(|b| {
            b.insert(
                4,
                Value::Array(vec![text_map(vec![
                    ("alg", Value::Integer((-7i64).into())),
                    ("type", text("public-key")),
                ])]),
            )
        })
        .and_then(|b| b.build())
        .expect("encode makeCredential");

    let mut request = vec![0x01];
    request.extend_from_slice(&params);
    request
}

/// authenticatorGetAssertion for `rp_id` without an allow list
pub fn get_assertion_request(rp_id: &str) -> Vec<u8> {
    let params = MapBuilder::new()
        .insert(1, rp_id)
        .and_then(|b| b.insert_bytes(2, &[0x6B; 32]))
        .and_then(|b| b.build())
        .expect("encode getAssertion");

    let mut request = vec![0x02];
    request.extend_from_slice(&params);
    request
}

pub fn register_apdu(challenge: &[u8; 32], application: &[u8; 32]) -> Vec<u8> {
    let mut apdu = vec![0x00, 0x01, 0x03, 0x00, 64];
    apdu.extend_from_slice(challenge);
    apdu.extend_from_slice(application);
    apdu
}

pub fn authenticate_apdu(challenge: &[u8; 32], application: &[u8; 32], key_handle: &[u8]) -> Vec<u8> {
    let mut apdu = vec![0x00, 0x02, 0x03, 0x00, (65 + key_handle.len()) as u8];
    apdu.extend_from_slice(challenge);
    apdu.extend_from_slice(application);
    apdu.push(key_handle.len() as u8);
    apdu.extend_from_slice(key_handle);
    apdu
}

/// Split a registration response into (public key, key handle)
pub fn parse_registration(data: &[u8]) -> (Vec<u8>, Vec<u8>) {
    assert_eq!(data[0], 0x05);
    let public_key = data[1..66].to_vec();
    let handle_len = usize::from(data[66]);
    (public_key, data[67..67 + handle_len].to_vec())
}
