//! Outbound report delivery

use authorizer_transport::ctaphid::{Cmd, PACKET_SIZE, Packet};
use authorizer_transport::{Append, InMessage, Message};

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Receives every report the authenticator sends to the host
///
/// Reports are delivered in order, from the thread that produced them,
/// while the transaction manager holds its lock. Implementations must not
/// call back into the manager.
pub trait ReportSink: Send + Sync {
    fn send(&self, report: &[u8; PACKET_SIZE]);
}

impl<F> ReportSink for F
where
    F: Fn(&[u8; PACKET_SIZE]) + Send + Sync,
{
    fn send(&self, report: &[u8; PACKET_SIZE]) {
        self(report)
    }
}

/// A [`ReportSink`] that keeps every report for inspection
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    shared: Arc<(Mutex<Vec<Packet>>, Condvar)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every packet received so far
    pub fn packets(&self) -> Vec<Packet> {
        self.lock().clone()
    }

    /// Remove and return every packet received so far
    pub fn take(&self) -> Vec<Packet> {
        std::mem::take(&mut *self.lock())
    }

    /// Responses reassembled from the recorded packets, keepalives included
    pub fn messages(&self) -> Vec<Message> {
        reassemble(&self.packets())
    }

    /// Like [`messages`](Self::messages) but clears the recording
    pub fn take_messages(&self) -> Vec<Message> {
        reassemble(&self.take())
    }

    /// Block until a complete message with `cmd` was recorded or `timeout` elapses
    pub fn wait_for(&self, cmd: Cmd, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (packets, recorded) = &*self.shared;
        let mut packets = packets.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if reassemble(&packets).iter().any(|m| m.cmd == cmd) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            packets = recorded
                .wait_timeout(packets, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Packet>> {
        self.shared.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReportSink for RecordingSink {
    fn send(&self, report: &[u8; PACKET_SIZE]) {
        self.lock().push(Packet::from_bytes(*report));
        self.shared.1.notify_all();
    }
}

/// Group packets into messages; an unfinished trailing message is left out
fn reassemble(packets: &[Packet]) -> Vec<Message> {
    let mut messages = Vec::new();
    let mut current: Option<InMessage> = None;

    for packet in packets {
        if packet.is_init() {
            current = InMessage::start(packet).ok();
        } else if let Some(message) = current.as_mut() {
            if message.append(packet) == Append::Dropped {
                continue;
            }
        }

        if current.as_ref().is_some_and(InMessage::is_complete) {
            if let Some(message) = current.take() {
                messages.push(message.into_message());
            }
        }
    }

    messages
}
