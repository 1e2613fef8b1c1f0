//! U2F presence polling
//!
//! A U2F request that needs the user's presence is answered with
//! CONDITIONS_NOT_SATISFIED right away. The client repeats the exact same
//! request until the held-back reply is released.

use authorizer_ctap::{Outcome, PendingPrompt, U2fReply};
use authorizer_transport::Message;

use std::time::{Duration, Instant};

/// Where a presence check stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Presence {
    Pending,
    Cancelled,
    Accepted,
    Denied,
}

/// A U2F reply waiting for the user to confirm presence
#[derive(Debug)]
pub(crate) struct U2fContinuation {
    request: Message,
    presence: PendingPrompt<bool>,
    reply: U2fReply,
    started: Instant,
}

impl U2fContinuation {
    pub fn new(request: Message, presence: PendingPrompt<bool>, reply: U2fReply) -> Self {
        Self {
            request,
            presence,
            reply,
            started: Instant::now(),
        }
    }

    /// Whether `message` repeats the request that started this continuation
    pub fn is_retry(&self, message: &Message) -> bool {
        self.request == *message
    }

    pub fn cid(&self) -> u32 {
        self.request.cid
    }

    pub fn reply(&self) -> &U2fReply {
        &self.reply
    }

    /// Poll the presence check; an unanswered check expires after `timeout`
    pub fn poll(&self, timeout: Duration) -> Presence {
        match self.presence.try_outcome() {
            Outcome::Pending if self.started.elapsed() >= timeout => {
                self.presence.cancel();
                Presence::Denied
            }
            Outcome::Pending => Presence::Pending,
            Outcome::Cancelled => Presence::Cancelled,
            Outcome::Resolved(true) => Presence::Accepted,
            Outcome::Resolved(false) => Presence::Denied,
        }
    }

    /// Withdraw the presence prompt
    pub fn cancel(&self) {
        self.presence.cancel();
    }
}
