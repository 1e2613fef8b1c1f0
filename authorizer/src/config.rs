//! Transaction timing configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Time allowed between two packets of one message
pub const DEFAULT_CONTINUATION_TIMEOUT: Duration = Duration::from_millis(500);

/// Time a U2F presence check stays alive without a client retry
pub const DEFAULT_U2F_RETRY_TIMEOUT: Duration = Duration::from_millis(3000);

/// Interval between keepalives while a CTAP2 command runs
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_millis(75);

/// Timeouts driving the transaction manager
///
/// How long a prompt waits for the user is part of
/// [`AuthenticatorConfig`](authorizer_ctap::AuthenticatorConfig).
///
/// # Example
///
/// ```
/// use authorizer::TransactionConfig;
/// use std::time::Duration;
///
/// let config = TransactionConfig::new()
///     .with_keepalive_interval(Duration::from_millis(100));
/// assert_eq!(config.keepalive_interval, Duration::from_millis(100));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Per-message reassembly timeout, re-armed on each accepted packet
    pub continuation_timeout: Duration,

    /// How long a pending U2F presence check waits for the next poll
    pub u2f_retry_timeout: Duration,

    /// Keepalive period for CTAP2 commands
    pub keepalive_interval: Duration,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionConfig {
    pub fn new() -> Self {
        Self {
            continuation_timeout: DEFAULT_CONTINUATION_TIMEOUT,
            u2f_retry_timeout: DEFAULT_U2F_RETRY_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }

    pub fn with_continuation_timeout(mut self, timeout: Duration) -> Self {
        self.continuation_timeout = timeout;
        self
    }

    pub fn with_u2f_retry_timeout(mut self, timeout: Duration) -> Self {
        self.u2f_retry_timeout = timeout;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }
}
