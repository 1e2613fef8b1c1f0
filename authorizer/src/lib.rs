#![warn(unused_extern_crates)]

//! # authorizer
//!
//! A FIDO2/U2F authenticator engine speaking CTAPHID.
//!
//! The host feeds raw HID reports to a [`TransactionManager`] and forwards
//! whatever it writes to the [`ReportSink`] back to the client. Prompts and
//! credential storage are supplied through
//! [`AuthenticatorCallbacks`](authorizer_ctap::AuthenticatorCallbacks).
//!
//! ## Architecture
//!
//! - **Framing** ([`authorizer_transport`]): packets, channel ids, reassembly
//! - **Transaction manager**: the single active message, U2F presence
//!   polling, CTAP2 workers with keepalives, timeouts
//! - **Authenticator** ([`authorizer_ctap`]): CTAP2 and U2F commands, PIN
//!   handling, attestation
//! - **Crypto** ([`authorizer_crypto`]): ECDH, ECDSA, PIN protocol one
//!
//! ## Example
//!
//! ```
//! use authorizer::{TransactionConfig, TransactionManager};
//! use authorizer_ctap::{Answer, AuthenticatorConfig, CallbackSet, MemoryCredentialSafe, ScriptedInteraction};
//! use std::sync::Arc;
//!
//! let callbacks = CallbackSet::new(ScriptedInteraction::new(Answer::Accept), MemoryCredentialSafe::new());
//! let sink = |report: &[u8; 64]| println!("{report:02x?}");
//! let manager = TransactionManager::with_callbacks(
//!     AuthenticatorConfig::default(),
//!     callbacks,
//!     Arc::new(sink),
//!     TransactionConfig::default(),
//! )?;
//! assert!(!manager.is_busy());
//! # Ok::<(), authorizer::Error>(())
//! ```

mod continuation;

pub mod config;
pub mod error;
pub mod keepalive;
pub mod listener;
pub mod sink;
pub mod timer;
pub mod transaction;

// Re-export main types at root level for convenience
pub use config::TransactionConfig;
pub use error::{Error, Result};
pub use listener::{U2fListener, WebAuthnListener};
pub use sink::{RecordingSink, ReportSink};
pub use transaction::TransactionManager;

pub use authorizer_crypto as crypto;
pub use authorizer_ctap as ctap;
pub use authorizer_transport as transport;
