//! CTAPHID framing
//!
//! This crate provides the USB HID framing used by CTAP authenticators:
//! - Packet parsing and message fragmentation
//! - Channel id allocation
//! - Reassembly of one fragmented message
//!
//! Driving the framing (timeouts, the single active transaction, dispatch)
//! is left to the caller.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#usb>

pub mod channel;
pub mod ctaphid;
pub mod error;

// Re-export commonly used types
pub use channel::{Append, ChannelAllocator, InMessage};
pub use ctaphid::{Cmd, ErrorCode, InitResponse, KeepaliveStatus, Message, Packet};
pub use error::{Error, Result};
