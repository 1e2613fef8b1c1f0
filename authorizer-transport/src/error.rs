//! Framing error types
//!
//! Every error names the channel it is reported on.

use crate::ctaphid::{ErrorCode, Packet};

use thiserror::Error;

/// Framing result type
pub type Result<T> = std::result::Result<T, Error>;

/// CTAPHID framing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid command on channel {cid:#010x}")]
    InvalidCommand { cid: u32 },

    #[error("invalid parameter on channel {cid:#010x}")]
    InvalidParameter { cid: u32 },

    #[error("invalid length on channel {cid:#010x}")]
    InvalidLength { cid: u32 },

    #[error("invalid sequence on channel {cid:#010x}")]
    InvalidSequence { cid: u32 },

    #[error("message timed out on channel {cid:#010x}")]
    MessageTimeout { cid: u32 },

    #[error("channel {cid:#010x} busy")]
    ChannelBusy { cid: u32 },

    #[error("invalid channel {cid:#010x}")]
    InvalidChannel { cid: u32 },

    #[error("unspecified error on channel {cid:#010x}")]
    Other { cid: u32 },
}

impl Error {
    /// Channel the error is reported on
    pub fn cid(&self) -> u32 {
        match *self {
            Error::InvalidCommand { cid }
            | Error::InvalidParameter { cid }
            | Error::InvalidLength { cid }
            | Error::InvalidSequence { cid }
            | Error::MessageTimeout { cid }
            | Error::ChannelBusy { cid }
            | Error::InvalidChannel { cid }
            | Error::Other { cid } => cid,
        }
    }

    /// CTAPHID error code carried in the error response
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidCommand { .. } => ErrorCode::InvalidCmd,
            Error::InvalidParameter { .. } => ErrorCode::InvalidPar,
            Error::InvalidLength { .. } => ErrorCode::InvalidLen,
            Error::InvalidSequence { .. } => ErrorCode::InvalidSeq,
            Error::MessageTimeout { .. } => ErrorCode::MsgTimeout,
            Error::ChannelBusy { .. } => ErrorCode::ChannelBusy,
            Error::InvalidChannel { .. } => ErrorCode::InvalidChannel,
            Error::Other { .. } => ErrorCode::Other,
        }
    }

    /// The single-packet error response for this error
    pub fn to_packet(&self) -> Packet {
        Packet::new_error(self.cid(), self.code())
    }
}
