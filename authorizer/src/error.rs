//! Error types for the transaction engine

use authorizer_ctap::StatusCode;

use thiserror::Error;

/// Result type for transaction operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the host
///
/// Framing errors have already been answered on the wire by the time they
/// are returned; they are handed back for logging.
#[derive(Debug, Error)]
pub enum Error {
    /// A report was rejected by the framing layer
    #[error(transparent)]
    Transport(#[from] authorizer_transport::Error),

    /// The authenticator could not be set up
    #[error("authenticator error: {0}")]
    Ctap(#[from] StatusCode),

    /// A worker thread could not be started
    #[error("failed to start worker: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Channel the error was reported on, for framing errors
    pub fn cid(&self) -> Option<u32> {
        match self {
            Error::Transport(e) => Some(e.cid()),
            _ => None,
        }
    }
}
