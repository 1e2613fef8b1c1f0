//! Keepalive ticker for long-running CTAP2 commands

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

/// Calls a tick function at a fixed interval until dropped
#[derive(Debug)]
pub struct Keepalive {
    _stop: Sender<()>,
}

impl Keepalive {
    /// Spawn the ticker; the first tick comes one `interval` after start
    pub fn start<F>(interval: Duration, tick: F) -> io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        thread::Builder::new()
            .name("authorizer-keepalive".to_string())
            .spawn(move || {
                // Dropping the sender disconnects the channel and ends the loop
                while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(interval) {
                    tick();
                }
            })?;
        Ok(Self { _stop: stop })
    }
}
