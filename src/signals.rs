//! Process signals for the long-running binary.
//!
//! SIGHUP asks for the bot definition to be reloaded in place; SIGTERM and
//! SIGINT end the process after the message in flight.

use tokio::signal::unix::{signal, Signal as UnixSignal, SignalKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Reload,
    Shutdown,
}

pub struct Signals {
    hangup: UnixSignal,
    terminate: UnixSignal,
    interrupt: UnixSignal,
}

impl Signals {
    /// Install the handlers. Must be called from within a tokio runtime.
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for the next signal
    pub async fn recv(&mut self) -> Signal {
        tokio::select! {
            _ = self.hangup.recv() => {
                tracing::info!("Received SIGHUP - reloading bot definition");
                Signal::Reload
            }
            _ = self.terminate.recv() => {
                tracing::info!("Received SIGTERM - shutting down");
                Signal::Shutdown
            }
            _ = self.interrupt.recv() => {
                tracing::info!("Received SIGINT - shutting down");
                Signal::Shutdown
            }
        }
    }
}
