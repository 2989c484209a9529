//! Runner for a voice connection.
//!
//! Each [`VoiceConnection`] owns a driver made of:
//!  * a core task, which runs handshakes and owns the live gateway session,
//!  * per-session control (websocket) and UDP transmit tasks,
//!  * the frame pacer, on its own OS thread.
//!
//! All of them talk over [flume] channels, so the public API never blocks on network I/O.
//!
//! [`VoiceConnection`]: crate::VoiceConnection
//! [flume]: https://docs.rs/flume

mod config;
pub(crate) mod connection;
mod crypto;
mod schedule;
pub(crate) mod sink;
pub(crate) mod tasks;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flume::Sender;
use tasks::message::{CoreMessage, Interconnect, PacerMessage};
use tracing::error;

pub use self::config::{Config, FinishBehaviour};
pub use self::crypto::CryptoMode;
use crate::handler::Shared;
use crate::input::AudioSource;
use crate::ConnectionInfo;

/// Handle to a connection's background tasks.
#[derive(Debug)]
pub(crate) struct Driver {
    halt: Arc<AtomicBool>,
    interconnect: Interconnect,
}

impl Driver {
    /// Starts the core task and the frame pacer thread.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config, shared: Arc<Shared>) -> Self {
        let (core_tx, core_rx) = flume::unbounded();
        let (pacer_tx, pacer_rx) = flume::unbounded();
        let halt = Arc::new(AtomicBool::new(false));

        let interconnect = Interconnect {
            core: core_tx,
            pacer: pacer_tx,
        };

        tasks::start(
            config,
            shared,
            core_rx,
            interconnect.clone(),
            pacer_rx,
            Arc::clone(&halt),
        );

        Self { halt, interconnect }
    }

    /// Starts a gateway session for handshake `generation`.
    pub fn connect(&self, info: ConnectionInfo, generation: u64) {
        self.send_core(CoreMessage::Connect(info, generation));
    }

    /// Tears down the gateway session, if any. Idempotent.
    pub fn leave(&self) {
        drop(self.interconnect.core.send(CoreMessage::Disconnect));
    }

    /// Stops frame production at once and shuts the pacer down. Idempotent.
    pub fn halt(&self) {
        self.halt.store(true, Ordering::Release);
        drop(self.interconnect.pacer.send(PacerMessage::Poison));
    }

    pub fn set_source(&self, source: Option<Box<dyn AudioSource>>) {
        self.send_pacer(PacerMessage::SetSource(source));
    }

    pub fn set_filler(&self, source: Option<Box<dyn AudioSource>>) {
        self.send_pacer(PacerMessage::SetFiller(source));
    }

    pub fn mute(&self, muted: bool) {
        self.send_pacer(PacerMessage::SetMute(muted));
    }

    fn send_core(&self, msg: CoreMessage) {
        if self.interconnect.core.send(msg).is_err() {
            error!("Voice driver core task has stopped.");
        }
    }

    fn send_pacer(&self, msg: PacerMessage) {
        if self.halt.load(Ordering::Acquire) {
            return;
        }

        if self.interconnect.pacer.send(msg).is_err() {
            error!("Frame pacer has stopped.");
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.halt();
        self.interconnect.poison_all();
    }
}
