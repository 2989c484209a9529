use std::time::Duration;

use super::CryptoMode;

/// What the frame pacer does once the active source reports that it has finished.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum FinishBehaviour {
    /// Switch to a fresh copy of the filler source, if one is set.
    #[default]
    Fallback,
    /// Stop pulling audio until a new source is set.
    Stop,
}

/// Configuration for a voice connection's driver.
///
/// Fields are set with the chained builder methods:
///
/// ```rust
/// use std::time::Duration;
///
/// use warbler::{Config, CryptoMode};
///
/// let config = Config::default()
///     .crypto_mode(CryptoMode::Lite)
///     .connect_attempts(5)
///     .handshake_timeout(Duration::from_secs(5));
/// ```
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Config {
    /// Encryption scheme requested during session negotiation.
    ///
    /// Defaults to [`CryptoMode::Normal`].
    pub crypto_mode: CryptoMode,
    /// Upper bound on each step of the voice gateway handshake.
    ///
    /// Defaults to 10 seconds.
    pub handshake_timeout: Duration,
    /// Number of times a full handshake is attempted before the connection is given up as
    /// [`DisconnectReason::HandshakeFailed`].
    ///
    /// Defaults to 3.
    ///
    /// [`DisconnectReason::HandshakeFailed`]: crate::DisconnectReason::HandshakeFailed
    pub connect_attempts: usize,
    /// Wait before the second handshake attempt, doubled for each further attempt.
    ///
    /// Defaults to 500 milliseconds.
    pub retry_backoff: Duration,
    /// Behaviour when the active audio source finishes.
    pub on_finish: FinishBehaviour,
    /// Silence frames sent after audio stops, before the speaking flag is cleared.
    ///
    /// Defaults to 5.
    pub trailing_silence_frames: u8,
    /// Whether to join deafened.
    pub self_deaf: bool,
    /// Whether to join muted.
    pub self_mute: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crypto_mode: CryptoMode::Normal,
            handshake_timeout: Duration::from_secs(10),
            connect_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            on_finish: FinishBehaviour::Fallback,
            trailing_silence_frames: 5,
            self_deaf: false,
            self_mute: false,
        }
    }
}

impl Config {
    /// Sets this `Config`'s chosen cryptographic tagging scheme.
    #[must_use]
    pub fn crypto_mode(mut self, crypto_mode: CryptoMode) -> Self {
        self.crypto_mode = crypto_mode;
        self
    }

    /// Sets the time allowed for each handshake step.
    #[must_use]
    pub fn handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    /// Sets the number of handshake attempts. Values below 1 are treated as 1.
    #[must_use]
    pub fn connect_attempts(mut self, connect_attempts: usize) -> Self {
        self.connect_attempts = connect_attempts;
        self
    }

    /// Sets the initial backoff between handshake attempts.
    #[must_use]
    pub fn retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    #[must_use]
    pub fn on_finish(mut self, on_finish: FinishBehaviour) -> Self {
        self.on_finish = on_finish;
        self
    }

    #[must_use]
    pub fn trailing_silence_frames(mut self, frames: u8) -> Self {
        self.trailing_silence_frames = frames;
        self
    }

    #[must_use]
    pub fn self_deaf(mut self, self_deaf: bool) -> Self {
        self.self_deaf = self_deaf;
        self
    }

    #[must_use]
    pub fn self_mute(mut self, self_mute: bool) -> Self {
        self.self_mute = self_mute;
        self
    }
}
