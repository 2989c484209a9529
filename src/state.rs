use std::fmt;

/// Externally visible lifecycle of a [`VoiceConnection`].
///
/// ```text
/// Idle -> AwaitingCredentials -> Connecting -> Established -> {Reconnecting, Disconnected}
/// ```
///
/// [`Disconnected`] is terminal.
///
/// [`VoiceConnection`]: crate::VoiceConnection
/// [`Disconnected`]: ConnectionState::Disconnected
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ConnectionState {
    /// Created, with no join requested and no credential received.
    Idle,
    /// Waiting for the session id, token and endpoint to all be present.
    AwaitingCredentials,
    /// All credentials arrived; the voice gateway handshake is in progress.
    Connecting,
    /// The handshake completed and audio may flow.
    Established,
    /// The gateway session was lost. A fresh credential set is required to connect again.
    Reconnecting,
    /// The connection is closed for good.
    Disconnected(DisconnectReason),
}

impl ConnectionState {
    /// Whether this state can never be left.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::AwaitingCredentials => f.write_str("awaiting credentials"),
            Self::Connecting => f.write_str("connecting"),
            Self::Established => f.write_str("established"),
            Self::Reconnecting => f.write_str("reconnecting"),
            Self::Disconnected(reason) => write!(f, "disconnected ({reason})"),
        }
    }
}

/// Why a connection reached [`ConnectionState::Disconnected`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// The owner called [`VoiceConnection::disconnect`].
    ///
    /// [`VoiceConnection::disconnect`]: crate::VoiceConnection::disconnect
    Requested,
    /// Every handshake attempt allowed by the retry budget failed.
    HandshakeFailed,
    /// The voice server closed the session with a code that forbids reconnecting, e.g. after
    /// the channel was deleted or the user was kicked.
    Kicked,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Requested => "requested",
            Self::HandshakeFailed => "handshake failed",
            Self::Kicked => "closed by server",
        })
    }
}
