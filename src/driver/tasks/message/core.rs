use crate::ConnectionInfo;

#[derive(Debug)]
pub(crate) enum CoreMessage {
    /// Start a fresh gateway session for the given handshake generation.
    Connect(ConnectionInfo, u64),
    /// The session of `generation` ended; `reconnect` is false for closes which forbid it.
    ConnectionLost { generation: u64, reconnect: bool },
    Disconnect,
    Poison,
}
