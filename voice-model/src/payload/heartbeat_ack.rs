use serde::{Deserialize, Serialize};

/// Server acknowledgement of a [`Heartbeat`], echoing its nonce.
///
/// [`Heartbeat`]: super::Heartbeat
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HeartbeatAck {
    pub nonce: u64,
}
