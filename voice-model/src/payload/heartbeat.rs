use serde::{Deserialize, Serialize};

/// Periodic keep-alive sent by the client, carrying a nonce the server echoes back.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Heartbeat {
    pub nonce: u64,
}
