use serde::{Deserialize, Serialize};

use crate::id::{GuildId, UserId};

/// Used to begin a voice websocket connection.
#[derive(Clone, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Identify {
    /// Guild which the target voice channel belongs to.
    pub server_id: GuildId,
    /// Authentication session received from the main gateway's voice state event.
    pub session_id: String,
    /// Authentication token received from the main gateway's voice server event.
    pub token: String,
    /// User who is connecting.
    pub user_id: UserId,
}

impl std::fmt::Debug for Identify {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identify")
            .field("server_id", &self.server_id)
            .field("session_id", &self.session_id)
            .field("token", &"<secret>")
            .field("user_id", &self.user_id)
            .finish()
    }
}
