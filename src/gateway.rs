//! Main gateway events and commands which drive a voice connection.
//!
//! The voice state and voice server events are how credentials reach a [`VoiceConnection`]; the
//! voice state update is how a connection asks to join, move, mute or leave.
//!
//! [`VoiceConnection`]: crate::VoiceConnection

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::VOICE_STATE_UPDATE_OPCODE;
use crate::id::{ChannelId, GuildId, UserId};

/// A user's voice state changed: joined, moved, muted or left.
///
/// When it concerns the local user, its `session_id` is the voice session credential.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[non_exhaustive]
pub struct VoiceStateEvent {
    /// Guild of the voice channel, absent for private calls.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// Channel the user is now in, or `None` if they left voice.
    pub channel_id: Option<ChannelId>,
    /// The user whose state changed.
    pub user_id: UserId,
    /// Voice session id assigned to the user.
    pub session_id: String,
    #[serde(default)]
    pub self_mute: bool,
    #[serde(default)]
    pub self_deaf: bool,
}

impl VoiceStateEvent {
    #[must_use]
    pub fn new(
        guild_id: Option<GuildId>,
        channel_id: Option<ChannelId>,
        user_id: UserId,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            guild_id,
            channel_id,
            user_id,
            session_id: session_id.into(),
            self_mute: false,
            self_deaf: false,
        }
    }
}

/// A voice server was allocated (or reallocated) for a guild's call.
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
#[non_exhaustive]
pub struct VoiceServerEvent {
    pub guild_id: GuildId,
    /// Host of the voice gateway. `None` means the old server went away and a new one is
    /// still being allocated.
    pub endpoint: Option<String>,
    /// Ephemeral secret authenticating the voice session.
    pub token: String,
}

impl VoiceServerEvent {
    #[must_use]
    pub fn new(guild_id: GuildId, endpoint: Option<String>, token: impl Into<String>) -> Self {
        Self {
            guild_id,
            endpoint,
            token: token.into(),
        }
    }
}

impl fmt::Debug for VoiceServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceServerEvent")
            .field("guild_id", &self.guild_id)
            .field("endpoint", &self.endpoint)
            .field("token", &"<secret>")
            .finish()
    }
}

/// Request to the main gateway to join, move within or leave voice in a guild.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct VoiceStateUpdate {
    pub guild_id: GuildId,
    /// Target channel, or `None` to leave.
    pub channel_id: Option<ChannelId>,
    pub self_mute: bool,
    pub self_deaf: bool,
}

impl VoiceStateUpdate {
    /// The full gateway frame for this command.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        json!({
            "op": VOICE_STATE_UPDATE_OPCODE,
            "d": {
                "guild_id": self.guild_id,
                "channel_id": self.channel_id,
                "self_mute": self.self_mute,
                "self_deaf": self.self_deaf,
            }
        })
    }
}
