//! Handles to the main gateway used to send voice state updates.

use std::sync::Arc;

use futures::channel::mpsc::UnboundedSender;
use serde_json::Value;
use tracing::error;

use crate::error::{JoinError, JoinResult};
use crate::gateway::VoiceStateUpdate;

/// A path to the main gateway connection responsible for a guild.
///
/// Implemented for the channel halves a shard runner typically listens on, so that a voice
/// connection can be wired to an existing gateway client without any glue code.
pub trait GatewaySender: Send + Sync {
    /// Queues a voice state update (opcode 4) for the main gateway.
    fn send_voice_state_update(&self, update: &VoiceStateUpdate) -> JoinResult<()>;
}

impl GatewaySender for UnboundedSender<Value> {
    fn send_voice_state_update(&self, update: &VoiceStateUpdate) -> JoinResult<()> {
        self.unbounded_send(update.to_payload()).map_err(|e| {
            error!("Error sending voice state update to gateway: {:?}", e);
            JoinError::Dropped
        })
    }
}

impl GatewaySender for flume::Sender<Value> {
    fn send_voice_state_update(&self, update: &VoiceStateUpdate) -> JoinResult<()> {
        self.send(update.to_payload()).map_err(|e| {
            error!("Error sending voice state update to gateway: {:?}", e);
            JoinError::Dropped
        })
    }
}

impl<T: GatewaySender + ?Sized> GatewaySender for Arc<T> {
    fn send_voice_state_update(&self, update: &VoiceStateUpdate) -> JoinResult<()> {
        (**self).send_voice_state_update(update)
    }
}

/// Sends through `gateway` if one is attached.
pub(crate) fn send_update(
    gateway: Option<&dyn GatewaySender>,
    update: &VoiceStateUpdate,
) -> JoinResult<()> {
    gateway.ok_or(JoinError::NoSender)?.send_voice_state_update(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::GuildId;

    fn leave(guild: u64) -> VoiceStateUpdate {
        VoiceStateUpdate {
            guild_id: GuildId(guild),
            channel_id: None,
            self_mute: false,
            self_deaf: false,
        }
    }

    #[test]
    fn flume_sender_forwards_payload() {
        let (tx, rx) = flume::unbounded();

        tx.send_voice_state_update(&leave(7)).unwrap();

        let payload = rx.try_recv().unwrap();
        assert_eq!(payload["op"], 4);
        assert_eq!(payload["d"]["guild_id"], "7");
    }

    #[test]
    fn dropped_receiver_is_reported() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<Value>();
        drop(rx);

        assert!(matches!(tx.send_voice_state_update(&leave(1)), Err(JoinError::Dropped)));
    }

    #[test]
    fn missing_gateway_is_reported() {
        assert!(matches!(send_update(None, &leave(1)), Err(JoinError::NoSender)));
    }
}
