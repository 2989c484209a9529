use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::driver::Config;
use crate::error::{JoinError, JoinResult};
use crate::gateway::{VoiceServerEvent, VoiceStateEvent};
use crate::handler::VoiceConnection;
use crate::id::{ChannelId, GuildId, UserId};
use crate::shards::GatewaySender;

/// A registry of [`VoiceConnection`]s belonging to one bot user, keyed by guild.
///
/// A user can only be in one voice channel per guild, so joining another channel in the same
/// guild replaces the existing connection. Gateway events are routed to the connection they
/// concern through [`handle_voice_state`] and [`handle_voice_server`].
///
/// [`handle_voice_state`]: VoiceManager::handle_voice_state
/// [`handle_voice_server`]: VoiceManager::handle_voice_server
pub struct VoiceManager {
    calls: RwLock<HashMap<GuildId, Arc<VoiceConnection>>>,
    config: Config,
    gateway: Arc<dyn GatewaySender>,
    user_id: UserId,
}

impl VoiceManager {
    /// Creates a manager for `user_id`, sending voice state updates through `gateway`.
    pub fn new(user_id: UserId, gateway: Arc<dyn GatewaySender>, config: Config) -> Self {
        Self {
            calls: RwLock::new(HashMap::new()),
            config,
            gateway,
            user_id,
        }
    }

    /// Retrieves the live connection for the given guild, if one exists.
    ///
    /// A connection which has closed for good (e.g. after being kicked) is removed instead.
    pub fn get<G: Into<GuildId>>(&self, guild_id: G) -> Option<Arc<VoiceConnection>> {
        let guild_id = guild_id.into();
        let call = self.calls.read().get(&guild_id).cloned()?;

        if call.state().is_terminal() {
            let mut calls = self.calls.write();
            if calls.get(&guild_id).is_some_and(|c| Arc::ptr_eq(c, &call)) {
                calls.remove(&guild_id);
            }
            return None;
        }

        Some(call)
    }

    /// Joins `channel_id`, creating a connection if needed.
    ///
    /// An existing live connection to the same channel is returned as-is. A connection to
    /// another channel of the guild is shut down and replaced. The returned connection is
    /// awaiting credentials from the main gateway.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    #[instrument(skip(self))]
    pub fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Arc<VoiceConnection> {
        let mut calls = self.calls.write();

        if let Some(call) = calls.get(&guild_id) {
            if call.channel() == channel_id && !call.state().is_terminal() {
                return Arc::clone(call);
            }
        }

        let call = Arc::new(VoiceConnection::new(
            guild_id,
            channel_id,
            self.user_id,
            Some(Arc::clone(&self.gateway)),
            self.config.clone(),
        ));

        if let Some(old) = calls.insert(guild_id, Arc::clone(&call)) {
            debug!("Replacing connection to channel {}.", old.channel());
            // The new join request already moves the user out of the old channel.
            old.terminate();
        }

        call
    }

    /// Leaves the guild's voice channel and removes its connection.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::NoCall`] if there is no connection for the guild.
    #[instrument(skip(self))]
    pub fn leave(&self, guild_id: GuildId) -> JoinResult<()> {
        let call = self.calls.write().remove(&guild_id).ok_or(JoinError::NoCall)?;

        call.disconnect();

        Ok(())
    }

    /// Routes a voice state event from the main gateway.
    ///
    /// Only events about this manager's user are of interest. A `None` channel means the user
    /// left (or was moved out by someone else), so the connection is dropped. A different
    /// channel means the user was moved, so the connection is replaced by one for the new
    /// channel.
    pub fn handle_voice_state(&self, event: &VoiceStateEvent) {
        if event.user_id != self.user_id {
            return;
        }

        let Some(guild_id) = event.guild_id else {
            return;
        };

        let Some(channel_id) = event.channel_id else {
            if let Some(call) = self.calls.write().remove(&guild_id) {
                debug!("Left voice in guild {}; removing connection.", guild_id);
                call.terminate();
            }
            return;
        };

        let call = {
            let mut calls = self.calls.write();

            match calls.get(&guild_id) {
                Some(call) if call.channel() == channel_id => Arc::clone(call),
                Some(_) => {
                    debug!("Moved to channel {} in guild {}.", channel_id, guild_id);

                    let call = Arc::new(VoiceConnection::joined(
                        guild_id,
                        channel_id,
                        self.user_id,
                        Arc::clone(&self.gateway),
                        self.config.clone(),
                    ));

                    if let Some(old) = calls.insert(guild_id, Arc::clone(&call)) {
                        old.terminate();
                    }

                    call
                },
                None => return,
            }
        };

        call.update_state(event.session_id.clone());
    }

    /// Routes a voice server event from the main gateway.
    pub fn handle_voice_server(&self, event: &VoiceServerEvent) {
        if let Some(call) = self.get(event.guild_id) {
            call.update_server(event.endpoint.clone(), event.token.clone());
        }
    }
}

impl std::fmt::Debug for VoiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceManager")
            .field("calls", &self.calls.read().keys().collect::<Vec<_>>())
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}
