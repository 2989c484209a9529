use std::fmt;

use crate::id::{ChannelId, GuildId, UserId};
use crate::state::{ConnectionState, DisconnectReason};

/// Parameters and information needed to start communicating with a voice server.
#[derive(Clone, Eq, PartialEq)]
pub struct ConnectionInfo {
    /// ID of the voice channel being joined.
    pub channel_id: ChannelId,
    /// URL of the voice websocket gateway server assigned to this call.
    pub endpoint: String,
    /// ID of the target voice channel's parent guild.
    pub guild_id: GuildId,
    /// Unique string describing this session for validation/authentication purposes.
    pub session_id: String,
    /// Ephemeral secret used to validate the above session.
    pub token: String,
    /// UserID of this client.
    pub user_id: UserId,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("channel_id", &self.channel_id)
            .field("endpoint", &self.endpoint)
            .field("guild_id", &self.guild_id)
            .field("session_id", &self.session_id)
            .field("token", &"<secret>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// The channel and identity a connection is bound to for its whole lifetime.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct Target {
    pub channel_id: ChannelId,
    pub guild_id: GuildId,
    pub user_id: UserId,
}

/// A handshake transition which fired: the gateway session to start and its generation.
#[derive(Clone, Debug)]
pub(crate) struct Attempt {
    pub generation: u64,
    pub info: ConnectionInfo,
}

/// Credential accumulator and latch for one voice connection.
///
/// The three credentials arrive independently, in any order, and may be re-sent. This type is
/// not synchronised: owners keep it behind a single lock so that the check-and-latch in
/// [`try_connect`] observes all three fields at once.
///
/// [`try_connect`]: Handshake::try_connect
#[derive(Clone)]
pub(crate) struct Handshake {
    session_id: Option<String>,
    token: Option<String>,
    endpoint: Option<String>,
    connecting_or_connected: bool,
    generation: u64,
    state: ConnectionState,
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            session_id: None,
            token: None,
            endpoint: None,
            connecting_or_connected: false,
            generation: 0,
            state: ConnectionState::Idle,
        }
    }
}

impl fmt::Debug for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake")
            .field("session_id", &self.session_id)
            .field("token_is_some", &self.token.is_some())
            .field("endpoint", &self.endpoint)
            .field("connecting_or_connected", &self.connecting_or_connected)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .finish()
    }
}

impl Handshake {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn is_connecting_or_connected(&self) -> bool {
        self.connecting_or_connected
    }

    /// Whether `generation` names the live (non-terminal) gateway session.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.connecting_or_connected && !self.state.is_terminal()
    }

    /// Marks that credentials have been requested from the main gateway.
    pub fn await_credentials(&mut self) -> bool {
        if self.state == ConnectionState::Idle {
            self.state = ConnectionState::AwaitingCredentials;
            true
        } else {
            false
        }
    }

    pub fn set_session_id(&mut self, session_id: String) {
        self.session_id = Some(session_id);
        self.await_credentials();
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
        self.await_credentials();
    }

    pub fn set_endpoint(&mut self, endpoint: String) {
        self.endpoint = Some(endpoint);
        self.await_credentials();
    }

    /// Flips the latch if every credential is present and no session is running.
    ///
    /// Fires at most once per arming; [`lose`] is the only way to re-arm.
    ///
    /// [`lose`]: Handshake::lose
    pub fn try_connect(&mut self, target: Target) -> Option<Attempt> {
        if self.connecting_or_connected || self.state.is_terminal() {
            return None;
        }

        let (Some(session_id), Some(token), Some(endpoint)) =
            (&self.session_id, &self.token, &self.endpoint)
        else {
            return None;
        };

        let info = ConnectionInfo {
            channel_id: target.channel_id,
            endpoint: endpoint.clone(),
            guild_id: target.guild_id,
            session_id: session_id.clone(),
            token: token.clone(),
            user_id: target.user_id,
        };

        self.connecting_or_connected = true;
        self.generation += 1;
        self.state = ConnectionState::Connecting;

        Some(Attempt {
            generation: self.generation,
            info,
        })
    }

    /// `Connecting -> Established` for the live session.
    pub fn establish(&mut self, generation: u64) -> bool {
        if self.is_current(generation) && self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Established;
            true
        } else {
            false
        }
    }

    /// The live session was lost: re-arm for a fresh credential set.
    ///
    /// The session id survives, as the platform may reuse it; token and endpoint do not.
    pub fn lose(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }

        self.connecting_or_connected = false;
        self.token = None;
        self.endpoint = None;
        self.state = ConnectionState::Reconnecting;

        true
    }

    /// The live session ended in a way that forbids reconnecting.
    pub fn fail(&mut self, generation: u64, reason: DisconnectReason) -> bool {
        if !self.is_current(generation) {
            return false;
        }

        self.state = ConnectionState::Disconnected(reason);

        true
    }

    /// Explicit disconnect. Returns `false` if already disconnected.
    pub fn close(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }

        self.state = ConnectionState::Disconnected(DisconnectReason::Requested);

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: Target = Target {
        channel_id: ChannelId(3),
        guild_id: GuildId(1),
        user_id: UserId(2),
    };

    const ORDERS: [[usize; 3]; 6] =
        [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

    fn apply(handshake: &mut Handshake, field: usize) {
        match field {
            0 => handshake.set_session_id("abc".into()),
            1 => handshake.set_token("tok".into()),
            _ => handshake.set_endpoint("ep1".into()),
        }
    }

    #[test]
    fn fires_exactly_once_for_every_order() {
        for order in ORDERS {
            let mut handshake = Handshake::default();
            let mut fired = 0;

            for field in order {
                assert!(!handshake.is_connecting_or_connected());
                apply(&mut handshake, field);
                fired += usize::from(handshake.try_connect(TARGET).is_some());
            }

            for _ in 0..5 {
                fired += usize::from(handshake.try_connect(TARGET).is_some());
            }

            assert_eq!(fired, 1, "order {order:?}");
            assert_eq!(handshake.state(), ConnectionState::Connecting);
        }
    }

    #[test]
    fn incomplete_credentials_never_fire() {
        let mut handshake = Handshake::default();
        assert!(handshake.try_connect(TARGET).is_none());
        assert_eq!(handshake.state(), ConnectionState::Idle);

        handshake.set_session_id("abc".into());
        handshake.set_endpoint("ep1".into());
        // Re-sent endpoint, e.g. after a region migration.
        handshake.set_endpoint("ep2".into());

        assert!(handshake.try_connect(TARGET).is_none());
        assert_eq!(handshake.state(), ConnectionState::AwaitingCredentials);
    }

    #[test]
    fn fired_attempt_carries_latest_credentials() {
        let mut handshake = Handshake::default();
        handshake.set_endpoint("old".into());
        handshake.set_token("tok".into());
        handshake.set_endpoint("ep1".into());
        handshake.set_session_id("abc".into());

        let attempt = handshake.try_connect(TARGET).expect("all credentials present");

        assert_eq!(attempt.generation, 1);
        assert_eq!(attempt.info.session_id, "abc");
        assert_eq!(attempt.info.token, "tok");
        assert_eq!(attempt.info.endpoint, "ep1");
        assert_eq!(attempt.info.guild_id, GuildId(1));
        assert_eq!(attempt.info.channel_id, ChannelId(3));
        assert_eq!(attempt.info.user_id, UserId(2));
    }

    #[test]
    fn loss_rearms_for_fresh_credentials() {
        let mut handshake = Handshake::default();
        for field in [0, 1, 2] {
            apply(&mut handshake, field);
        }

        let first = handshake.try_connect(TARGET).expect("first attempt fires");
        assert!(handshake.establish(first.generation));
        assert_eq!(handshake.state(), ConnectionState::Established);

        assert!(handshake.lose(first.generation));
        assert_eq!(handshake.state(), ConnectionState::Reconnecting);
        assert!(!handshake.is_connecting_or_connected());
        assert_eq!(handshake.session_id(), Some("abc"));
        assert_eq!(handshake.token(), None);
        assert_eq!(handshake.endpoint(), None);

        assert!(handshake.try_connect(TARGET).is_none());

        handshake.set_token("tok2".into());
        handshake.set_endpoint("ep2".into());

        let second = handshake.try_connect(TARGET).expect("re-armed attempt fires");
        assert!(handshake.try_connect(TARGET).is_none());
        assert_eq!(second.generation, first.generation + 1);
        assert_eq!(second.info.token, "tok2");

        // Reports from the discarded session are ignored.
        assert!(!handshake.lose(first.generation));
        assert!(!handshake.establish(first.generation));
        assert_eq!(handshake.state(), ConnectionState::Connecting);
    }

    #[test]
    fn disconnected_is_terminal() {
        let mut handshake = Handshake::default();
        for field in [2, 1, 0] {
            apply(&mut handshake, field);
        }

        let attempt = handshake.try_connect(TARGET).expect("fires");
        assert!(handshake.fail(attempt.generation, DisconnectReason::HandshakeFailed));
        assert_eq!(
            handshake.state(),
            ConnectionState::Disconnected(DisconnectReason::HandshakeFailed)
        );

        assert!(!handshake.lose(attempt.generation));
        assert!(!handshake.close());
        handshake.set_token("again".into());
        assert!(handshake.try_connect(TARGET).is_none());
    }

    #[test]
    fn close_is_idempotent() {
        let mut handshake = Handshake::default();
        assert!(handshake.close());
        assert!(!handshake.close());
        assert_eq!(handshake.state(), ConnectionState::Disconnected(DisconnectReason::Requested));
    }
}
