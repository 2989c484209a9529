use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::driver::{Config, Driver};
use crate::error::JoinResult;
use crate::gateway::VoiceStateUpdate;
use crate::id::{ChannelId, GuildId, UserId};
use crate::info::{Handshake, Target};
use crate::input::AudioSource;
use crate::shards::{self, GatewaySender};
use crate::state::{ConnectionState, DisconnectReason};

/// State shared between a [`VoiceConnection`] and its driver's tasks.
pub(crate) struct Shared {
    pub(crate) target: Target,
    handshake: Mutex<Handshake>,
    state: watch::Sender<ConnectionState>,
    gateway: Option<Arc<dyn GatewaySender>>,
    self_deaf: bool,
    self_mute: AtomicBool,
}

impl Shared {
    pub(crate) fn new(
        target: Target,
        gateway: Option<Arc<dyn GatewaySender>>,
        config: &Config,
    ) -> Self {
        Self {
            target,
            handshake: Mutex::new(Handshake::default()),
            state: watch::channel(ConnectionState::Idle).0,
            gateway,
            self_deaf: config.self_deaf,
            self_mute: AtomicBool::new(config.self_mute),
        }
    }

    /// Runs `f` under the handshake lock, publishing the resulting state if it changed.
    fn with_handshake<T>(&self, f: impl FnOnce(&mut Handshake) -> T) -> T {
        let mut handshake = self.handshake.lock();
        let before = handshake.state();

        let out = f(&mut handshake);

        let after = handshake.state();
        if before != after {
            debug!("Voice connection {} -> {}.", before, after);
            self.state.send_replace(after);
        }

        out
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether the connection reached its terminal state.
    pub(crate) fn is_closed(&self) -> bool {
        self.state().is_terminal()
    }

    /// Stores a full credential set and fires the handshake latch.
    #[cfg(test)]
    pub(crate) fn begin_attempt(&self, endpoint: &str) -> Option<crate::info::Attempt> {
        let target = self.target;

        self.with_handshake(|h| {
            h.set_session_id("abc".into());
            h.set_token("tok".into());
            h.set_endpoint(endpoint.into());
            h.try_connect(target)
        })
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.handshake.lock().is_current(generation)
    }

    pub(crate) fn mark_established(&self, generation: u64) -> bool {
        self.with_handshake(|h| h.establish(generation))
    }

    /// Moves a lost session to `Reconnecting` and asks the main gateway for fresh credentials.
    pub(crate) fn mark_lost(&self, generation: u64) -> bool {
        let lost = self.with_handshake(|h| h.lose(generation));

        if lost {
            if let Err(e) = self.send_voice_state(Some(self.target.channel_id)) {
                warn!("Could not re-request voice credentials: {}.", e);
            }
        }

        lost
    }

    pub(crate) fn mark_failed(&self, generation: u64, reason: DisconnectReason) -> bool {
        self.with_handshake(|h| h.fail(generation, reason))
    }

    fn voice_state_update(&self, channel_id: Option<ChannelId>) -> VoiceStateUpdate {
        VoiceStateUpdate {
            guild_id: self.target.guild_id,
            channel_id,
            self_mute: self.self_mute.load(Ordering::Acquire),
            self_deaf: self.self_deaf,
        }
    }

    fn send_voice_state(&self, channel_id: Option<ChannelId>) -> JoinResult<()> {
        let update = self.voice_state_update(channel_id);

        shards::send_update(self.gateway.as_deref(), &update)
    }
}

/// One voice connection, bound to a single voice channel for its whole life.
///
/// Collects the three credentials a voice session needs (session id, token and endpoint),
/// fires the voice gateway handshake exactly once they are all present, and feeds audio from
/// the configured [`AudioSource`] to the frame pacer.
///
/// Every method takes `&self`, so a connection can be shared behind an [`Arc`] between the
/// gateway's dispatch threads and whatever drives playback.
///
/// If the session is lost after being established, the connection moves to
/// [`ConnectionState::Reconnecting`], forgets its token and endpoint, and re-requests them from
/// the main gateway; the next complete credential set starts a brand new session.
///
/// Dropping a connection stops its background tasks, but does not tell the main gateway to
/// leave the channel: call [`disconnect`] for that.
///
/// [`disconnect`]: VoiceConnection::disconnect
pub struct VoiceConnection {
    shared: Arc<Shared>,
    driver: Driver,
}

impl VoiceConnection {
    /// Creates a connection to `channel_id` and requests to join it.
    ///
    /// If a `gateway` is given, a voice state update for the channel is sent straight away and
    /// the connection starts out awaiting credentials. Without one, the connection is
    /// standalone: credentials must be supplied by hand.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    #[must_use]
    pub fn new(
        guild_id: GuildId,
        channel_id: ChannelId,
        user_id: UserId,
        gateway: Option<Arc<dyn GatewaySender>>,
        config: Config,
    ) -> Self {
        let conn = Self::build(guild_id, channel_id, user_id, gateway, config);

        if conn.shared.gateway.is_some() {
            match conn.shared.send_voice_state(Some(channel_id)) {
                Ok(()) => {
                    conn.shared.with_handshake(Handshake::await_credentials);
                },
                Err(e) => warn!("Could not request to join voice channel {}: {}.", channel_id, e),
            }
        }

        conn
    }

    /// Creates a connection for a channel the main gateway already reports the user in.
    pub(crate) fn joined(
        guild_id: GuildId,
        channel_id: ChannelId,
        user_id: UserId,
        gateway: Arc<dyn GatewaySender>,
        config: Config,
    ) -> Self {
        let conn = Self::build(guild_id, channel_id, user_id, Some(gateway), config);
        conn.shared.with_handshake(Handshake::await_credentials);

        conn
    }

    fn build(
        guild_id: GuildId,
        channel_id: ChannelId,
        user_id: UserId,
        gateway: Option<Arc<dyn GatewaySender>>,
        config: Config,
    ) -> Self {
        let target = Target {
            channel_id,
            guild_id,
            user_id,
        };

        let shared = Arc::new(Shared::new(target, gateway, &config));
        let driver = Driver::new(config, Arc::clone(&shared));

        Self { shared, driver }
    }

    /// Creates a connection without a main gateway to talk to.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    #[must_use]
    pub fn standalone(
        guild_id: GuildId,
        channel_id: ChannelId,
        user_id: UserId,
        config: Config,
    ) -> Self {
        Self::new(guild_id, channel_id, user_id, None, config)
    }

    /// The voice channel this connection is bound to.
    #[must_use]
    pub fn channel(&self) -> ChannelId {
        self.shared.target.channel_id
    }

    #[must_use]
    pub fn guild_id(&self) -> GuildId {
        self.shared.target.guild_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.shared.target.user_id
    }

    /// A snapshot of the current voice session id.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.shared.handshake.lock().session_id().map(str::to_owned)
    }

    /// A snapshot of the current voice session token.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.shared.handshake.lock().token().map(str::to_owned)
    }

    /// A snapshot of the current voice gateway endpoint.
    #[must_use]
    pub fn endpoint(&self) -> Option<String> {
        self.shared.handshake.lock().endpoint().map(str::to_owned)
    }

    /// Stores the voice session id. Does not connect by itself: see [`try_connect`].
    ///
    /// [`try_connect`]: VoiceConnection::try_connect
    pub fn set_session_id(&self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        self.shared.with_handshake(|h| h.set_session_id(session_id));
    }

    /// Stores the voice session token. Does not connect by itself: see [`try_connect`].
    ///
    /// [`try_connect`]: VoiceConnection::try_connect
    pub fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        self.shared.with_handshake(|h| h.set_token(token));
    }

    /// Stores the voice gateway endpoint. Does not connect by itself: see [`try_connect`].
    ///
    /// May be called again before connecting, e.g. when the server is migrated to another
    /// region.
    ///
    /// [`try_connect`]: VoiceConnection::try_connect
    pub fn set_endpoint(&self, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        self.shared.with_handshake(|h| h.set_endpoint(endpoint));
    }

    /// Starts the voice gateway handshake if all three credentials are present and no session
    /// is running or being set up.
    ///
    /// Returns whether this call started it. Safe to call concurrently: across all callers,
    /// exactly one call succeeds per complete credential set.
    #[instrument(skip(self), fields(guild_id = %self.guild_id()))]
    pub fn try_connect(&self) -> bool {
        let target = self.shared.target;

        let Some(attempt) = self.shared.with_handshake(|h| h.try_connect(target)) else {
            return false;
        };

        debug!("Credentials complete; starting voice session {}.", attempt.generation);
        self.driver.connect(attempt.info, attempt.generation);

        true
    }

    /// Whether the connecting-or-connected latch is set.
    #[must_use]
    pub fn is_connecting_or_connected(&self) -> bool {
        self.shared.handshake.lock().is_connecting_or_connected()
    }

    /// Handles a voice state event for the local user: stores its session id, then tries to
    /// connect.
    pub fn update_state(&self, session_id: impl Into<String>) -> bool {
        self.set_session_id(session_id);
        self.try_connect()
    }

    /// Handles a voice server event: stores its token and endpoint, then tries to connect.
    ///
    /// A `None` endpoint means a new voice server is still being allocated, so only the token
    /// is stored.
    #[instrument(skip(self, token))]
    pub fn update_server(&self, endpoint: Option<String>, token: impl Into<String>) -> bool {
        let token = token.into();

        let Some(endpoint) = endpoint else {
            self.set_token(token);
            return false;
        };

        self.shared.with_handshake(|h| {
            h.set_token(token);
            h.set_endpoint(endpoint);
        });

        self.try_connect()
    }

    /// Leaves the voice channel and shuts the connection down for good.
    ///
    /// Audio production stops immediately; the socket teardown finishes in the background.
    /// Calling this more than once has no further effect.
    #[instrument(skip(self), fields(guild_id = %self.guild_id()))]
    pub fn disconnect(&self) {
        if self.terminate() {
            if let Err(e) = self.shared.send_voice_state(None) {
                debug!("Could not send leave request: {}.", e);
            }
        }
    }

    /// Shuts the connection down without telling the main gateway. Returns whether this call
    /// closed it.
    pub(crate) fn terminate(&self) -> bool {
        let closed = self.shared.with_handshake(Handshake::close);

        self.driver.halt();
        self.driver.leave();

        closed
    }

    /// Sets the audio source the frame pacer pulls from, replacing (and abandoning) the
    /// current one at the next tick boundary. `None` stops playback.
    pub fn set_audio_source(&self, source: Option<Box<dyn AudioSource>>) {
        self.driver.set_source(source);
    }

    /// Sets the source played whenever the active one finishes.
    ///
    /// Each fallback plays a fresh [`copy`] of it.
    ///
    /// [`copy`]: AudioSource::copy
    pub fn set_filler_source(&self, source: Option<Box<dyn AudioSource>>) {
        self.driver.set_filler(source);
    }

    /// Mutes or unmutes this connection.
    ///
    /// While muted, the pacer keeps ticking but pulls no audio. The new flag is also sent to
    /// the main gateway, unless the connection is disconnected.
    pub fn set_muted(&self, muted: bool) {
        self.shared.self_mute.store(muted, Ordering::Release);
        self.driver.mute(muted);

        if !self.state().is_terminal() && self.shared.gateway.is_some() {
            if let Err(e) = self.shared.send_voice_state(Some(self.channel())) {
                warn!("Could not update mute state: {}.", e);
            }
        }
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.shared.self_mute.load(Ordering::Acquire)
    }

    /// The current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Subscribes to connection state transitions.
    #[must_use]
    pub fn state_watcher(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }
}

impl fmt::Debug for VoiceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceConnection")
            .field("target", &self.shared.target)
            .field("handshake", &*self.shared.handshake.lock())
            .field("muted", &self.is_muted())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use serde_json::Value;

    use super::*;

    fn connection(gateway: Option<Arc<dyn GatewaySender>>) -> VoiceConnection {
        VoiceConnection::new(GuildId(1), ChannelId(3), UserId(2), gateway, Config::default())
    }

    fn with_gateway() -> (VoiceConnection, flume::Receiver<Value>) {
        let (tx, rx) = flume::unbounded();
        (connection(Some(Arc::new(tx))), rx)
    }

    #[tokio::test]
    async fn construction_requests_join() {
        let (conn, gateway) = with_gateway();

        let payload = gateway.try_recv().unwrap();
        assert_eq!(payload["op"], 4);
        assert_eq!(payload["d"]["guild_id"], "1");
        assert_eq!(payload["d"]["channel_id"], "3");
        assert_eq!(payload["d"]["self_mute"], false);
        assert_eq!(payload["d"]["self_deaf"], false);

        assert_eq!(conn.state(), ConnectionState::AwaitingCredentials);
        assert_eq!(conn.channel(), ChannelId(3));
    }

    #[tokio::test]
    async fn standalone_starts_idle() {
        let conn = connection(None);

        assert_eq!(conn.state(), ConnectionState::Idle);

        conn.set_endpoint("ep1");
        assert_eq!(conn.state(), ConnectionState::AwaitingCredentials);
        assert_eq!(conn.endpoint().as_deref(), Some("ep1"));
    }

    #[tokio::test]
    async fn setters_only_store() {
        let conn = connection(None);

        conn.set_session_id("abc");
        conn.set_token("tok");
        conn.set_endpoint("ep1");

        assert!(!conn.is_connecting_or_connected());
        assert_eq!(conn.session_id().as_deref(), Some("abc"));
        assert_eq!(conn.token().as_deref(), Some("tok"));

        assert!(conn.try_connect());
        assert!(!conn.try_connect());
        assert!(conn.is_connecting_or_connected());
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn null_endpoint_stores_token_only() {
        let conn = connection(None);

        assert!(!conn.update_state("abc"));
        assert!(!conn.update_server(None, "tok"));

        assert_eq!(conn.token().as_deref(), Some("tok"));
        assert_eq!(conn.endpoint(), None);
        assert!(!conn.is_connecting_or_connected());

        assert!(conn.update_server(Some("ep1".into()), "tok2"));
        assert_eq!(conn.token().as_deref(), Some("tok2"));
    }

    #[tokio::test]
    async fn concurrent_try_connect_fires_once() {
        const THREADS: usize = 16;

        let conn = Arc::new(connection(None));
        conn.set_session_id("abc");
        conn.set_token("tok");
        conn.set_endpoint("ep1");

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let conn = Arc::clone(&conn);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    conn.try_connect()
                })
            })
            .collect();

        let fired = handles.into_iter().map(|h| h.join().unwrap()).filter(|&f| f).count();

        assert_eq!(fired, 1);
    }

    #[tokio::test]
    async fn concurrent_setters_fire_once() {
        let conn = Arc::new(connection(None));
        let barrier = Arc::new(Barrier::new(3));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let conn = Arc::clone(&conn);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    match i {
                        0 => conn.set_session_id("abc"),
                        1 => conn.set_token("tok"),
                        _ => conn.set_endpoint("ep1"),
                    }
                    (0..10).filter(|_| conn.try_connect()).count()
                })
            })
            .collect();

        let fired: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(fired, 1);
    }

    #[tokio::test]
    async fn disconnect_leaves_once() {
        let (conn, gateway) = with_gateway();
        gateway.try_recv().unwrap();

        let mut watcher = conn.state_watcher();

        conn.disconnect();
        conn.disconnect();

        let leave = gateway.try_recv().unwrap();
        assert_eq!(leave["d"]["channel_id"], Value::Null);
        assert!(gateway.try_recv().is_err());

        assert!(watcher.has_changed().unwrap());
        assert_eq!(
            *watcher.borrow_and_update(),
            ConnectionState::Disconnected(DisconnectReason::Requested)
        );

        conn.set_session_id("abc");
        conn.set_token("tok");
        conn.set_endpoint("ep1");
        assert!(!conn.try_connect());
    }

    #[tokio::test]
    async fn mute_is_sent_to_gateway() {
        let (conn, gateway) = with_gateway();
        gateway.try_recv().unwrap();

        conn.set_muted(true);

        assert!(conn.is_muted());
        let update = gateway.try_recv().unwrap();
        assert_eq!(update["d"]["self_mute"], true);
        assert_eq!(update["d"]["channel_id"], "3");

        conn.disconnect();
        gateway.try_recv().unwrap();

        conn.set_muted(false);
        assert!(gateway.try_recv().is_err());
    }

    #[tokio::test]
    async fn lost_session_rerequests_credentials() {
        let (conn, gateway) = with_gateway();
        gateway.try_recv().unwrap();

        assert!(!conn.update_state("abc"));
        assert!(conn.update_server(Some("ep1".into()), "tok"));

        // First handshake of this connection.
        assert!(conn.shared.mark_established(1));
        assert!(!conn.shared.mark_lost(0));
        assert!(conn.shared.mark_lost(1));

        assert_eq!(conn.state(), ConnectionState::Reconnecting);
        assert_eq!(conn.session_id().as_deref(), Some("abc"));
        assert_eq!(conn.token(), None);
        assert_eq!(conn.endpoint(), None);

        let rejoin = gateway.try_recv().unwrap();
        assert_eq!(rejoin["d"]["channel_id"], "3");

        assert!(conn.update_server(Some("ep2".into()), "tok2"));
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }
}
