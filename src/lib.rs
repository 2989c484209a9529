//! # Warbler
//!
//! Warbler is the voice connection core of a chat-platform client: it collects the
//! credentials a voice session needs, negotiates the session with a voice gateway, and paces
//! encoded Opus frames out over UDP at exactly one frame every 20ms.
//!
//! The general gateway, REST access and caching are left to the host library. Warbler
//! consumes two main gateway events and emits one command:
//!  * a voice state event for the local user, carrying the voice session id,
//!  * a voice server event, carrying the session token and the voice gateway endpoint,
//!  * a voice state update (opcode 4), sent through a [`GatewaySender`] to join or leave.
//!
//! ## Connecting
//!
//! A [`VoiceConnection`] is bound to one voice channel for its whole life. Credentials may
//! arrive in any order and be re-sent any number of times; once all three are present,
//! [`VoiceConnection::try_connect`] fires exactly once, even when called concurrently from
//! several dispatch threads. The connection then moves through the states described by
//! [`ConnectionState`], which can be observed with [`VoiceConnection::state_watcher`].
//!
//! ```rust,no_run
//! # async fn run() {
//! use std::sync::Arc;
//!
//! use warbler::id::{ChannelId, GuildId, UserId};
//! use warbler::input::ConstantSilence;
//! use warbler::{Config, GatewaySender, VoiceConnection};
//!
//! let (gateway_tx, _gateway_rx) = flume::unbounded::<serde_json::Value>();
//! let gateway: Arc<dyn GatewaySender> = Arc::new(gateway_tx);
//!
//! let call = VoiceConnection::new(
//!     GuildId(1),
//!     ChannelId(2),
//!     UserId(3),
//!     Some(gateway),
//!     Config::default(),
//! );
//!
//! // Fed from the main gateway's dispatch loop:
//! call.update_state("session-id");
//! call.update_server(Some("voice.example.com".into()), "token");
//!
//! call.set_filler_source(Some(Box::new(ConstantSilence)));
//! # }
//! ```
//!
//! ## Audio
//!
//! Audio is supplied as [`AudioSource`]s, which yield already-encoded frames. The frame pacer
//! runs on its own thread and schedules ticks against absolute deadlines, so the time taken
//! to produce, encrypt and send a frame never accumulates into drift.
#![doc(html_root_url = "https://docs.rs/warbler/*")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![forbid(unsafe_code)]
#![warn(
    unused,
    rust_2018_idioms,
    clippy::unwrap_used,
    clippy::clone_on_ref_ptr,
    clippy::non_ascii_literal,
    clippy::fallible_impl_from,
    clippy::let_underscore_must_use,
    clippy::format_push_string,
    clippy::pedantic
)]
#![allow(
    // Allowed as they are too pedantic
    clippy::cast_possible_truncation,
    clippy::module_name_repetitions,
    clippy::unreadable_literal,
    clippy::cast_possible_wrap,
    clippy::wildcard_imports,
    clippy::cast_sign_loss,
    clippy::too_many_lines,
    clippy::doc_markdown,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod constants;
pub mod driver;
pub mod error;
pub mod gateway;
mod handler;
pub(crate) mod info;
pub mod input;
mod manager;
pub mod shards;
mod state;
mod ws;

pub use warbler_voice_model as model;
pub use warbler_voice_model::id;

pub use crate::driver::{Config, CryptoMode, FinishBehaviour};
pub use crate::error::{ConnectionError, JoinError, JoinResult};
pub use crate::handler::VoiceConnection;
pub use crate::info::ConnectionInfo;
pub use crate::input::AudioSource;
pub use crate::manager::VoiceManager;
pub use crate::shards::GatewaySender;
pub use crate::state::{ConnectionState, DisconnectReason};
