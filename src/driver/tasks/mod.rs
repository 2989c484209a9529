pub mod error;
pub(crate) mod message;
pub(crate) mod pacer;
pub(crate) mod udp_tx;
pub(crate) mod ws;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use flume::{Receiver, RecvError};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use super::connection::error::Result as ConnectionResult;
use super::connection::Connection;
use super::Config;
use crate::handler::Shared;
use crate::state::DisconnectReason;
use crate::ConnectionInfo;
use message::*;

pub(crate) fn start(
    config: Config,
    shared: Arc<Shared>,
    rx: Receiver<CoreMessage>,
    interconnect: Interconnect,
    pacer_rx: Receiver<PacerMessage>,
    halt: Arc<AtomicBool>,
) {
    let pacer_config = config.clone();
    std::thread::spawn(move || {
        pacer::runner(pacer_rx, pacer_config, halt);
    });

    tokio::spawn(async move {
        info!("Driver started.");
        runner(config, shared, rx, interconnect).await;
        info!("Driver finished.");
    });
}

#[instrument(skip_all, fields(guild_id = %shared.target.guild_id))]
async fn runner(
    config: Config,
    shared: Arc<Shared>,
    rx: Receiver<CoreMessage>,
    interconnect: Interconnect,
) {
    let mut connection: Option<Connection> = None;

    loop {
        match rx.recv_async().await {
            Ok(CoreMessage::Connect(info, generation)) => {
                // Each handshake gets a fresh session; the previous one is torn down first.
                if connection.take().is_some() {
                    drop(interconnect.pacer.send(PacerMessage::DropConn));
                }

                connection = connect(info, generation, &config, &shared, &interconnect).await;
            },
            Ok(CoreMessage::ConnectionLost {
                generation,
                reconnect,
            }) => {
                if connection.as_ref().map(|c| c.generation) == Some(generation) {
                    connection = None;
                    drop(interconnect.pacer.send(PacerMessage::DropConn));
                }

                if reconnect {
                    if shared.mark_lost(generation) {
                        info!("Voice session lost; awaiting fresh credentials.");
                    }
                } else if shared.mark_failed(generation, DisconnectReason::Kicked) {
                    info!("Voice session closed by server; not reconnecting.");
                }
            },
            Ok(CoreMessage::Disconnect) => {
                connection = None;
                drop(interconnect.pacer.send(PacerMessage::DropConn));
            },
            Err(RecvError::Disconnected) | Ok(CoreMessage::Poison) => {
                break;
            },
        }

        if shared.is_closed() {
            info!("Voice connection closed; stopping driver.");
            break;
        }
    }

    drop(connection);
    interconnect.poison_all();
}

/// Runs handshake attempts for `generation` until one succeeds, the retry budget is spent, or
/// the generation is superseded.
async fn connect(
    info: ConnectionInfo,
    generation: u64,
    config: &Config,
    shared: &Shared,
    interconnect: &Interconnect,
) -> Option<Connection> {
    let attempts = config.connect_attempts.max(1);
    let mut backoff = config.retry_backoff;

    for attempt in 1..=attempts {
        if !shared.is_current(generation) {
            return None;
        }

        match Connection::new(info.clone(), generation, interconnect, config).await {
            Ok((connection, sink)) => {
                if !shared.mark_established(generation) {
                    info!("Discarding superseded voice session.");
                    return None;
                }

                return match attach(&connection, sink, interconnect) {
                    Ok(()) => {
                        info!("Voice session established with ssrc {}.", connection.ssrc);
                        Some(connection)
                    },
                    Err(e) => {
                        error!("Could not start audio for new session: {:?}.", e);
                        None
                    },
                };
            },
            Err(why) => {
                warn!("Handshake attempt {}/{} failed: {}.", attempt, attempts, why);

                if attempt < attempts {
                    sleep(backoff).await;
                    backoff *= 2;
                }
            },
        }
    }

    if shared.mark_failed(generation, DisconnectReason::HandshakeFailed) {
        error!("Catastrophic connection failure. Stopping.");
    }

    None
}

fn attach(
    connection: &Connection,
    sink: super::sink::RtpSink,
    interconnect: &Interconnect,
) -> ConnectionResult<()> {
    interconnect.pacer.send(PacerMessage::SetConn(PacerConnection {
        sink: Box::new(sink),
        ws: Some(connection.ws.clone()),
    }))?;

    Ok(())
}
