use std::time::Duration;

use flume::Receiver;
use rand::random;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

use super::error::{Error, Result};
use super::message::*;
use crate::model::payload::{Heartbeat, Speaking};
use crate::model::{Event as GatewayEvent, SpeakingState};
use crate::ws::{Error as WsError, ReceiverExt, SenderExt, WsStream};

struct AuxNetwork {
    rx: Receiver<WsMessage>,
    ws_client: WsStream,
    generation: u64,

    ssrc: u32,
    heartbeat_interval: Duration,

    speaking: SpeakingState,
    last_heartbeat_nonce: Option<u64>,
}

impl AuxNetwork {
    pub(crate) fn new(
        evt_rx: Receiver<WsMessage>,
        ws_client: WsStream,
        ssrc: u32,
        heartbeat_interval: Duration,
        generation: u64,
    ) -> Self {
        Self {
            rx: evt_rx,
            ws_client,
            generation,

            ssrc,
            heartbeat_interval,

            speaking: SpeakingState::empty(),
            last_heartbeat_nonce: None,
        }
    }

    #[instrument(skip(self, interconnect), fields(generation = self.generation))]
    async fn run(&mut self, interconnect: &Interconnect) {
        let mut next_heartbeat = Instant::now() + self.heartbeat_interval;

        loop {
            let mut failure = None;

            tokio::select! {
                () = sleep_until(next_heartbeat) => {
                    if let Some(nonce) = self.last_heartbeat_nonce {
                        warn!("Heartbeat {} was never acknowledged.", nonce);
                        failure = Some(true);
                    } else if let Err(e) = self.send_heartbeat().await {
                        error!("Heartbeat send failure {:?}.", e);
                        failure = Some(e.should_reconnect());
                    }

                    next_heartbeat += self.heartbeat_interval;
                }
                ws_msg = self.ws_client.recv_json_no_timeout() => {
                    match ws_msg {
                        Err(WsError::Json(e)) => {
                            warn!("Unexpected JSON {:?}.", e);
                        },
                        Err(e) => {
                            error!("Error processing ws {:?}.", e);
                            failure = Some(Error::from(e).should_reconnect());
                        },
                        Ok(Some(msg)) => {
                            self.process_ws(msg);
                        },
                        Ok(None) => {},
                    }
                }
                inner_msg = self.rx.recv_async() => {
                    match inner_msg {
                        Ok(WsMessage::Speaking(is_speaking)) => {
                            if let Err(e) = self.set_speaking(is_speaking).await {
                                error!("Issue sending speaking update {:?}.", e);
                                failure = Some(e.should_reconnect());
                            }
                        },
                        Err(_) | Ok(WsMessage::Poison) => {
                            if let Err(e) = self.ws_client.close(None).await {
                                debug!("Error closing voice websocket: {:?}.", e);
                            }
                            break;
                        },
                    }
                }
            }

            if let Some(reconnect) = failure {
                if let Err(e) = self.report_loss(interconnect, reconnect) {
                    debug!("Could not report session loss: {:?}.", e);
                }
                break;
            }
        }
    }

    fn report_loss(&self, interconnect: &Interconnect, reconnect: bool) -> Result<()> {
        interconnect.core.send(CoreMessage::ConnectionLost {
            generation: self.generation,
            reconnect,
        })?;

        Ok(())
    }

    async fn send_heartbeat(&mut self) -> Result<()> {
        let nonce = random::<u64>();
        self.last_heartbeat_nonce = Some(nonce);

        trace!("Sent heartbeat {:?}", self.speaking);

        self.ws_client
            .send_json(&GatewayEvent::from(Heartbeat { nonce }))
            .await?;

        Ok(())
    }

    async fn set_speaking(&mut self, is_speaking: bool) -> Result<()> {
        if self.speaking.microphone() == is_speaking {
            return Ok(());
        }

        self.speaking.set(SpeakingState::MICROPHONE, is_speaking);
        info!("Changing to {:?}", self.speaking);

        self.ws_client
            .send_json(&GatewayEvent::from(Speaking {
                delay: Some(0),
                speaking: self.speaking,
                ssrc: self.ssrc,
                user_id: None,
            }))
            .await?;

        Ok(())
    }

    fn process_ws(&mut self, value: GatewayEvent) {
        match value {
            GatewayEvent::Speaking(ev) => {
                trace!("Speaking state update: {:?}", ev);
            },
            GatewayEvent::HeartbeatAck(ev) => match self.last_heartbeat_nonce {
                Some(nonce) if ev.nonce == nonce => {
                    self.last_heartbeat_nonce = None;
                    trace!("Heartbeat ACK received.");
                },
                Some(nonce) => {
                    warn!("Heartbeat nonce mismatch! Expected {}, saw {}.", nonce, ev.nonce);
                },
                None => {
                    warn!("Unsolicited heartbeat ACK {}.", ev.nonce);
                },
            },
            other => {
                trace!("Received other websocket data: {:?}", other);
            },
        }
    }
}

#[instrument(skip(interconnect, evt_rx, ws_client))]
pub(crate) async fn runner(
    interconnect: Interconnect,
    evt_rx: Receiver<WsMessage>,
    ws_client: WsStream,
    ssrc: u32,
    heartbeat_interval: Duration,
    generation: u64,
) {
    info!("WS thread started.");
    let mut aux = AuxNetwork::new(evt_rx, ws_client, ssrc, heartbeat_interval, generation);

    aux.run(&interconnect).await;
    info!("WS thread finished.");
}
