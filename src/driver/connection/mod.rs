pub mod error;

use std::net::IpAddr;
use std::time::Duration;

use byteorder::{ByteOrder, NetworkEndian};
use error::{Error, Result};
use flume::Sender;
use secrecy::{ExposeSecret, SecretVec};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, instrument};
use url::Url;
use xsalsa20poly1305::aead::{Error as CryptoError, KeyInit};
use xsalsa20poly1305::XSalsa20Poly1305 as Cipher;

use super::sink::RtpSink;
use super::tasks::message::*;
use super::tasks::{udp_tx, ws as ws_task};
use super::{Config, CryptoMode};
use crate::constants::*;
use crate::model::constants::UDP_PROTOCOL;
use crate::model::payload::{Hello, Identify, Ready, SelectProtocol};
use crate::model::{Event as GatewayEvent, ProtocolData};
use crate::ws::{self, ReceiverExt, SenderExt, WsStream};
use crate::ConnectionInfo;

/// One live voice gateway session.
///
/// Built fresh for every handshake and never reused: dropping it stops the session's tasks.
pub(crate) struct Connection {
    pub(crate) info: ConnectionInfo,
    pub(crate) generation: u64,
    pub(crate) ssrc: u32,
    pub(crate) ws: Sender<WsMessage>,
    pub(crate) udp_tx: Sender<UdpTxMessage>,
}

impl Connection {
    /// Runs the full voice gateway handshake, returning the session and the frame sink the
    /// pacer should use for it.
    #[instrument(skip(info, interconnect, config), fields(endpoint = %info.endpoint))]
    pub(crate) async fn new(
        mut info: ConnectionInfo,
        generation: u64,
        interconnect: &Interconnect,
        config: &Config,
    ) -> Result<(Connection, RtpSink)> {
        let crypto_mode = config.crypto_mode;
        let step = config.handshake_timeout;

        let url = generate_url(&mut info.endpoint)?;

        let mut client = within(step, ws::create_client(url)).await??;

        client
            .send_json(&GatewayEvent::from(Identify {
                server_id: info.guild_id,
                session_id: info.session_id.clone(),
                token: info.token.clone(),
                user_id: info.user_id,
            }))
            .await?;

        let (hello, ready) = within(step, await_hello_ready(&mut client)).await??;
        let heartbeat_interval = heartbeat_period(&hello)?;

        if !crypto_mode.is_offered(&ready.modes) {
            return Err(Error::CryptoModeUnavailable);
        }

        let udp = UdpSocket::bind("0.0.0.0:0").await?;
        udp.connect((ready.ip, ready.port)).await?;

        // Follow the IP discovery procedure, in case NAT tunnelling is needed.
        let request = discovery_request(ready.ssrc);
        udp.send(&request).await?;

        let mut response = [0u8; IP_DISCOVERY_LEN];
        let len = within(step, udp.recv(&mut response)).await??;
        let (address, port) = parse_discovery_response(&response[..len])?;

        debug!("IP discovery: reachable at {}:{}", address, port);

        client
            .send_json(&GatewayEvent::from(SelectProtocol {
                protocol: UDP_PROTOCOL.into(),
                data: ProtocolData {
                    address,
                    mode: crypto_mode.to_request_str().into(),
                    port,
                },
            }))
            .await?;

        let cipher = within(step, init_cipher(&mut client, crypto_mode)).await??;

        info!("Connected to: {}", info.endpoint);

        info!("WS heartbeat duration {:?}.", heartbeat_interval);

        let (ws_msg_tx, ws_msg_rx) = flume::unbounded();
        let (udp_sender_msg_tx, udp_sender_msg_rx) = flume::unbounded();

        let ssrc = ready.ssrc;

        tokio::spawn(ws_task::runner(
            interconnect.clone(),
            ws_msg_rx,
            client,
            ssrc,
            heartbeat_interval,
            generation,
        ));

        tokio::spawn(udp_tx::runner(
            interconnect.clone(),
            udp_sender_msg_rx,
            ssrc,
            udp,
            generation,
        ));

        let sink = RtpSink::new(ssrc, cipher, crypto_mode, udp_sender_msg_tx.clone());

        Ok((
            Connection {
                info,
                generation,
                ssrc,
                ws: ws_msg_tx,
                udp_tx: udp_sender_msg_tx,
            },
            sink,
        ))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        drop(self.ws.send(WsMessage::Poison));
        drop(self.udp_tx.send(UdpTxMessage::Poison));

        info!("Disconnected from: {}", self.info.endpoint);
    }
}

async fn within<F: std::future::Future>(step: Duration, fut: F) -> Result<F::Output> {
    timeout(step, fut).await.map_err(|_| Error::TimedOut)
}

/// Builds the voice gateway URL.
///
/// Bare hosts are reached over `wss://`; an explicit `ws://` or `wss://` scheme is kept.
/// A trailing `:80`, which the platform appends for legacy reasons, is dropped.
fn generate_url(endpoint: &mut String) -> Result<Url> {
    if endpoint.ends_with(":80") {
        let len = endpoint.len();

        endpoint.truncate(len - 3);
    }

    let base = if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        endpoint.trim_end_matches('/').to_string()
    } else {
        format!("wss://{endpoint}")
    };

    Url::parse(&format!("{base}/?v={VOICE_GATEWAY_VERSION}")).or(Err(Error::EndpointUrl))
}

async fn await_hello_ready(client: &mut WsStream) -> Result<(Hello, Ready)> {
    let mut hello = None;
    let mut ready = None;

    loop {
        let Some(value) = client.recv_json().await? else {
            continue;
        };

        match value {
            GatewayEvent::Ready(r) => ready = Some(r),
            GatewayEvent::Hello(h) => hello = Some(h),
            GatewayEvent::HeartbeatAck(_) | GatewayEvent::Unknown(_) => {
                debug!("Ignoring {:?} during handshake.", value);
            },
            other => {
                debug!("Expected ready/hello; got: {:?}", other);

                return Err(Error::ExpectedHandshake);
            },
        }

        if let (Some(hello), Some(ready)) = (&hello, &ready) {
            return Ok((*hello, ready.clone()));
        }
    }
}

/// The server's heartbeat interval, given in (fractional) milliseconds.
fn heartbeat_period(hello: &Hello) -> Result<Duration> {
    match Duration::try_from_secs_f64(hello.heartbeat_interval / 1000.0) {
        Ok(period) if !period.is_zero() && period <= HEARTBEAT_INTERVAL_MAX => Ok(period),
        _ => {
            debug!("Unusable heartbeat interval: {}.", hello.heartbeat_interval);
            Err(Error::ExpectedHandshake)
        },
    }
}

async fn init_cipher(client: &mut WsStream, mode: CryptoMode) -> Result<Cipher> {
    loop {
        let Some(value) = client.recv_json().await? else {
            continue;
        };

        match value {
            GatewayEvent::SessionDescription(desc) => {
                if desc.mode != mode.to_request_str() {
                    return Err(Error::CryptoModeInvalid);
                }

                let key = SecretVec::new(desc.secret_key);

                return Cipher::new_from_slice(key.expose_secret())
                    .map_err(|_| Error::Crypto(CryptoError));
            },
            other => {
                debug!("Expected session description for key; got: {:?}", other.kind());
            },
        }
    }
}

fn discovery_request(ssrc: u32) -> [u8; IP_DISCOVERY_LEN] {
    let mut bytes = [0u8; IP_DISCOVERY_LEN];

    NetworkEndian::write_u16(&mut bytes[0..2], 1);
    NetworkEndian::write_u16(&mut bytes[2..4], (IP_DISCOVERY_LEN - 4) as u16);
    NetworkEndian::write_u32(&mut bytes[4..8], ssrc);

    bytes
}

fn parse_discovery_response(bytes: &[u8]) -> Result<(IpAddr, u16)> {
    if bytes.len() != IP_DISCOVERY_LEN || NetworkEndian::read_u16(&bytes[0..2]) != 2 {
        return Err(Error::IllegalDiscoveryResponse);
    }

    let address_raw = &bytes[8..IP_DISCOVERY_LEN - 2];

    // We could do something clever like binary search, but possibility of UDP spoofing
    // precludes us from making the assumption we can find a "left edge" of '\0's.
    let nul_byte_index = address_raw.iter().position(|&b| b == 0).ok_or(Error::IllegalIp)?;

    let address = std::str::from_utf8(&address_raw[..nul_byte_index])
        .map_err(|_| Error::IllegalIp)?
        .parse()
        .map_err(|_| Error::IllegalIp)?;

    let port = NetworkEndian::read_u16(&bytes[IP_DISCOVERY_LEN - 2..]);

    Ok((address, port))
}
