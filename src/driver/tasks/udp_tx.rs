use byteorder::{ByteOrder, NetworkEndian};
use flume::Receiver;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, instrument, trace};

use super::message::*;
use crate::constants::*;

#[instrument(skip(interconnect, udp_msg_rx, udp_tx))]
pub(crate) async fn runner(
    interconnect: Interconnect,
    udp_msg_rx: Receiver<UdpTxMessage>,
    ssrc: u32,
    udp_tx: UdpSocket,
    generation: u64,
) {
    info!("UDP transmit handle started.");

    let mut keepalive_bytes = [0u8; UDP_KEEPALIVE_LEN];
    NetworkEndian::write_u32(&mut keepalive_bytes[..4], ssrc);

    let mut ka_time = Instant::now() + UDP_KEEPALIVE_GAP;

    loop {
        use UdpTxMessage::*;
        let send_result = match timeout_at(ka_time, udp_msg_rx.recv_async()).await {
            Err(_) => {
                trace!("Sending UDP Keepalive.");
                ka_time += UDP_KEEPALIVE_GAP;
                udp_tx.send(&keepalive_bytes[..]).await
            },
            Ok(Ok(Packet(p))) => udp_tx.send(&p[..]).await,
            Ok(Err(_) | Ok(Poison)) => {
                break;
            },
        };

        if let Err(e) = send_result {
            error!("Fatal UDP send error: {:?}.", e);

            drop(interconnect.core.send(CoreMessage::ConnectionLost {
                generation,
                reconnect: true,
            }));
            break;
        }
    }

    info!("UDP transmit handle stopped.");
}
