//! The transport end of the frame pacer.

use std::error::Error as StdError;
use std::fmt;
use std::num::Wrapping;

use byteorder::{ByteOrder, NetworkEndian};
use flume::Sender;
use rand::random;
use xsalsa20poly1305::aead::Error as CryptoError;
use xsalsa20poly1305::XSalsa20Poly1305 as Cipher;

use super::crypto::{CryptoState, TAG_SIZE};
use super::tasks::message::UdpTxMessage;
use super::CryptoMode;
use crate::constants::*;

/// Failure to hand one frame to the transport.
#[derive(Debug)]
#[non_exhaustive]
pub enum SinkError {
    /// The frame, once framed and encrypted, would not fit in one voice packet.
    FrameTooLarge(usize),
    /// Encryption of the packet failed.
    Crypto(CryptoError),
    /// The transport has shut down; no further frames can be sent.
    Closed,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameTooLarge(len) => write!(f, "frame of {len} bytes exceeds packet size"),
            Self::Crypto(e) => write!(f, "packet encryption failed: {e}"),
            Self::Closed => f.write_str("transport closed"),
        }
    }
}

impl StdError for SinkError {}

impl From<CryptoError> for SinkError {
    fn from(e: CryptoError) -> Self {
        SinkError::Crypto(e)
    }
}

/// Accepts one encoded frame per tick from the frame pacer.
pub(crate) trait FrameSink: Send {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), SinkError>;
}

/// Frames each payload as an encrypted RTP packet and queues it on the UDP transmit task.
pub(crate) struct RtpSink {
    cipher: Cipher,
    crypto_state: CryptoState,
    packet: [u8; VOICE_PACKET_MAX],
    sequence: Wrapping<u16>,
    timestamp: Wrapping<u32>,
    ssrc: u32,
    udp_tx: Sender<UdpTxMessage>,
}

impl RtpSink {
    pub fn new(ssrc: u32, cipher: Cipher, mode: CryptoMode, udp_tx: Sender<UdpTxMessage>) -> Self {
        let mut packet = [0u8; VOICE_PACKET_MAX];
        packet[0] = RTP_VERSION << 6;
        packet[1] = RTP_PROFILE_TYPE;

        Self {
            cipher,
            crypto_state: CryptoState::from(mode),
            packet,
            sequence: Wrapping(random::<u16>()),
            timestamp: Wrapping(random::<u32>()),
            ssrc,
            udp_tx,
        }
    }

    fn write_header(&mut self) {
        NetworkEndian::write_u16(&mut self.packet[2..4], self.sequence.0);
        NetworkEndian::write_u32(&mut self.packet[4..8], self.timestamp.0);
        NetworkEndian::write_u32(&mut self.packet[8..RTP_HEADER_LEN], self.ssrc);
    }
}

impl FrameSink for RtpSink {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        let mode = self.crypto_state.kind();
        if RTP_HEADER_LEN + mode.payload_overhead() + frame.len() > VOICE_PACKET_MAX {
            return Err(SinkError::FrameTooLarge(frame.len()));
        }

        self.write_header();

        let payload_start = RTP_HEADER_LEN + TAG_SIZE;
        self.packet[payload_start..payload_start + frame.len()].copy_from_slice(frame);

        let body_len = self
            .crypto_state
            .write_packet_nonce(&mut self.packet[RTP_HEADER_LEN..], TAG_SIZE + frame.len());
        let end = RTP_HEADER_LEN + body_len;

        mode.encrypt_in_place(&mut self.packet[..end], &self.cipher)?;

        self.udp_tx
            .send(UdpTxMessage::Packet(self.packet[..end].to_vec()))
            .map_err(|_| SinkError::Closed)?;

        self.sequence += Wrapping(1);
        self.timestamp += Wrapping(MONO_FRAME_SIZE as u32);

        Ok(())
    }
}
