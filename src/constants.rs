//! Constants affecting driver function and voice gateway handling.

use std::time::Duration;

/// The voice gateway version used by the library.
pub const VOICE_GATEWAY_VERSION: u8 = crate::model::constants::GATEWAY_VERSION;

/// Sample rate of audio sent over a voice connection.
pub const SAMPLE_RATE_RAW: usize = 48_000;

/// Number of audio frames/packets to be sent per second.
pub const AUDIO_FRAME_RATE: usize = 50;

/// Length of time between any two audio frames.
pub const TIMESTEP_LENGTH: Duration = Duration::from_millis(1000 / AUDIO_FRAME_RATE as u64);

/// Length (in milliseconds) of any audio frame.
pub const FRAME_LEN_MS: usize = 1000 / AUDIO_FRAME_RATE;

/// Number of samples in one complete frame of audio per channel.
///
/// Each RTP packet advances the timestamp by this amount.
pub const MONO_FRAME_SIZE: usize = SAMPLE_RATE_RAW / AUDIO_FRAME_RATE;

/// Maximum packet size for a voice packet.
///
/// Set a safe amount below the Ethernet MTU to avoid fragmentation/rejection.
pub const VOICE_PACKET_MAX: usize = 1460;

/// Delay between sends of UDP keepalive frames.
pub const UDP_KEEPALIVE_GAP: Duration = Duration::from_secs(5);

/// Opus silent frame, used to signal speech start and end (and prevent audio glitching).
pub const SILENT_FRAME: [u8; 3] = [0xf8, 0xff, 0xfe];

/// Size of an IP discovery request or response.
pub const IP_DISCOVERY_LEN: usize = 74;

/// The one (and only) RTP version.
pub const RTP_VERSION: u8 = 2;

/// RTP payload type used for Opus audio traffic.
pub const RTP_PROFILE_TYPE: u8 = 120;

/// Length of the fixed RTP header written before each payload.
pub const RTP_HEADER_LEN: usize = 12;

/// Main gateway opcode for a voice state update.
pub const VOICE_STATE_UPDATE_OPCODE: u8 = 4;

/// Size of the UDP keepalive packet: the ssrc followed by zero padding.
pub const UDP_KEEPALIVE_LEN: usize = 8;

/// Longest heartbeat interval accepted from a voice server's hello.
pub const HEARTBEAT_INTERVAL_MAX: Duration = Duration::from_secs(60 * 60);
