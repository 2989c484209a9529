//! Constants shared by the voice gateway protocol.

/// The voice gateway version spoken by these models.
pub const GATEWAY_VERSION: u8 = 4;

/// Transport protocol named in `SelectProtocol`.
pub const UDP_PROTOCOL: &str = "udp";
