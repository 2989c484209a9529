//! Connection errors and convenience types.

use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;

use flume::SendError;
use serde_json::Error as JsonError;
use xsalsa20poly1305::aead::Error as CryptoError;

use crate::driver::tasks::error::Recipient;
use crate::driver::tasks::message::*;
use crate::ws::Error as WsError;

/// Errors encountered while connecting to a voice server.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The session key was unusable.
    Crypto(CryptoError),
    /// Server did not return the expected crypto mode during negotiation.
    CryptoModeInvalid,
    /// Selected crypto mode was not offered by server.
    CryptoModeUnavailable,
    /// An indicator that an endpoint URL was invalid.
    EndpointUrl,
    /// Hello/ready handshake was violated.
    ExpectedHandshake,
    /// Voice server failed to correctly respond to IP discovery.
    IllegalDiscoveryResponse,
    /// Could not parse the voice server's view of our IP.
    IllegalIp,
    /// Failed to message other background tasks after connection establishment.
    InterconnectFailure(Recipient),
    /// Miscellaneous I/O error.
    Io(IoError),
    /// JSON (de)serialization error.
    Json(JsonError),
    /// A handshake step did not complete within the configured timeout.
    TimedOut,
    /// Error communicating with gateway server over WebSocket.
    Ws(WsError),
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        Error::Crypto(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Error {
        Error::Io(e)
    }
}

impl From<JsonError> for Error {
    fn from(e: JsonError) -> Error {
        Error::Json(e)
    }
}

impl From<SendError<PacerMessage>> for Error {
    fn from(_e: SendError<PacerMessage>) -> Error {
        Error::InterconnectFailure(Recipient::Pacer)
    }
}

impl From<WsError> for Error {
    fn from(e: WsError) -> Error {
        Error::Ws(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to connect to voice server: ")?;
        match self {
            Self::Crypto(e) => write!(f, "unusable session key ({e})"),
            Self::CryptoModeInvalid => write!(f, "server changed negotiated encryption mode"),
            Self::CryptoModeUnavailable => write!(f, "server did not offer chosen encryption mode"),
            Self::EndpointUrl => write!(f, "endpoint URL received from gateway was invalid"),
            Self::ExpectedHandshake => write!(f, "voice initialisation protocol was violated"),
            Self::IllegalDiscoveryResponse => write!(f, "IP discovery/NAT punching response was invalid"),
            Self::IllegalIp => write!(f, "IP discovery/NAT punching response had bad IP value"),
            Self::InterconnectFailure(r) => write!(f, "failed to contact other task ({r:?})"),
            Self::Io(e) => e.fmt(f),
            Self::Json(e) => e.fmt(f),
            Self::TimedOut => write!(f, "handshake step timed out"),
            Self::Ws(e) => e.fmt(f),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Ws(e) => Some(e),
            _ => None,
        }
    }
}

/// Convenience type for voice connection errors.
pub type Result<T> = std::result::Result<T, Error>;
