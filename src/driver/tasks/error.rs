use std::error::Error as StdError;
use std::fmt;

use flume::SendError;

use super::message::*;
use crate::ws::Error as WsError;

/// A background task which could not be reached.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Recipient {
    Core,
    Pacer,
    UdpTx,
    Ws,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by a live session's background tasks.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    InterconnectFailure(Recipient),
    Ws(WsError),
}

impl Error {
    /// Whether the failure leaves room for a fresh session.
    ///
    /// Only a close code which forbids reconnecting (e.g. after being kicked) does not.
    pub(crate) fn should_reconnect(&self) -> bool {
        match self {
            Self::Ws(e) => e
                .close_code()
                .and_then(crate::model::CloseCode::from_code)
                .map_or(true, crate::model::CloseCode::should_reconnect),
            Self::InterconnectFailure(_) => true,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InterconnectFailure(r) => write!(f, "failed to contact other task ({r:?})"),
            Self::Ws(e) => e.fmt(f),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Ws(e) => Some(e),
            Self::InterconnectFailure(_) => None,
        }
    }
}

impl From<SendError<CoreMessage>> for Error {
    fn from(_e: SendError<CoreMessage>) -> Error {
        Error::InterconnectFailure(Recipient::Core)
    }
}

impl From<WsError> for Error {
    fn from(e: WsError) -> Error {
        Error::Ws(e)
    }
}
