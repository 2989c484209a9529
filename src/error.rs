//! Errors surfaced to users of a voice connection.

use std::error::Error;
use std::fmt;

pub use crate::driver::connection::error::Error as ConnectionError;

/// Error returned when a connection or manager is unable to send messages over the main
/// gateway.
#[derive(Debug)]
#[non_exhaustive]
pub enum JoinError {
    /// No gateway sender was provided, so voice state updates cannot be requested.
    NoSender,
    /// Tried to act on a call which does not exist.
    NoCall,
    /// The gateway's receiving half has been dropped.
    Dropped,
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to update voice state: ")?;
        match self {
            Self::NoSender => write!(f, "no gateway destination"),
            Self::NoCall => write!(f, "tried to leave a non-existent call"),
            Self::Dropped => write!(f, "gateway receiver was dropped"),
        }
    }
}

impl Error for JoinError {}

/// Convenience type for gateway send results.
pub type JoinResult<T> = Result<T, JoinError>;
