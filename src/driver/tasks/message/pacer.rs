use std::fmt;

use flume::Sender;

use super::WsMessage;
use crate::driver::sink::FrameSink;
use crate::input::AudioSource;

/// Transport handed to the pacer once a session is established.
pub(crate) struct PacerConnection {
    pub sink: Box<dyn FrameSink>,
    pub ws: Option<Sender<WsMessage>>,
}

impl fmt::Debug for PacerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacerConnection").field("ws", &self.ws.is_some()).finish()
    }
}

#[derive(Debug)]
pub(crate) enum PacerMessage {
    SetSource(Option<Box<dyn AudioSource>>),
    SetFiller(Option<Box<dyn AudioSource>>),
    SetMute(bool),
    SetConn(PacerConnection),
    DropConn,
    Poison,
}
