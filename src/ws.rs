//! JSON-over-websocket helpers for the voice gateway's control connection.

use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Error as JsonError;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::error::Error as TungsteniteError;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{instrument, warn};
use url::Url;

use crate::model::Event;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    Json(JsonError),

    /// The voice gateway does not support or offer compression, so only text messages are
    /// expected.
    UnexpectedBinaryMessage(Vec<u8>),

    Ws(TungsteniteError),

    /// The socket was closed, with the close frame if the server sent one.
    WsClosed(Option<CloseFrame<'static>>),
}

impl Error {
    /// The websocket close code, if the server closed the socket with one.
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::WsClosed(Some(frame)) => Some(frame.code.into()),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "malformed gateway message: {e}"),
            Self::UnexpectedBinaryMessage(_) => f.write_str("unexpected binary message"),
            Self::Ws(e) => write!(f, "websocket error: {e}"),
            Self::WsClosed(Some(frame)) => {
                write!(f, "websocket closed with code {}: {}", frame.code, frame.reason)
            },
            Self::WsClosed(None) => f.write_str("websocket closed"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            Self::Ws(e) => Some(e),
            _ => None,
        }
    }
}

impl From<JsonError> for Error {
    fn from(e: JsonError) -> Error {
        Error::Json(e)
    }
}

impl From<TungsteniteError> for Error {
    fn from(e: TungsteniteError) -> Error {
        Error::Ws(e)
    }
}

#[async_trait]
pub trait ReceiverExt {
    /// Waits a short while for a message, yielding `None` if nothing usable arrived.
    async fn recv_json(&mut self) -> Result<Option<Event>>;
    /// Waits for the next message. A finished stream is reported as [`Error::WsClosed`].
    async fn recv_json_no_timeout(&mut self) -> Result<Option<Event>>;
}

#[async_trait]
pub trait SenderExt {
    async fn send_json(&mut self, value: &Event) -> Result<()>;
}

#[async_trait]
impl ReceiverExt for WsStream {
    async fn recv_json(&mut self) -> Result<Option<Event>> {
        const TIMEOUT: Duration = Duration::from_millis(500);

        let ws_message = match timeout(TIMEOUT, self.next()).await {
            Ok(Some(Ok(v))) => Some(v),
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => return Err(Error::WsClosed(None)),
            Err(_) => None,
        };

        convert_ws_message(ws_message)
    }

    async fn recv_json_no_timeout(&mut self) -> Result<Option<Event>> {
        match self.next().await {
            Some(Ok(v)) => convert_ws_message(Some(v)),
            Some(Err(e)) => Err(e.into()),
            None => Err(Error::WsClosed(None)),
        }
    }
}

#[async_trait]
impl SenderExt for WsStream {
    async fn send_json(&mut self, value: &Event) -> Result<()> {
        let message = serde_json::to_string(value).map(Message::Text)?;

        self.send(message).await?;
        Ok(())
    }
}

#[inline]
pub(crate) fn convert_ws_message(message: Option<Message>) -> Result<Option<Event>> {
    Ok(match message {
        Some(Message::Text(payload)) => {
            serde_json::from_str(&payload).map(Some).map_err(|why| {
                warn!("Err deserializing text: {:?}; text: {}", why, payload);

                why
            })?
        },
        Some(Message::Binary(bytes)) => {
            return Err(Error::UnexpectedBinaryMessage(bytes));
        },
        Some(Message::Close(frame)) => {
            return Err(Error::WsClosed(frame));
        },
        // Ping/Pong message behaviour is internally handled by tungstenite.
        _ => None,
    })
}

#[instrument]
pub(crate) async fn create_client(url: Url) -> Result<WsStream> {
    let (stream, _) = connect_async(url.as_str()).await?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use super::*;
    use crate::model::Opcode;

    #[test]
    fn text_messages_decode() {
        let event = convert_ws_message(Some(Message::Text(
            r#"{"op":8,"d":{"heartbeat_interval":41250.0}}"#.into(),
        )))
        .unwrap()
        .unwrap();

        assert_eq!(event.kind(), Some(Opcode::Hello));
    }

    #[test]
    fn pings_are_skipped() {
        assert!(convert_ws_message(Some(Message::Ping(vec![1]))).unwrap().is_none());
    }

    #[test]
    fn close_frames_carry_code() {
        let err = convert_ws_message(Some(Message::Close(Some(CloseFrame {
            code: CloseCode::from(4014),
            reason: "".into(),
        }))))
        .unwrap_err();

        assert_eq!(err.close_code(), Some(4014));
    }

    #[test]
    fn binary_messages_are_rejected() {
        assert!(matches!(
            convert_ws_message(Some(Message::Binary(vec![0]))),
            Err(Error::UnexpectedBinaryMessage(_))
        ));
    }
}
