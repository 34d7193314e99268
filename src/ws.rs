//! Thin websocket transport: JSON-over-text framing on top of tokio-tungstenite,
//! with the [`Payload`] codec's lenient/hard-error distinction preserved.

use crate::model::{DecodeError, EncodeError, Payload};

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt, TryStreamExt};
use std::fmt::{Display, Formatter, Result as FmtResult};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{
    tungstenite::{error::Error as TungsteniteError, protocol::CloseFrame, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, instrument};
use url::Url;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// A frame with a recognised opcode failed to parse; this is a
    /// non-retryable protocol-level disagreement with the remote.
    Decode(DecodeError),
    Encode(EncodeError),

    /// This library only speaks text frames; a binary frame means the remote
    /// negotiated something this client didn't ask for.
    UnexpectedBinaryMessage(Vec<u8>),

    Ws(TungsteniteError),

    WsClosed(Option<CloseFrame<'static>>),
}

impl From<EncodeError> for Error {
    fn from(e: EncodeError) -> Error {
        Error::Encode(e)
    }
}

impl From<TungsteniteError> for Error {
    fn from(e: TungsteniteError) -> Error {
        Error::Ws(e)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Error::Decode(e) => write!(f, "failed to decode gateway payload: {e}"),
            Error::Encode(e) => write!(f, "failed to encode gateway payload: {e}"),
            Error::UnexpectedBinaryMessage(bytes) =>
                write!(f, "unexpected binary message ({} bytes)", bytes.len()),
            Error::Ws(e) => Display::fmt(e, f),
            Error::WsClosed(frame) => write!(f, "websocket closed: {frame:?}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Decode(e) => Some(e),
            Error::Encode(e) => Some(e),
            Error::Ws(e) => Some(e),
            Error::UnexpectedBinaryMessage(_) | Error::WsClosed(_) => None,
        }
    }
}

#[async_trait]
pub trait ReceiverExt {
    /// Waits up to 500ms for the next payload; `Ok(None)` on timeout or a
    /// frame this library discards (pings, unknown-opcode frames it should
    /// not surface as an error).
    async fn recv_json(&mut self) -> Result<Option<Payload>>;
    async fn recv_json_no_timeout(&mut self) -> Result<Option<Payload>>;
}

#[async_trait]
pub trait SenderExt {
    async fn send_json(&mut self, value: &Payload) -> Result<()>;
}

#[async_trait]
impl ReceiverExt for WsStream {
    async fn recv_json(&mut self) -> Result<Option<Payload>> {
        const TIMEOUT: Duration = Duration::from_millis(500);

        let ws_message = match timeout(TIMEOUT, self.next()).await {
            Ok(Some(Ok(v))) => Some(v),
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) | Err(_) => None,
        };

        convert_ws_message(ws_message)
    }

    async fn recv_json_no_timeout(&mut self) -> Result<Option<Payload>> {
        convert_ws_message(self.try_next().await?)
    }
}

#[async_trait]
impl SenderExt for SplitSink<WsStream, Message> {
    async fn send_json(&mut self, value: &Payload) -> Result<()> {
        let bytes = value.encode()?;
        self.send(Message::Text(String::from_utf8_lossy(&bytes).into_owned())).await?;
        Ok(())
    }
}

#[async_trait]
impl SenderExt for WsStream {
    async fn send_json(&mut self, value: &Payload) -> Result<()> {
        let bytes = value.encode()?;
        self.send(Message::Text(String::from_utf8_lossy(&bytes).into_owned())).await?;
        Ok(())
    }
}

#[inline]
pub(crate) fn convert_ws_message(message: Option<Message>) -> Result<Option<Payload>> {
    Ok(match message {
        Some(Message::Text(payload)) => match Payload::decode(payload.as_bytes()) {
            Ok(p) => Some(p),
            Err(e @ DecodeError::Malformed { .. }) => return Err(Error::Decode(e)),
            Err(e @ DecodeError::Envelope(_)) => {
                debug!("Unparseable frame {payload:?}: {e}");
                return Err(Error::Decode(e));
            },
        },
        Some(Message::Binary(bytes)) => {
            return Err(Error::UnexpectedBinaryMessage(bytes));
        },
        Some(Message::Close(frame)) => {
            return Err(Error::WsClosed(frame));
        },
        // Ping/Pong are handled internally by tungstenite.
        _ => None,
    })
}

/// User-Agent header sent on the websocket upgrade request.
pub(crate) const USER_AGENT: &str = concat!("voicelink/", env!("CARGO_PKG_VERSION"));

#[instrument]
pub(crate) async fn connect(url: Url) -> Result<WsStream> {
    use tokio_tungstenite::tungstenite::{client::IntoClientRequest, protocol::WebSocketConfig};

    let mut request = url.into_client_request()?;
    request
        .headers_mut()
        .insert(http::header::USER_AGENT, USER_AGENT.parse().expect("static value is valid"));

    let (stream, _) = tokio_tungstenite::connect_async_with_config(
        request,
        Some(WebSocketConfig { max_message_size: None, max_frame_size: None, ..Default::default() }),
        false,
    )
    .await?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::payload::HeartbeatAck;

    #[test]
    fn unknown_opcode_frame_is_discarded_not_erroring() {
        let msg = Some(Message::Text(r#"{"op": 250, "d": {}}"#.to_string()));
        let converted = convert_ws_message(msg).expect("unknown opcode should not error");
        assert!(matches!(converted, Some(Payload::Unknown(_))));
    }

    #[test]
    fn malformed_known_opcode_is_hard_error() {
        let msg = Some(Message::Text(r#"{"op": 6, "d": {"nonce": "nope"}}"#.to_string()));
        let err = convert_ws_message(msg).expect_err("malformed HeartbeatAck should error");
        assert!(matches!(err, Error::Decode(DecodeError::Malformed { .. })));
    }

    #[test]
    fn heartbeat_ack_round_trips_through_text_frame() {
        let payload = Payload::HeartbeatAck(HeartbeatAck { nonce: 7 });
        let bytes = payload.encode().unwrap();
        let msg = Some(Message::Text(String::from_utf8(bytes).unwrap()));
        let decoded = convert_ws_message(msg).unwrap();
        assert_eq!(decoded, Some(payload));
    }
}
