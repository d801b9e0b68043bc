//! One physical WebSocket connection to the relay.
//!
//! A session is never reused: after it closes, reconnecting creates a new one.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::{codec, Message, Role};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connect to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("socket error: {0}")]
    Transport(#[from] tungstenite::Error),
}

pub struct Session {
    id: u64,
    writer: SessionWriter,
    reader: SessionReader,
}

impl Session {
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|source| SessionError::Connect {
                url: url.to_string(),
                source,
            })?;
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let (sink, stream) = ws.split();
        tracing::debug!(session = id, %url, "session opened");
        Ok(Self {
            id,
            writer: SessionWriter { id, sink },
            reader: SessionReader { id, stream },
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Sends the hello for `role`. The relay does not acknowledge it.
    pub async fn announce(&mut self, role: Role) -> Result<(), SessionError> {
        self.writer.send(&Message::hello(role)).await?;
        tracing::debug!(session = self.id, %role, "hello sent");
        Ok(())
    }

    /// Splits into halves that can be driven from one `select!`.
    pub fn split(self) -> (SessionWriter, SessionReader) {
        (self.writer, self.reader)
    }
}

pub struct SessionWriter {
    id: u64,
    sink: SplitSink<WsStream, WsMessage>,
}

impl SessionWriter {
    pub async fn send(&mut self, msg: &Message) -> Result<(), SessionError> {
        self.sink.send(WsMessage::Text(codec::encode(msg))).await?;
        Ok(())
    }

    /// Sends a close frame. Errors are irrelevant at this point.
    pub async fn close(mut self) {
        if let Err(e) = self.sink.close().await {
            tracing::debug!(session = self.id, error = %e, "close failed");
        }
    }
}

pub struct SessionReader {
    id: u64,
    stream: SplitStream<WsStream>,
}

impl SessionReader {
    /// Next valid message. Frames outside the message union are logged and skipped.
    /// `Ok(None)` means the relay closed the connection.
    pub async fn recv(&mut self) -> Result<Option<Message>, SessionError> {
        loop {
            let frame = match self.stream.next().await {
                None => return Ok(None),
                Some(Ok(frame)) => frame,
                Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => {
                    return Ok(None)
                }
                Some(Err(e)) => return Err(e.into()),
            };
            match frame {
                WsMessage::Text(text) => match codec::decode(&text) {
                    Ok(msg) => return Ok(Some(msg)),
                    Err(e) => {
                        tracing::debug!(session = self.id, error = %e, "dropping malformed frame");
                    }
                },
                WsMessage::Close(_) => return Ok(None),
                WsMessage::Binary(_) => {
                    tracing::debug!(session = self.id, "dropping binary frame");
                }
                _ => {}
            }
        }
    }
}
