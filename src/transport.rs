// file: src/transport.rs
// description: transport primitives for the event channel, WebSocket (bidirectional) and SSE (push-only)

use crate::{connection::ConnectionMode, error::TaskwireError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};
use tracing::{debug, trace, warn};
use url::Url;

/// One live channel primitive. Implementations own exactly one underlying
/// socket or stream; the connection supervisor tears an instance down
/// before dialing a replacement.
#[async_trait]
pub trait Transport: Send {
    /// Capability class of this primitive.
    fn mode(&self) -> ConnectionMode;

    /// Send one text frame. Fails with `NotConnected` on a push-only
    /// primitive, which has no client-to-server direction at all.
    async fn send(&mut self, text: String) -> Result<(), TaskwireError>;

    /// Receive the next text frame.
    ///
    /// `Some(Err(_))` is a transport fault, `None` is end of stream; the
    /// caller decides whether either counts as a clean or unclean close.
    async fn recv(&mut self) -> Option<Result<String, TaskwireError>>;

    /// Shut the primitive down. Idempotent.
    async fn close(&mut self) -> Result<(), TaskwireError>;
}

/// Full-duplex WebSocket primitive used for commands + events.
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketTransport {
    /// Dial `url` (ws:// or wss://). A construction-time failure here is
    /// surfaced to the caller directly; retry policy lives a layer up.
    pub async fn connect(url: &Url) -> Result<Self, TaskwireError> {
        let (stream, _) = connect_async(url.as_str()).await?;
        debug!(url = %url, "WebSocket connection established");
        Ok(Self { stream })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn mode(&self) -> ConnectionMode {
        ConnectionMode::Bidirectional
    }

    async fn send(&mut self, text: String) -> Result<(), TaskwireError> {
        use futures_util::SinkExt;
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(TaskwireError::from)
    }

    async fn recv(&mut self) -> Option<Result<String, TaskwireError>> {
        use futures_util::SinkExt;
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(data)) => {
                    warn!(bytes = data.len(), "ignoring unexpected binary frame");
                }
                Ok(Message::Ping(payload)) => {
                    trace!("protocol ping received, replying pong");
                    if let Err(e) = self.stream.send(Message::Pong(payload)).await {
                        return Some(Err(e.into()));
                    }
                }
                Ok(Message::Pong(_)) => {
                    trace!("protocol pong received");
                }
                Ok(Message::Close(frame)) => {
                    warn!(frame = ?frame, "server sent close frame");
                    return Some(Err(TaskwireError::ConnectionClosed));
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), TaskwireError> {
        match self.stream.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Half-duplex server-sent-events primitive used for event-only consumption.
pub struct SseTransport {
    stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: String,
}

impl SseTransport {
    pub async fn connect(url: &Url) -> Result<Self, TaskwireError> {
        let response = reqwest::Client::new()
            .get(url.clone())
            .header("Accept", "text/event-stream")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TaskwireError::StreamRejected(response.status().as_u16()));
        }
        debug!(url = %url, "event stream established");
        Ok(Self {
            stream: Box::pin(response.bytes_stream()),
            buffer: String::new(),
        })
    }
}

#[async_trait]
impl Transport for SseTransport {
    fn mode(&self) -> ConnectionMode {
        ConnectionMode::PushOnly
    }

    async fn send(&mut self, _text: String) -> Result<(), TaskwireError> {
        Err(TaskwireError::NotConnected)
    }

    async fn recv(&mut self) -> Option<Result<String, TaskwireError>> {
        loop {
            if let Some(data) = next_sse_data(&mut self.buffer) {
                return Some(Ok(data));
            }
            match self.stream.next().await {
                Some(Ok(chunk)) => self.buffer.push_str(&String::from_utf8_lossy(&chunk)),
                Some(Err(e)) => return Some(Err(e.into())),
                None => return None,
            }
        }
    }

    async fn close(&mut self) -> Result<(), TaskwireError> {
        self.stream = Box::pin(futures_util::stream::empty());
        self.buffer.clear();
        Ok(())
    }
}

/// Pop the next complete SSE data payload out of `buffer`, skipping
/// comment-only and field-only blocks. Returns `None` when no complete
/// block is buffered yet.
fn next_sse_data(buffer: &mut String) -> Option<String> {
    loop {
        let (start, len) = match (buffer.find("\n\n"), buffer.find("\r\n\r\n")) {
            (Some(lf), Some(crlf)) if crlf < lf => (crlf, 4),
            (Some(lf), _) => (lf, 2),
            (None, Some(crlf)) => (crlf, 4),
            (None, None) => return None,
        };
        let block: String = buffer[..start].to_string();
        buffer.drain(..start + len);

        let data_lines: Vec<&str> = block
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter_map(|line| {
                line.strip_prefix("data:")
                    .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
            })
            .collect();
        if !data_lines.is_empty() {
            return Some(data_lines.join("\n"));
        }
        // keep scanning past heartbeat comments and bare id/event fields
    }
}
