use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{FrameSink, FrameSource};
use crate::error::TransportError;

/// The stream under a socket opened by [`connect`].
pub type ClientStream = MaybeTlsStream<TcpStream>;

/// Read half of a tungstenite websocket.
pub struct WsSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

/// Write half of a tungstenite websocket. Frames go out as text messages.
pub struct WsSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

pub fn split<S>(ws: WebSocketStream<S>) -> (WsSource<S>, WsSink<S>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();
    (WsSource { stream }, WsSink { sink })
}

/// Dials `url` (`ws://host:port/path`), as a device or a device emulator would.
pub async fn connect(
    url: &str,
) -> Result<(WsSource<ClientStream>, WsSink<ClientStream>), TransportError> {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|err| TransportError::WebSocket(err.to_string()))?;
    debug!(url, "websocket connected");
    Ok(split(ws))
}

/// Runs the server half of the websocket handshake on an accepted stream.
pub async fn accept<S>(stream: S) -> Result<(WsSource<S>, WsSink<S>), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|err| TransportError::WebSocket(err.to_string()))?;
    Ok(split(ws))
}

#[async_trait]
impl<S> FrameSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn next_frame(&mut self) -> Option<Result<Bytes, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Bytes::from(text))),
                Ok(Message::Binary(data)) => return Some(Ok(Bytes::from(data))),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(err) => return Some(Err(TransportError::WebSocket(err.to_string()))),
            }
        }
    }
}

#[async_trait]
impl<S> FrameSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let text = String::from_utf8(frame.to_vec()).map_err(|_| TransportError::NotUtf8)?;
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|err| TransportError::WebSocket(err.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|err| TransportError::WebSocket(err.to_string()))
    }
}
