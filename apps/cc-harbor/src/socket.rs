//! Frame source/sink over axum's upgraded websocket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use cc_link::{FrameSink, FrameSource, TransportError};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

pub struct AxumSource {
    stream: SplitStream<WebSocket>,
}

pub struct AxumSink {
    sink: SplitSink<WebSocket, Message>,
}

pub fn split(socket: WebSocket) -> (AxumSource, AxumSink) {
    let (sink, stream) = socket.split();
    (AxumSource { stream }, AxumSink { sink })
}

#[async_trait]
impl FrameSource for AxumSource {
    async fn next_frame(&mut self) -> Option<Result<Bytes, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Bytes::from(text))),
                Ok(Message::Binary(data)) => return Some(Ok(Bytes::from(data))),
                Ok(Message::Close(_)) => return None,
                Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                Err(err) => return Some(Err(TransportError::WebSocket(err.to_string()))),
            }
        }
    }
}

#[async_trait]
impl FrameSink for AxumSink {
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
