//! In-process socket pair for tests and local tooling.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value as Json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{FrameSink, FrameSource};
use crate::connection::envelope;
use crate::error::TransportError;

/// Link-side read half.
pub struct MemorySource {
    rx: mpsc::Receiver<Bytes>,
}

/// Link-side write half. Closing it hangs up on the remote end.
pub struct MemorySink {
    tx: Option<mpsc::Sender<Bytes>>,
}

/// The "device" side of the pair.
pub struct RemoteEnd {
    tx: Option<mpsc::Sender<Bytes>>,
    rx: mpsc::Receiver<Bytes>,
}

pub fn pair(capacity: usize) -> (MemorySource, MemorySink, RemoteEnd) {
    let (to_link, from_remote) = mpsc::channel(capacity.max(1));
    let (to_remote, from_link) = mpsc::channel(capacity.max(1));
    (
        MemorySource { rx: from_remote },
        MemorySink {
            tx: Some(to_remote),
        },
        RemoteEnd {
            tx: Some(to_link),
            rx: from_link,
        },
    )
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> Option<Result<Bytes, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::SendOnClosed)?;
        tx.send(frame)
            .await
            .map_err(|_| TransportError::WebSocket("remote end hung up".into()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx.take();
        Ok(())
    }
}

impl RemoteEnd {
    /// Returns false once either side has hung up.
    pub async fn send(&self, frame: impl Into<Bytes>) -> bool {
        match &self.tx {
            Some(tx) => tx.send(frame.into()).await.is_ok(),
            None => false,
        }
    }

    pub async fn send_json(&self, value: &Json) -> bool {
        self.send(Bytes::from(value.to_string())).await
    }

    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Next command, unwrapped from its `{"func": "return {..}"}` envelope.
    pub async fn recv_command(&mut self) -> Option<String> {
        loop {
            let frame = self.rx.recv().await?;
            if let Some(command) = envelope::decode_command(&frame) {
                return Some(command);
            }
        }
    }

    pub fn hangup(&mut self) {
        self.tx.take();
    }

    /// Answers every command with whatever `handler` returns; `None` leaves it unanswered.
    pub fn spawn_responder<F>(mut self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(&str) -> Option<Json> + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(command) = self.recv_command().await {
                if let Some(reply) = handler(&command) {
                    if !self.send_json(&reply).await {
                        break;
                    }
                }
            }
        })
    }
}
