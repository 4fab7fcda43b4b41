//! Turns a duplex socket into an inbound frame queue and an outbound frame sink.
//!
//! Each direction is pumped by its own tokio task. When either pump stops the adapter's
//! lifetime token fires, which is how a dead socket propagates to the connection above.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::IgnoredAny;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::LinkConfig;
use crate::error::TransportError;

pub mod memory;
pub mod websocket;

/// Read half of a duplex socket. `None` means the peer went away.
#[async_trait]
pub trait FrameSource: Send + 'static {
    async fn next_frame(&mut self) -> Option<Result<Bytes, TransportError>>;
}

/// Write half of a duplex socket.
#[async_trait]
pub trait FrameSink: Send + 'static {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Sending side of the outbound queue.
///
/// Carries an explicit closed flag so a send after shutdown fails with
/// [`TransportError::SendOnClosed`] instead of racing a dropped receiver.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Bytes>,
    closed: Arc<AtomicBool>,
}

impl Outbound {
    fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::SendOnClosed);
        }
        self.tx.send(frame).await.map_err(|_| {
            self.closed.store(true, Ordering::Release);
            TransportError::SendOnClosed
        })
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

struct PumpHandles {
    writer: JoinHandle<Box<dyn FrameSink>>,
    reader: JoinHandle<()>,
}

/// The running reader/writer tasks of one adapter.
pub struct Pumps {
    writer_stop: CancellationToken,
    reader_stop: CancellationToken,
    // Bounds the final socket close, which may block on a peer that stopped reading.
    close_timeout: Duration,
    handles: AsyncMutex<Option<PumpHandles>>,
}

impl Pumps {
    fn idle() -> Self {
        Self {
            writer_stop: CancellationToken::new(),
            reader_stop: CancellationToken::new(),
            close_timeout: LinkConfig::default().drain_timeout,
            handles: AsyncMutex::new(None),
        }
    }

    /// Stops writer, drains and closes the outbound queue, stops reader, closes the socket.
    ///
    /// Idempotent; a concurrent second caller waits for the first to finish.
    pub async fn shutdown(&self) {
        let mut guard = self.handles.lock().await;
        let Some(handles) = guard.take() else {
            return;
        };

        self.writer_stop.cancel();
        let sink = match handles.writer.await {
            Ok(sink) => Some(sink),
            Err(err) => {
                warn!(error = %err, "outbound pump did not exit cleanly");
                None
            }
        };

        self.reader_stop.cancel();
        if let Err(err) = handles.reader.await {
            warn!(error = %err, "inbound pump did not exit cleanly");
        }

        if let Some(mut sink) = sink {
            match tokio::time::timeout(self.close_timeout, sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => debug!(error = %err, "closing socket failed"),
                Err(_) => warn!(timeout = ?self.close_timeout, "closing socket timed out"),
            }
        }
    }
}

/// Inbound queue, outbound sink and pump lifecycle for one socket.
pub struct TransportAdapter {
    inbound: mpsc::Receiver<Bytes>,
    outbound: Outbound,
    lifetime: CancellationToken,
    pumps: Arc<Pumps>,
}

impl TransportAdapter {
    /// Starts the reader and writer pumps. Must be called inside a tokio runtime.
    pub fn spawn<R, W>(source: R, sink: W, config: &LinkConfig) -> Self
    where
        R: FrameSource,
        W: FrameSink,
    {
        Self::spawn_with_lifetime(source, sink, config, &CancellationToken::new())
    }

    /// Like [`TransportAdapter::spawn`], but cancelling `parent` also shuts the adapter down.
    pub fn spawn_with_lifetime<R, W>(
        source: R,
        sink: W,
        config: &LinkConfig,
        parent: &CancellationToken,
    ) -> Self
    where
        R: FrameSource,
        W: FrameSink,
    {
        let depth = config.queue_depth.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(depth);
        let (outbound_tx, outbound_rx) = mpsc::channel(depth);
        let outbound = Outbound::new(outbound_tx);
        let lifetime = parent.child_token();
        let writer_stop = CancellationToken::new();
        let reader_stop = CancellationToken::new();

        let reader = tokio::spawn(read_pump(
            source,
            inbound_tx,
            reader_stop.clone(),
            lifetime.clone(),
        ));
        let writer = tokio::spawn(write_pump(
            Box::new(sink),
            outbound_rx,
            Arc::clone(&outbound.closed),
            writer_stop.clone(),
            lifetime.clone(),
            config.drain_timeout,
        ));
        let pumps = Arc::new(Pumps {
            writer_stop,
            reader_stop,
            close_timeout: config.drain_timeout,
            handles: AsyncMutex::new(Some(PumpHandles { writer, reader })),
        });

        // Whoever cancels the lifetime, the pumps wind down in order.
        let supervisor_lifetime = lifetime.clone();
        let supervisor_pumps = Arc::clone(&pumps);
        let supervisor_closed = Arc::clone(&outbound.closed);
        tokio::spawn(async move {
            supervisor_lifetime.cancelled().await;
            supervisor_closed.store(true, Ordering::Release);
            supervisor_pumps.shutdown().await;
        });

        Self {
            inbound: inbound_rx,
            outbound,
            lifetime,
            pumps,
        }
    }

    /// Wraps already-pumped queues, e.g. test harness channels. No tasks are spawned.
    pub fn from_channels(inbound: mpsc::Receiver<Bytes>, outbound: mpsc::Sender<Bytes>) -> Self {
        Self {
            inbound,
            outbound: Outbound::new(outbound),
            lifetime: CancellationToken::new(),
            pumps: Arc::new(Pumps::idle()),
        }
    }

    pub fn inbound(&mut self) -> &mut mpsc::Receiver<Bytes> {
        &mut self.inbound
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Fires when either pump stops or the adapter is shut down.
    pub fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    pub async fn shutdown(&self) {
        self.lifetime.cancel();
        self.outbound.close();
        self.pumps.shutdown().await;
    }

    pub fn into_parts(self) -> AdapterParts {
        AdapterParts {
            inbound: self.inbound,
            outbound: self.outbound,
            lifetime: self.lifetime,
            pumps: self.pumps,
        }
    }
}

pub struct AdapterParts {
    pub inbound: mpsc::Receiver<Bytes>,
    pub outbound: Outbound,
    pub lifetime: CancellationToken,
    pub pumps: Arc<Pumps>,
}

async fn read_pump<R: FrameSource>(
    mut source: R,
    inbound: mpsc::Sender<Bytes>,
    stop: CancellationToken,
    lifetime: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = stop.cancelled() => break,
            next = source.next_frame() => next,
        };

        match next {
            Some(Ok(frame)) => {
                if serde_json::from_slice::<IgnoredAny>(&frame).is_err() {
                    warn!(payload_size = frame.len(), "inbound frame is not json");
                }
                tokio::select! {
                    _ = stop.cancelled() => break,
                    sent = inbound.send(frame) => {
                        if sent.is_err() {
                            debug!("inbound queue receiver dropped");
                            break;
                        }
                    }
                }
            }
            Some(Err(err)) => {
                warn!(error = %err, "socket read failed");
                break;
            }
            None => {
                debug!("socket stream ended");
                break;
            }
        }
    }

    // Close the queue before signalling, so waiters observe the closed channel.
    drop(inbound);
    lifetime.cancel();
}

async fn write_pump(
    mut sink: Box<dyn FrameSink>,
    mut outbound: mpsc::Receiver<Bytes>,
    closed: Arc<AtomicBool>,
    stop: CancellationToken,
    lifetime: CancellationToken,
    drain_timeout: Duration,
) -> Box<dyn FrameSink> {
    loop {
        let frame = tokio::select! {
            _ = stop.cancelled() => break,
            frame = outbound.recv() => frame,
        };
        let Some(frame) = frame else {
            break;
        };
        // Shutdown must not wait on a peer that stopped reading.
        let payload_size = frame.len();
        let sent = tokio::select! {
            _ = stop.cancelled() => {
                debug!(payload_size, "socket write abandoned");
                break;
            }
            sent = sink.send_frame(frame) => sent,
        };
        if let Err(err) = sent {
            warn!(error = %err, "socket write failed");
            closed.store(true, Ordering::Release);
            lifetime.cancel();
            return sink;
        }
    }

    closed.store(true, Ordering::Release);
    outbound.close();
    let drained = tokio::time::timeout(drain_timeout, async {
        let mut count = 0usize;
        while let Some(frame) = outbound.recv().await {
            if sink.send_frame(frame).await.is_err() {
                break;
            }
            count += 1;
        }
        count
    })
    .await;
    match drained {
        Ok(0) => {}
        Ok(count) => debug!(frames = count, "drained outbound queue"),
        Err(_) => warn!(?drain_timeout, "outbound drain timed out"),
    }

    lifetime.cancel();
    sink
}
