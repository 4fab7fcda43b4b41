//! A handshaken link to one device and the serialized execute protocol over it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LinkConfig;
use crate::context::Context;
use crate::error::{ContextError, HandshakeError, RpcError};
use crate::transport::{AdapterParts, FrameSink, FrameSource, Outbound, Pumps, TransportAdapter};
use crate::value::Response;

pub mod envelope;
mod handshake;
mod nop;

pub use handshake::HandshakeData;
pub use nop::NopConnection;

/// Anything that can run a command on a device and return its values.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    fn id(&self) -> Uuid;

    fn handshake(&self) -> &HandshakeData;

    /// Runs `command` on the device. At most one call per connection is in flight at a time.
    async fn execute(&self, cx: &Context, command: &str) -> Result<Response, RpcError>;

    /// Cancelled once the connection is closed or its transport dies.
    fn context(&self) -> CancellationToken;

    /// Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool {
        self.context().is_cancelled()
    }

    /// Resolves once the connection is closed, by [`Connection::close`] or by transport failure.
    async fn closed(&self) {
        let context = self.context();
        context.cancelled().await
    }

    fn is_nop(&self) -> bool {
        false
    }
}

pub type SharedConnection = Arc<dyn Connection>;

/// A device on the other end of a transport adapter.
pub struct RemoteConnection {
    id: Uuid,
    handshake: HandshakeData,
    // Held for the whole write/read exchange; doubles as the execution lock.
    inbound: AsyncMutex<mpsc::Receiver<Bytes>>,
    outbound: Outbound,
    context: CancellationToken,
    // Set by `close()`; tells a local close apart from the transport dying under us.
    closed_locally: AtomicBool,
    pumps: Arc<Pumps>,
}

impl std::fmt::Debug for RemoteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConnection")
            .field("id", &self.id)
            .field("handshake", &self.handshake)
            .field("closed", &self.context.is_cancelled())
            .finish()
    }
}

impl RemoteConnection {
    /// Reads the handshake off a running adapter. On failure the adapter is shut down.
    pub async fn establish(
        adapter: TransportAdapter,
        remote_host: &str,
        config: &LinkConfig,
    ) -> Result<Arc<Self>, HandshakeError> {
        let id = Uuid::new_v4();
        let AdapterParts {
            mut inbound,
            outbound,
            lifetime,
            pumps,
        } = adapter.into_parts();

        debug!(connection_id = %id, remote_host, "waiting for handshake");
        let handshake =
            match handshake::perform(&mut inbound, remote_host, config.handshake_timeout).await {
                Ok(handshake) => handshake,
                Err(err) => {
                    warn!(connection_id = %id, remote_host, error = %err, "handshake failed");
                    lifetime.cancel();
                    outbound.close();
                    pumps.shutdown().await;
                    return Err(err);
                }
            };

        info!(
            connection_id = %id,
            device_key = %handshake.key(),
            device_type = %handshake.device_type,
            label = handshake.label.as_deref().unwrap_or(""),
            "device connected"
        );
        Ok(Arc::new(Self {
            id,
            handshake,
            inbound: AsyncMutex::new(inbound),
            outbound,
            context: lifetime,
            closed_locally: AtomicBool::new(false),
            pumps,
        }))
    }

    /// Pumps a raw socket and performs the handshake on it.
    pub async fn accept<R, W>(
        source: R,
        sink: W,
        remote_host: &str,
        config: &LinkConfig,
    ) -> Result<Arc<Self>, HandshakeError>
    where
        R: FrameSource,
        W: FrameSink,
    {
        let adapter = TransportAdapter::spawn(source, sink, config);
        Self::establish(adapter, remote_host, config).await
    }

    /// Wraps an adapter whose identity is already known; no handshake frame is read.
    pub fn with_handshake(adapter: TransportAdapter, handshake: HandshakeData) -> Arc<Self> {
        let AdapterParts {
            inbound,
            outbound,
            lifetime,
            pumps,
        } = adapter.into_parts();
        Arc::new(Self {
            id: Uuid::new_v4(),
            handshake,
            inbound: AsyncMutex::new(inbound),
            outbound,
            context: lifetime,
            closed_locally: AtomicBool::new(false),
            pumps,
        })
    }

    /// Closes the connection and waits for the socket to be torn down.
    pub async fn shutdown(&self) {
        self.close();
        self.pumps.shutdown().await;
    }

    /// What a call observes once the connection context has fired.
    fn closed_error(&self) -> RpcError {
        if self.closed_locally.load(Ordering::Acquire) {
            ContextError::Canceled.into()
        } else {
            RpcError::ChannelClosed
        }
    }

    async fn round_trip(
        &self,
        cx: &Context,
        execution_id: Uuid,
        command: &str,
    ) -> Result<Response, RpcError> {
        let mut inbound = tokio::select! {
            biased;
            err = cx.done() => return Err(err.into()),
            _ = self.context.cancelled() => return Err(self.closed_error()),
            guard = self.inbound.lock() => guard,
        };

        // Anything already queued answers an earlier call that gave up waiting.
        while let Ok(stale) = inbound.try_recv() {
            debug!(
                connection_id = %self.id,
                %execution_id,
                payload_size = stale.len(),
                "discarding stale response"
            );
        }

        tokio::select! {
            biased;
            err = cx.done() => return Err(err.into()),
            _ = self.context.cancelled() => return Err(self.closed_error()),
            sent = self.outbound.send(envelope::encode_command(command)) => sent?,
        }

        let frame = tokio::select! {
            biased;
            frame = inbound.recv() => frame.ok_or(RpcError::ChannelClosed)?,
            err = cx.done() => return Err(err.into()),
            _ = self.context.cancelled() => return Err(self.closed_error()),
        };

        Ok(Response::decode(&frame)?)
    }
}

#[async_trait]
impl Connection for RemoteConnection {
    fn id(&self) -> Uuid {
        self.id
    }

    fn handshake(&self) -> &HandshakeData {
        &self.handshake
    }

    async fn execute(&self, cx: &Context, command: &str) -> Result<Response, RpcError> {
        let execution_id = Uuid::new_v4();
        info!(
            connection_id = %self.id,
            %execution_id,
            command,
            "executing command"
        );

        let result = self.round_trip(cx, execution_id, command).await;
        match &result {
            Ok(response) => debug!(
                connection_id = %self.id,
                %execution_id,
                values = response.len(),
                "command completed"
            ),
            Err(err) => debug!(
                connection_id = %self.id,
                %execution_id,
                error = %err,
                "command failed"
            ),
        }
        result
    }

    fn context(&self) -> CancellationToken {
        self.context.clone()
    }

    fn close(&self) {
        if !self.context.is_cancelled() {
            self.closed_locally.store(true, Ordering::Release);
            debug!(connection_id = %self.id, device_key = %self.handshake.key(), "closing connection");
        }
        self.outbound.close();
        self.context.cancel();
    }
}

impl Drop for RemoteConnection {
    fn drop(&mut self) {
        self.outbound.close();
        self.context.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::device::DeviceType;
    use crate::transport::memory;
    use crate::value::Value;

    fn channel_connection() -> (Arc<RemoteConnection>, mpsc::Sender<Bytes>, mpsc::Receiver<Bytes>) {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(8);
        let adapter = TransportAdapter::from_channels(in_rx, out_tx);
        let conn = RemoteConnection::with_handshake(adapter, HandshakeData::degraded("test"));
        (conn, in_tx, out_rx)
    }

    #[test_timeout::tokio_timeout_test]
    async fn execute_writes_envelope_and_decodes_reply() {
        let (conn, in_tx, mut out_rx) = channel_connection();
        let call = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.execute(&Context::background(), "os.version()").await })
        };
        let frame = out_rx.recv().await.expect("command");
        assert_eq!(frame, Bytes::from_static(br#"{"func":"return {os.version()}"}"#));
        in_tx
            .send(Bytes::from_static(br#"["CraftOS 1.8"]"#))
            .await
            .expect("reply");
        let response = call.await.expect("join").expect("execute");
        assert_eq!(response.string_at(0).expect("string"), "CraftOS 1.8");
    }

    #[test_timeout::tokio_timeout_test]
    async fn timed_out_call_leaves_connection_usable() {
        let (conn, in_tx, mut out_rx) = channel_connection();

        let cx = Context::with_timeout(Duration::from_millis(10));
        let err = conn.execute(&cx, "sleep(5)").await.expect_err("deadline");
        assert!(err.is_timeout());
        assert!(out_rx.recv().await.is_some());

        // The late answer to the first call must not be taken as the second call's reply.
        in_tx.send(Bytes::from_static(b"[\"late\"]")).await.expect("late");
        let call = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.execute(&Context::background(), "os.getComputerID()").await })
        };
        assert!(out_rx.recv().await.is_some());
        in_tx.send(Bytes::from_static(b"[4]")).await.expect("reply");
        let response = call.await.expect("join").expect("execute");
        assert_eq!(response.int_at(0).expect("int"), 4);
    }

    #[test_timeout::tokio_timeout_test]
    async fn closed_inbound_is_channel_closed() {
        let (conn, in_tx, _out_rx) = channel_connection();
        drop(in_tx);
        let err = conn
            .execute(&Context::background(), "os.version()")
            .await
            .expect_err("closed");
        assert!(matches!(err, RpcError::ChannelClosed));
    }

    #[test_timeout::tokio_timeout_test]
    async fn closed_outbound_is_send_on_closed() {
        let (conn, _in_tx, out_rx) = channel_connection();
        drop(out_rx);
        let err = conn
            .execute(&Context::background(), "os.version()")
            .await
            .expect_err("closed");
        assert!(matches!(err, RpcError::SendOnClosed));
    }

    #[test_timeout::tokio_timeout_test]
    async fn cancelled_context_wins_before_the_write() {
        let (conn, _in_tx, mut out_rx) = channel_connection();
        let cx = Context::background();
        cx.cancel();
        let err = conn.execute(&cx, "os.version()").await.expect_err("cancelled");
        assert!(matches!(err, RpcError::Context(ContextError::Canceled)));
        assert!(out_rx.try_recv().is_err());
    }

    #[test_timeout::tokio_timeout_test]
    async fn close_aborts_in_flight_call() {
        let (conn, _in_tx, mut out_rx) = channel_connection();
        let call = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.execute(&Context::background(), "read()").await })
        };
        assert!(out_rx.recv().await.is_some());
        conn.close();
        conn.close();
        let err = call.await.expect("join").expect_err("closed");
        assert!(matches!(err, RpcError::Context(ContextError::Canceled)));
        assert!(conn.is_closed());
    }

    #[test_timeout::tokio_timeout_test]
    async fn malformed_reply_is_a_decode_error() {
        let (conn, in_tx, mut out_rx) = channel_connection();
        let call = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.execute(&Context::background(), "x()").await })
        };
        assert!(out_rx.recv().await.is_some());
        in_tx.send(Bytes::from_static(b"not json")).await.expect("reply");
        let err = call.await.expect("join").expect_err("decode");
        assert!(matches!(err, RpcError::Decode(_)));
    }

    #[test_timeout::tokio_timeout_test]
    async fn accept_reads_the_handshake() {
        let (source, sink, remote) = memory::pair(8);
        assert!(
            remote
                .send_json(&json!({"id": 12, "label": "digger", "type": "turtle"}))
                .await
        );
        let _responder = remote.spawn_responder(|_| Some(json!([true])));

        let conn = RemoteConnection::accept(source, sink, "10.0.0.4", &LinkConfig::default())
            .await
            .expect("handshake");
        assert_eq!(conn.handshake().key(), "10.0.0.4#12");
        assert_eq!(conn.handshake().device_type, DeviceType::Turtle);
        assert_eq!(conn.handshake().label.as_deref(), Some("digger"));

        let response = conn
            .execute(&Context::background(), "turtle.forward()")
            .await
            .expect("execute");
        assert_eq!(response.values(), &[Value::Bool(true)]);
        conn.shutdown().await;
    }

    #[test_timeout::tokio_timeout_test]
    async fn accept_fails_when_the_peer_leaves_early() {
        let (source, sink, mut remote) = memory::pair(8);
        remote.hangup();
        let err = RemoteConnection::accept(source, sink, "host", &LinkConfig::default())
            .await
            .expect_err("no handshake");
        assert!(matches!(err, HandshakeError::Closed));
    }

    #[test_timeout::tokio_timeout_test]
    async fn accept_times_out_on_a_silent_peer() {
        let (source, sink, mut remote) = memory::pair(8);
        let config = LinkConfig::default().with_handshake_timeout(Duration::from_millis(20));
        let err = RemoteConnection::accept(source, sink, "host", &config)
            .await
            .expect_err("timeout");
        assert!(matches!(err, HandshakeError::Timeout(_)));
        // the socket was torn down
        assert!(remote.recv().await.is_none());
    }

    #[test_timeout::tokio_timeout_test]
    async fn socket_death_mid_call_is_channel_closed() {
        let (source, sink, mut remote) = memory::pair(8);
        assert!(remote.send_json(&json!({"id": 1})).await);
        let conn = RemoteConnection::accept(source, sink, "host", &LinkConfig::default())
            .await
            .expect("handshake");

        let call = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.execute(&Context::background(), "read()").await })
        };
        assert_eq!(remote.recv_command().await.as_deref(), Some("read()"));
        remote.hangup();

        let err = call.await.expect("join").expect_err("dead socket");
        assert!(matches!(err, RpcError::ChannelClosed));
        conn.context().cancelled().await;
    }

    #[test_timeout::tokio_timeout_test]
    async fn calls_after_socket_death_are_channel_closed() {
        let (source, sink, mut remote) = memory::pair(8);
        assert!(remote.send_json(&json!({"id": 1})).await);
        let conn = RemoteConnection::accept(source, sink, "host", &LinkConfig::default())
            .await
            .expect("handshake");
        remote.hangup();
        conn.closed().await;

        for _ in 0..2 {
            let err = conn
                .execute(&Context::background(), "os.version()")
                .await
                .expect_err("dead socket");
            assert!(matches!(err, RpcError::ChannelClosed), "{err}");
            assert!(err.is_closed());
        }

        // a later local close does not rewrite why the connection died
        conn.close();
        let err = conn
            .execute(&Context::background(), "os.version()")
            .await
            .expect_err("closed");
        assert!(matches!(err, RpcError::ChannelClosed));
    }
}
