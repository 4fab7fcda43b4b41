use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use axum::{
    extract::{ConnectInfo, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use cc_link::{
    resolve_device_type, Client, Connection, Context, DeviceType, FrameSink, FrameSource,
    HandshakeError, LinkConfig, Registry, RemoteConnection,
};
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::socket;

/// Raised once per successful device connection, after its type is known.
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    pub key: String,
    pub device_type: DeviceType,
    pub client: Client,
}

type DeviceHook = Arc<dyn Fn(DeviceEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// The websocket endpoint devices dial into, plus the registry of everything that ever connected.
#[derive(Clone)]
pub struct Harbor {
    inner: Arc<HarborInner>,
}

struct HarborInner {
    registry: Registry,
    link: LinkConfig,
    probe_timeout: Duration,
    hooks: RwLock<Vec<DeviceHook>>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DeviceSummary {
    pub key: String,
    pub device_type: DeviceType,
    pub online: bool,
}

impl Harbor {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            inner: Arc::new(HarborInner {
                registry: Registry::new(),
                link: config.link.clone(),
                probe_timeout: config.probe_timeout,
                hooks: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Registers a callback run (in its own task) for every device that connects or reconnects.
    pub fn on_device<F, Fut>(&self, hook: F)
    where
        F: Fn(DeviceEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: DeviceHook =
            Arc::new(move |event: DeviceEvent| -> BoxFuture<'static, ()> { Box::pin(hook(event)) });
        self.inner.hooks.write().push(hook);
    }

    pub fn devices(&self) -> Vec<DeviceSummary> {
        self.inner
            .registry
            .clients()
            .into_iter()
            .map(|client| DeviceSummary {
                key: client.key().to_string(),
                device_type: client.device_type(),
                online: client.online(),
            })
            .collect()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/connect/turtle", get(ws_handler))
            .route("/connect", get(ws_handler))
            .route("/healthz", get(health_handler))
            .route("/devices", get(devices_handler))
            .with_state(self.clone())
    }

    /// Handshakes a fresh socket and binds it to its client.
    pub async fn attach<R, W>(
        &self,
        source: R,
        sink: W,
        remote_host: &str,
    ) -> Result<(Client, Arc<RemoteConnection>), HandshakeError>
    where
        R: FrameSource,
        W: FrameSink,
    {
        let conn = RemoteConnection::accept(source, sink, remote_host, &self.inner.link).await?;
        let key = conn.handshake().key();
        let client = self.inner.registry.get_or_create(&key);

        let cx = Context::with_timeout(self.inner.probe_timeout);
        let device_type = resolve_device_type(&cx, conn.as_ref()).await;

        client.set_connection(Some(conn.clone()));
        client.set_device_type(device_type);
        info!(
            device_key = %key,
            connection_id = %conn.id(),
            %device_type,
            "device attached"
        );

        let hooks: Vec<DeviceHook> = self.inner.hooks.read().clone();
        for hook in hooks {
            let event = DeviceEvent {
                key: key.clone(),
                device_type,
                client: client.clone(),
            };
            tokio::spawn(hook(event));
        }

        Ok((client, conn))
    }

    /// Serves until `shutdown` resolves, then closes every live device connection.
    pub async fn serve<S>(self, listener: TcpListener, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("server shutdown with error")?;

        for client in self.inner.registry.clients() {
            client.connection().close();
        }
        info!(devices = self.inner.registry.len(), "harbor stopped");
        Ok(())
    }
}

async fn ws_handler(
    State(harbor): State<Harbor>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let (source, sink) = socket::split(socket);
        let remote_host = remote_addr.ip().to_string();
        debug!(%remote_addr, "websocket upgraded");
        match harbor.attach(source, sink, &remote_host).await {
            Ok((client, conn)) => {
                conn.closed().await;
                info!(%remote_addr, device_key = %client.key(), "device disconnected");
            }
            Err(err) => warn!(%remote_addr, error = %err, "handshake failed"),
        }
    })
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn devices_handler(State(harbor): State<Harbor>) -> impl IntoResponse {
    Json(harbor.devices())
}

#[cfg(test)]
mod tests {
    use cc_link::transport::memory;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    #[test_timeout::tokio_timeout_test]
    async fn attach_registers_and_notifies() {
        let harbor = Harbor::new(&ServerConfig::default());
        let (events_tx, mut events) = mpsc::unbounded_channel();
        harbor.on_device(move |event| {
            let events_tx = events_tx.clone();
            async move {
                let _ = events_tx.send(event);
            }
        });

        let (source, sink, remote) = memory::pair(8);
        assert!(remote.send_json(&json!({"id": 3})).await);
        remote.spawn_responder(|command| match command {
            "turtle ~= nil" => Some(json!([false])),
            "pocket ~= nil" => Some(json!([true])),
            _ => Some(json!([])),
        });

        let (client, _conn) = harbor
            .attach(source, sink, "10.1.1.1")
            .await
            .expect("attach");
        assert_eq!(client.key(), "10.1.1.1#3");
        assert_eq!(client.device_type(), DeviceType::Pocket);

        let event = events.recv().await.expect("event");
        assert_eq!(event.key, "10.1.1.1#3");
        assert_eq!(event.device_type, DeviceType::Pocket);

        assert_eq!(
            harbor.devices(),
            vec![DeviceSummary {
                key: "10.1.1.1#3".to_string(),
                device_type: DeviceType::Pocket,
                online: true,
            }]
        );
    }

    #[test_timeout::tokio_timeout_test]
    async fn reconnect_retires_the_previous_socket() {
        let harbor = Harbor::new(&ServerConfig::default());

        let (source, sink, mut first_remote) = memory::pair(8);
        assert!(first_remote.send_json(&json!({"id": 4, "type": "turtle"})).await);
        let (client, first) = harbor
            .attach(source, sink, "10.1.1.1")
            .await
            .expect("first attach");

        let (source, sink, second_remote) = memory::pair(8);
        assert!(second_remote.send_json(&json!({"id": 4, "type": "turtle"})).await);
        let (again, second) = harbor
            .attach(source, sink, "10.1.1.1")
            .await
            .expect("second attach");

        assert_eq!(again.key(), client.key());
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(client.connection().id(), second.id());
        // the old socket is torn down, so the old device sees a hangup
        assert!(first_remote.recv().await.is_none());
        assert_eq!(harbor.registry().len(), 1);
    }

    #[test_timeout::tokio_timeout_test]
    async fn failed_handshake_registers_nothing() {
        let harbor = Harbor::new(&ServerConfig::default());
        let (source, sink, mut remote) = memory::pair(8);
        remote.hangup();
        let err = harbor
            .attach(source, sink, "10.1.1.1")
            .await
            .expect_err("no handshake");
        assert!(matches!(err, HandshakeError::Closed));
        assert!(harbor.registry().is_empty());
    }
}
