use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::connection::{NopConnection, SharedConnection};
use crate::context::Context;
use crate::device::DeviceType;
use crate::error::RpcError;
use crate::value::Response;

/// A device identity that outlives its physical connections.
///
/// Cheap to clone; all clones observe the same binding.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    key: String,
    binding: Mutex<Binding>,
    device_type: RwLock<DeviceType>,
}

struct Binding {
    connection: SharedConnection,
    online: bool,
    // Bumped on every swap so a watcher can tell whether its connection is still bound.
    generation: u64,
}

impl Client {
    /// A new client starts offline.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                key: key.into(),
                binding: Mutex::new(Binding {
                    connection: NopConnection::shared(),
                    online: false,
                    generation: 0,
                }),
                device_type: RwLock::new(DeviceType::Unknown),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The currently bound connection. Fetch it per call; it changes across reconnects.
    pub fn connection(&self) -> SharedConnection {
        Arc::clone(&self.inner.binding.lock().connection)
    }

    /// Binds a live connection, or goes offline with `None`. A replaced live connection is closed.
    ///
    /// Binding a live connection spawns a watcher task, so it must run inside a tokio runtime.
    pub fn set_connection(&self, connection: Option<SharedConnection>) {
        let Some(connection) = connection else {
            self.inner.go_offline(None);
            return;
        };

        let (generation, previous) = {
            let mut binding = self.inner.binding.lock();
            binding.generation += 1;
            let previous = std::mem::replace(&mut binding.connection, Arc::clone(&connection));
            binding.online = !connection.is_nop();
            (binding.generation, previous)
        };
        // One live link per device: a reconnect retires the socket it replaces.
        if !previous.is_nop() && previous.id() != connection.id() {
            debug!(
                device_key = %self.inner.key,
                connection_id = %previous.id(),
                "closing replaced connection"
            );
            previous.close();
        }
        if connection.is_nop() {
            info!(device_key = %self.inner.key, "client offline");
            return;
        }
        info!(
            device_key = %self.inner.key,
            connection_id = %connection.id(),
            "client online"
        );

        let client: Weak<ClientInner> = Arc::downgrade(&self.inner);
        let closed = connection.context();
        drop(connection);
        tokio::spawn(async move {
            closed.cancelled().await;
            if let Some(inner) = client.upgrade() {
                inner.go_offline(Some(generation));
            }
        });
    }

    /// Advisory; the device may have vanished without the socket noticing yet.
    pub fn online(&self) -> bool {
        self.inner.binding.lock().online
    }

    pub fn device_type(&self) -> DeviceType {
        *self.inner.device_type.read()
    }

    pub fn set_device_type(&self, device_type: DeviceType) {
        *self.inner.device_type.write() = device_type;
    }

    /// Runs `command` on whatever connection is bound right now.
    pub async fn execute(&self, cx: &Context, command: &str) -> Result<Response, RpcError> {
        self.connection().execute(cx, command).await
    }
}

impl ClientInner {
    /// `expected` restricts the demotion to one binding generation.
    fn go_offline(&self, expected: Option<u64>) {
        let mut binding = self.binding.lock();
        if let Some(generation) = expected {
            if binding.generation != generation {
                debug!(device_key = %self.key, "replaced connection closed; binding kept");
                return;
            }
        }
        binding.generation += 1;
        binding.connection = NopConnection::shared();
        binding.online = false;
        drop(binding);
        info!(device_key = %self.key, "client offline");
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("key", &self.inner.key)
            .field("online", &self.online())
            .field("device_type", &self.device_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::connection::{Connection, HandshakeData, RemoteConnection};
    use crate::transport::TransportAdapter;
    use crate::value::Value;

    fn connection() -> (Arc<RemoteConnection>, mpsc::Sender<Bytes>, mpsc::Receiver<Bytes>) {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(8);
        let adapter = TransportAdapter::from_channels(in_rx, out_tx);
        (
            RemoteConnection::with_handshake(adapter, HandshakeData::degraded("host")),
            in_tx,
            out_rx,
        )
    }

    async fn wait_offline(client: &Client) {
        while client.online() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[test_timeout::tokio_timeout_test]
    async fn new_client_is_offline_and_answers_zero() {
        let client = Client::new("host#1");
        assert!(!client.online());
        assert!(client.connection().is_nop());
        let response = client
            .execute(&Context::background(), "turtle.forward()")
            .await
            .expect("nop");
        assert_eq!(response.values(), &[Value::Number(0.0)]);
    }

    #[test_timeout::tokio_timeout_test]
    async fn closing_the_bound_connection_goes_offline() {
        let client = Client::new("host#1");
        let (conn, _in_tx, _out_rx) = connection();
        client.set_connection(Some(conn.clone()));
        assert!(client.online());
        assert_eq!(client.connection().id(), conn.id());

        conn.close();
        wait_offline(&client).await;
        assert!(client.connection().is_nop());
    }

    #[test_timeout::tokio_timeout_test]
    async fn closing_a_replaced_connection_keeps_the_new_one() {
        let client = Client::new("host#1");
        let (first, _a_in, _a_out) = connection();
        let (second, _b_in, _b_out) = connection();

        client.set_connection(Some(first.clone()));
        client.set_connection(Some(second.clone()));
        assert!(first.is_closed(), "the replaced connection is retired");
        assert!(!second.is_closed());
        first.close();

        // give the first watcher a chance to run
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(client.online());
        assert_eq!(client.connection().id(), second.id());
    }

    #[test_timeout::tokio_timeout_test]
    async fn rebinding_the_same_connection_keeps_it_open() {
        let client = Client::new("host#1");
        let (conn, _in_tx, _out_rx) = connection();
        client.set_connection(Some(conn.clone()));
        client.set_connection(Some(conn.clone()));
        assert!(!conn.is_closed());
        assert!(client.online());
    }

    #[test_timeout::tokio_timeout_test]
    async fn explicit_none_goes_offline() {
        let client = Client::new("host#1");
        let (conn, _in_tx, _out_rx) = connection();
        client.set_connection(Some(conn));
        client.set_connection(None);
        assert!(!client.online());
        assert!(client.connection().is_nop());
    }

    #[test_timeout::tokio_timeout_test]
    async fn clones_share_the_binding_and_type() {
        let client = Client::new("host#1");
        let other = client.clone();
        other.set_device_type(DeviceType::Pocket);
        let (conn, _in_tx, _out_rx) = connection();
        other.set_connection(Some(conn));
        assert!(client.online());
        assert_eq!(client.device_type(), DeviceType::Pocket);
    }
}
