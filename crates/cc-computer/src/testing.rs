use std::sync::Arc;

use cc_link::transport::memory;
use cc_link::{Client, Connection, LinkConfig, RemoteConnection};
use parking_lot::Mutex;
use serde_json::{json, Value as Json};

/// A simulated device bound to a fresh client, recording every command it receives.
pub(crate) struct FakeDevice {
    pub client: Client,
    pub commands: Arc<Mutex<Vec<String>>>,
}

impl FakeDevice {
    pub async fn spawn<F>(mut handler: F) -> Self
    where
        F: FnMut(&str) -> Json + Send + 'static,
    {
        let (source, sink, remote) = memory::pair(8);
        assert!(remote.send_json(&json!({"id": 1, "type": "turtle"})).await);
        let commands = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&commands);
        remote.spawn_responder(move |command| {
            log.lock().push(command.to_string());
            Some(handler(command))
        });

        let conn = RemoteConnection::accept(source, sink, "127.0.0.1", &LinkConfig::default())
            .await
            .expect("handshake");
        let client = Client::new(conn.handshake().key());
        client.set_connection(Some(conn));
        Self { client, commands }
    }

    pub fn last_command(&self) -> Option<String> {
        self.commands.lock().last().cloned()
    }
}
