use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use tracing::debug;

use crate::client::Client;

/// Stable device keys (`host#id`) to their clients.
#[derive(Clone, Default)]
pub struct Registry {
    clients: Arc<DashMap<String, Client>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concurrent first sightings of one key all get the same client.
    pub fn get_or_create(&self, key: &str) -> Client {
        match self.clients.entry(key.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                debug!(device_key = key, "registering client");
                entry.insert(Client::new(key)).clone()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Client> {
        self.clients.get(key).map(|entry| entry.value().clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.clients.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Snapshot of every client, ordered by key.
    pub fn clients(&self) -> Vec<Client> {
        let mut clients: Vec<Client> = self
            .clients
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        clients.sort_by(|a, b| a.key().cmp(b.key()));
        clients
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.clients.iter().filter(|entry| entry.value().online()).count()
    }

    /// Forgets a client. Its bound connection, if any, is closed.
    pub fn evict(&self, key: &str) -> Option<Client> {
        let (_, client) = self.clients.remove(key)?;
        client.connection().close();
        client.set_connection(None);
        debug!(device_key = key, "client evicted");
        Some(client)
    }
}
