use std::time::Duration;

const DEFAULT_QUEUE_DEPTH: usize = 8;

/// Tuning for the transport pumps and the handshake of one connection.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Capacity of both the inbound and the outbound frame queue.
    pub queue_depth: usize,
    /// How long the handshake waits for the first frame.
    pub handshake_timeout: Duration,
    /// Upper bound on flushing queued outbound frames during shutdown.
    pub drain_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            handshake_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(1),
        }
    }
}

impl LinkConfig {
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}
