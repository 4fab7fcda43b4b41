use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{ensure, Context};
use cc_link::LinkConfig;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "cc-harbor",
    author,
    version,
    about = "Websocket server for ComputerCraft computers and turtles"
)]
pub struct Cli {
    /// Address to bind the websocket listener to.
    #[arg(long, env = "CC_HARBOR_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// How long a device has to send its handshake frame.
    #[arg(long, env = "CC_HARBOR_HANDSHAKE_TIMEOUT_SECS", default_value_t = 5)]
    pub handshake_timeout_secs: u64,

    /// Capacity of each connection's inbound and outbound frame queues.
    #[arg(long, env = "CC_HARBOR_QUEUE_DEPTH", default_value_t = 8)]
    pub queue_depth: usize,

    /// Budget for classifying a device that did not announce its type.
    #[arg(long, env = "CC_HARBOR_PROBE_TIMEOUT_SECS", default_value_t = 5)]
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub link: LinkConfig,
    pub probe_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            link: LinkConfig::default(),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl TryFrom<Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;
        ensure!(cli.queue_depth > 0, "queue depth must be at least 1");
        ensure!(
            cli.handshake_timeout_secs > 0,
            "handshake timeout must be greater than zero"
        );
        Ok(ServerConfig {
            listen_addr,
            link: LinkConfig::default()
                .with_queue_depth(cli.queue_depth)
                .with_handshake_timeout(Duration::from_secs(cli.handshake_timeout_secs)),
            probe_timeout: Duration::from_secs(cli.probe_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn defaults_match_the_documented_environment() {
        let cli = Cli::try_parse_from(["cc-harbor"]).expect("defaults");
        let config = ServerConfig::try_from(cli).expect("config");
        assert_eq!(config.listen_addr, SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(config.link.queue_depth, 8);
        assert_eq!(config.link.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
    }

    #[test_timeout::timeout]
    fn rejects_bad_values() {
        let cli = Cli::try_parse_from(["cc-harbor", "--listen-addr", "nowhere"]).expect("parse");
        assert!(ServerConfig::try_from(cli).is_err());
        let cli = Cli::try_parse_from(["cc-harbor", "--queue-depth", "0"]).expect("parse");
        assert!(ServerConfig::try_from(cli).is_err());
    }
}
